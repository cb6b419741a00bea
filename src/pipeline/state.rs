//! Pipeline stage definitions.

use crate::llm::ModelTier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A step of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineStage {
    CorpusRetrieval,
    HookGeneration,
    ShareabilityScoring,
    ScriptExpansion,
    VoiceTransformation,
    Validation,
    /// Re-transform of REVISE scripts, 1-based attempt.
    RevisionTransform { attempt: u32 },
    /// Full re-validation after a revision transform.
    RevisionValidation { attempt: u32 },
    Finalize,
}

impl PipelineStage {
    /// Stable name used in stats and batch records.
    pub fn name(&self) -> String {
        match self {
            PipelineStage::CorpusRetrieval => "corpus_retrieval".to_string(),
            PipelineStage::HookGeneration => "hook_generation".to_string(),
            PipelineStage::ShareabilityScoring => "shareability_scoring".to_string(),
            PipelineStage::ScriptExpansion => "script_expansion".to_string(),
            PipelineStage::VoiceTransformation => "voice_transformation".to_string(),
            PipelineStage::Validation => "validation".to_string(),
            PipelineStage::RevisionTransform { attempt } => {
                format!("revision_{}_transformation", attempt)
            }
            PipelineStage::RevisionValidation { attempt } => {
                format!("revision_{}_validation", attempt)
            }
            PipelineStage::Finalize => "finalize".to_string(),
        }
    }

    /// Model tier the stage calls, if it calls the LLM at all.
    pub fn tier(&self) -> Option<ModelTier> {
        match self {
            PipelineStage::CorpusRetrieval | PipelineStage::Finalize => None,
            PipelineStage::HookGeneration | PipelineStage::ScriptExpansion => Some(ModelTier::Mid),
            PipelineStage::VoiceTransformation | PipelineStage::RevisionTransform { .. } => {
                Some(ModelTier::Premium)
            }
            PipelineStage::ShareabilityScoring
            | PipelineStage::Validation
            | PipelineStage::RevisionValidation { .. } => Some(ModelTier::Cheap),
        }
    }

    pub fn is_revision(&self) -> bool {
        matches!(
            self,
            PipelineStage::RevisionTransform { .. } | PipelineStage::RevisionValidation { .. }
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
