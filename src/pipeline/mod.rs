//! Six-stage script generation pipeline.
//!
//! Each stage is a small service over a shared [`StageContext`]; the
//! [`Pipeline`] orchestrator sequences them and runs the revision loop.

mod context;
pub mod expansion;
pub mod hooks;
pub mod indexing;
pub mod opener;
mod orchestrator;
mod prompts;
pub mod shareability;
mod state;
mod stats;
#[cfg(test)]
mod test_llm;
pub mod transform;
pub mod validation;

pub use context::{RetryPolicy, StageContext, StageError};
pub use expansion::{DurationTier, ExpandedScript, ScriptExpander, StructureBreakdown};
pub use hooks::{GeneratedHook, HookGenerator, HookRequest};
pub use opener::{repair_opener, OpenerOutcome, OpenerRepair};
pub use orchestrator::{
    apply_revisions, finalize_scripts, revision_targets, FinalScript, Pipeline, PipelineConfig,
    PipelineError, PipelineRequest, PipelineResult,
};
pub use shareability::ShareabilityScorer;
pub use state::PipelineStage;
pub use stats::{RunTotals, StageStats, StageTimer};
pub use transform::{TransformInput, TransformMode, TransformedScript, VoiceTransformer};
pub use validation::{
    RevisionPriority, ScriptValidator, ValidationResult, ValidationSummary, Verdict,
};
