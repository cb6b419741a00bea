//! Pipeline orchestrator.
//!
//! Stages run strictly in sequence:
//! 1. CorpusRetrieval: exemplars for the creator (failure degrades to none)
//! 2. HookGeneration
//! 3. ShareabilityScoring (optional)
//! 4. ScriptExpansion
//! 5. VoiceTransformation
//! 6. Validation
//! 7. Revision loop: re-transform REVISE scripts, re-validate everything
//! 8. Finalize: keep PASS scripts, estimate cost, persist

use super::context::{RetryPolicy, StageContext, StageError};
use super::expansion::{DurationTier, ExpandedScript, ScriptExpander};
use super::hooks::{GeneratedHook, HookGenerator, HookRequest};
use super::shareability::ShareabilityScorer;
use super::state::PipelineStage;
use super::stats::{RunTotals, StageStats, StageTimer};
use super::transform::{TransformInput, TransformMode, TransformedScript, VoiceTransformer};
use super::validation::{
    ScriptValidator, ValidationOutput, ValidationResult, ValidationSummary, Verdict,
};
use crate::corpus::{CorpusRetriever, RetrievalOptions, RetrievalStats};
use crate::cost::{build_batch_record, BatchCounts, CostEstimate, PricingTable};
use crate::store::{CorpusMatch, Model, ModelStore, NewScript, ScriptStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Approved-script excerpts appended to the transformation prompt.
pub const APPROVED_EXCERPT_LIMIT: usize = 5;
pub const APPROVED_EXCERPT_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("Persisting results failed: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    fn stage(stage: PipelineStage, source: StageError) -> Self {
        match source {
            StageError::Cancelled => PipelineError::Cancelled,
            source => PipelineError::Stage {
                stage: stage.name(),
                source,
            },
        }
    }
}

/// Knobs shared by every run of a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub expansion_batch_size: usize,
    pub transform_batch_size: usize,
    pub validation_batch_size: usize,
    pub max_revision_attempts: u32,
    pub transform_retry: RetryPolicy,
    pub shareability: bool,
    pub variations_per_concept: Option<usize>,
    pub use_pcm: bool,
    pub retrieval: RetrievalOptions,
    pub pricing: PricingTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expansion_batch_size: 10,
            transform_batch_size: 5,
            validation_batch_size: 10,
            max_revision_attempts: 2,
            transform_retry: RetryPolicy::default(),
            shareability: false,
            variations_per_concept: None,
            use_pcm: false,
            retrieval: RetrievalOptions::default(),
            pricing: PricingTable::default(),
        }
    }
}

/// One generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub model_id: String,
    pub hook_count: usize,
    pub duration: DurationTier,
    pub theme: Option<String>,
    /// Insert passed scripts and the batch record when the run completes.
    pub persist: bool,
}

impl PipelineRequest {
    pub fn new(model_id: impl Into<String>, hook_count: usize) -> Self {
        Self {
            model_id: model_id.into(),
            hook_count,
            duration: DurationTier::default(),
            theme: None,
            persist: true,
        }
    }

    pub fn with_duration(mut self, duration: DurationTier) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_theme(mut self, theme: Option<String>) -> Self {
        self.theme = theme.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}

/// An accepted script joined with its originating hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalScript {
    pub script_index: usize,
    pub hook: String,
    pub hook_type: String,
    pub parasocial_levers: Vec<String>,
    pub content: String,
    pub word_count: usize,
    pub estimated_duration_seconds: f32,
    pub voice_fidelity_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcm_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Batch record ID, set when results were persisted.
    pub batch_id: Option<String>,
    pub model_id: String,
    pub scripts: Vec<FinalScript>,
    pub stages: Vec<StageStats>,
    pub totals: RunTotals,
    pub cost: CostEstimate,
    pub validation_summary: ValidationSummary,
    pub revision_attempts: u32,
    pub retrieval_stats: Option<RetrievalStats>,
}

/// Runs the stage services for one creator at a time.
pub struct Pipeline {
    models: Arc<dyn ModelStore>,
    scripts: Arc<dyn ScriptStore>,
    retriever: CorpusRetriever,
    ctx: StageContext,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        models: Arc<dyn ModelStore>,
        scripts: Arc<dyn ScriptStore>,
        retriever: CorpusRetriever,
        ctx: StageContext,
        config: PipelineConfig,
    ) -> Self {
        Self {
            models,
            scripts,
            retriever,
            ctx,
            config,
        }
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        let model = self
            .models
            .get_model(&request.model_id)
            .map_err(PipelineError::Store)?
            .ok_or_else(|| PipelineError::ModelNotFound(request.model_id.clone()))?;
        let profile = &model.voice_profile;
        info!(
            model_id = %model.id,
            hooks = request.hook_count,
            duration = %request.duration,
            "Starting pipeline run"
        );

        let mut stages = Vec::new();

        // =====================================================================
        // Retrieval
        // =====================================================================

        let (exemplars, retrieval_stats, retrieval_stage) =
            self.retrieve_exemplars(&model, request).await;
        stages.push(retrieval_stage);
        self.check_cancelled()?;

        // =====================================================================
        // Hooks
        // =====================================================================

        let hook_request = HookRequest::new(request.hook_count)
            .with_theme(request.theme.clone())
            .with_pcm(self.config.use_pcm)
            .with_variations(self.config.variations_per_concept);
        let hook_output = HookGenerator::new(self.ctx.clone())
            .generate(profile, &exemplars, &hook_request)
            .await
            .map_err(|e| PipelineError::stage(PipelineStage::HookGeneration, e))?;
        stages.push(hook_output.stats);
        let mut hooks = hook_output.hooks;

        if self.config.shareability {
            self.check_cancelled()?;
            let scored = ShareabilityScorer::new(self.ctx.clone())
                .score(profile, hooks)
                .await
                .map_err(|e| PipelineError::stage(PipelineStage::ShareabilityScoring, e))?;
            stages.push(scored.stats);
            hooks = scored.hooks;
        }
        self.check_cancelled()?;

        // =====================================================================
        // Expansion
        // =====================================================================

        let expansion = ScriptExpander::new(self.ctx.clone())
            .with_batch_size(self.config.expansion_batch_size)
            .expand(profile, &hooks, &exemplars, request.duration)
            .await
            .map_err(|e| PipelineError::stage(PipelineStage::ScriptExpansion, e))?;
        stages.push(expansion.stats);
        let expanded = expansion.scripts;
        self.check_cancelled()?;

        // =====================================================================
        // Transformation + validation
        // =====================================================================

        let approved = self
            .models
            .approved_script_excerpts(&model.id, APPROVED_EXCERPT_LIMIT, APPROVED_EXCERPT_CHARS)
            .unwrap_or_else(|e| {
                warn!(model_id = %model.id, "Could not load approved scripts: {}", e);
                Vec::new()
            });

        let transformer = VoiceTransformer::new(self.ctx.clone())
            .with_batch_size(self.config.transform_batch_size)
            .with_retry_policy(self.config.transform_retry);
        let validator =
            ScriptValidator::new(self.ctx.clone()).with_batch_size(self.config.validation_batch_size);

        let inputs: Vec<TransformInput> = expanded
            .iter()
            .map(|s| TransformInput {
                script_index: s.hook_index,
                hook: s.hook.clone(),
                script: s.script.clone(),
                feedback: None,
            })
            .collect();
        let transformed = transformer
            .transform(profile, &inputs, &approved, TransformMode::Initial)
            .await
            .map_err(|e| PipelineError::stage(PipelineStage::VoiceTransformation, e))?;
        stages.push(transformed.stats);
        let mut scripts = transformed.scripts;
        let scripts_transformed = scripts.len();
        self.check_cancelled()?;

        let mut validation = validator
            .validate(profile, &scripts, PipelineStage::Validation)
            .await
            .map_err(|e| PipelineError::stage(PipelineStage::Validation, e))?;
        stages.push(validation.stats.clone());

        // =====================================================================
        // Revision loop
        // =====================================================================

        let mut revision_attempts = 0;
        for attempt in 1..=self.config.max_revision_attempts {
            self.check_cancelled()?;
            let targets = revision_targets(&scripts, &validation.results);
            if targets.is_empty() {
                break;
            }
            revision_attempts = attempt;
            info!(attempt, scripts = targets.len(), "Revising scripts");

            let mode = TransformMode::Revision { attempt };
            let revised = transformer
                .transform(profile, &targets, &approved, mode)
                .await
                .map_err(|e| PipelineError::stage(mode.stage(), e))?;
            stages.push(revised.stats);
            apply_revisions(&mut scripts, revised.scripts);
            self.check_cancelled()?;

            let stage = PipelineStage::RevisionValidation { attempt };
            validation = validator
                .validate(profile, &scripts, stage)
                .await
                .map_err(|e| PipelineError::stage(stage, e))?;
            stages.push(validation.stats.clone());
        }

        // =====================================================================
        // Finalize
        // =====================================================================

        let mut finalize = StageTimer::start(PipelineStage::Finalize, scripts.len());
        let mut finals = finalize_scripts(&hooks, &expanded, &scripts, &validation);
        let dropped = scripts.len() - finals.len();
        finalize.stats_mut().set_extra("dropped", dropped);
        stages.push(finalize.finish(finals.len()));

        let cost = self.config.pricing.estimate(&stages);
        let totals = RunTotals {
            elapsed_ms: started.elapsed().as_millis() as u64,
            tokens: RunTotals::tokens_of(&stages),
            final_count: finals.len(),
            estimated_cost_usd: cost.total_usd,
        };

        let batch_id = if request.persist {
            self.check_cancelled()?;
            let counts = BatchCounts {
                hooks_generated: hooks.len(),
                scripts_expanded: expanded.len(),
                scripts_transformed,
                revision_attempts,
            };
            Some(self.persist(&model, &mut finals, counts, &stages, &totals, &cost)?)
        } else {
            None
        };

        info!(
            model_id = %model.id,
            final_scripts = finals.len(),
            dropped,
            revision_attempts,
            tokens = totals.tokens.total(),
            cost_usd = totals.estimated_cost_usd,
            elapsed_ms = totals.elapsed_ms,
            "Pipeline run complete"
        );

        Ok(PipelineResult {
            batch_id,
            model_id: model.id.clone(),
            scripts: finals,
            stages,
            totals,
            cost,
            validation_summary: validation.summary,
            revision_attempts,
            retrieval_stats,
        })
    }

    async fn retrieve_exemplars(
        &self,
        model: &Model,
        request: &PipelineRequest,
    ) -> (Vec<CorpusMatch>, Option<RetrievalStats>, StageStats) {
        let mut timer = StageTimer::start(PipelineStage::CorpusRetrieval, 1);
        let mut options = self.config.retrieval.clone();
        if request.theme.is_some() {
            options.thematic_query = request.theme.clone();
        }

        match self.retriever.retrieve_for(model, &options).await {
            Ok(result) => {
                timer.stats_mut().set_extra("retrieval", &result.stats);
                let count = result.matches.len();
                (result.matches, Some(result.stats), timer.finish(count))
            }
            Err(e) => {
                warn!(model_id = %model.id, "Corpus retrieval failed, continuing without exemplars: {}", e);
                timer.stats_mut().set_extra("error", e.to_string());
                (Vec::new(), None, timer.finish(0))
            }
        }
    }

    fn persist(
        &self,
        model: &Model,
        finals: &mut [FinalScript],
        counts: BatchCounts,
        stages: &[StageStats],
        totals: &RunTotals,
        cost: &CostEstimate,
    ) -> Result<String, PipelineError> {
        let passed: Vec<(f32, usize)> = finals
            .iter()
            .map(|s| (s.voice_fidelity_score, s.word_count))
            .collect();
        let record = build_batch_record(&model.id, counts, stages, &passed, totals.elapsed_ms, cost);
        self.scripts.insert_batch(&record).map_err(|e| {
            error!(batch_id = %record.id, "Failed to insert batch record: {}", e);
            PipelineError::Persistence(e)
        })?;

        let rows: Vec<NewScript> = finals
            .iter()
            .map(|s| NewScript {
                model_id: model.id.clone(),
                batch_id: Some(record.id.clone()),
                hook: s.hook.clone(),
                hook_type: s.hook_type.clone(),
                content: s.content.clone(),
                parasocial_levers: s.parasocial_levers.clone(),
                voice_fidelity_score: Some(s.voice_fidelity_score),
                word_count: s.word_count,
            })
            .collect();
        let ids = self.scripts.insert_scripts(&rows).map_err(|e| {
            error!(batch_id = %record.id, "Failed to insert scripts: {}", e);
            PipelineError::Persistence(e)
        })?;
        for (script, id) in finals.iter_mut().zip(ids) {
            script.stored_id = Some(id);
        }
        info!(batch_id = %record.id, scripts = rows.len(), "Persisted pipeline results");
        Ok(record.id)
    }
}

/// Scripts whose current verdict is REVISE, paired with their reviewer
/// feedback. Scripts without a verdict are left alone; they are re-validated
/// with the rest of the set if a revision pass runs.
pub fn revision_targets(
    scripts: &[TransformedScript],
    results: &[ValidationResult],
) -> Vec<TransformInput> {
    let by_index: HashMap<usize, &ValidationResult> =
        results.iter().map(|r| (r.script_index, r)).collect();
    scripts
        .iter()
        .filter_map(|s| {
            let result = by_index.get(&s.script_index)?;
            (result.verdict == Verdict::Revise).then(|| TransformInput {
                script_index: s.script_index,
                hook: s.original_hook.clone(),
                script: s.transformed_script.clone(),
                feedback: Some(result.feedback()),
            })
        })
        .collect()
}

/// Replace scripts by `script_index`; revisions for unknown indices are
/// ignored.
pub fn apply_revisions(scripts: &mut [TransformedScript], revised: Vec<TransformedScript>) {
    for revision in revised {
        match scripts
            .iter_mut()
            .find(|s| s.script_index == revision.script_index)
        {
            Some(slot) => *slot = revision,
            None => warn!(
                script_index = revision.script_index,
                "Revised script has no matching original, ignoring"
            ),
        }
    }
}

/// Keep PASS scripts and join each one back to its hook by `script_index`.
pub fn finalize_scripts(
    hooks: &[GeneratedHook],
    expanded: &[ExpandedScript],
    scripts: &[TransformedScript],
    validation: &ValidationOutput,
) -> Vec<FinalScript> {
    let verdicts: HashMap<usize, &ValidationResult> = validation
        .results
        .iter()
        .map(|r| (r.script_index, r))
        .collect();
    let durations: HashMap<usize, f32> = expanded
        .iter()
        .map(|e| (e.hook_index, e.estimated_duration_seconds))
        .collect();

    scripts
        .iter()
        .filter_map(|s| {
            let result = verdicts.get(&s.script_index)?;
            if result.verdict != Verdict::Pass {
                return None;
            }
            let Some(hook) = hooks.get(s.script_index) else {
                warn!(script_index = s.script_index, "Passed script has no hook, dropping");
                return None;
            };
            Some(FinalScript {
                script_index: s.script_index,
                hook: hook.hook.clone(),
                hook_type: hook.hook_type.clone(),
                parasocial_levers: hook.parasocial_levers.clone(),
                content: s.transformed_script.clone(),
                word_count: s.word_count,
                estimated_duration_seconds: durations
                    .get(&s.script_index)
                    .copied()
                    .unwrap_or_else(|| super::expansion::estimated_duration_seconds(s.word_count)),
                voice_fidelity_score: result.voice_fidelity_score,
                pcm_type: hook.pcm_type.clone(),
                concept_id: hook.concept_id.clone(),
                stored_id: None,
            })
        })
        .collect()
}
