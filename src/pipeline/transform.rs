//! Voice transformation.
//!
//! Scripts are rewritten in the creator's voice in small premium-tier batches.
//! Every output goes through [`repair_opener`] so it opens with the hook, and
//! is flattened into a single paragraph with its word count recomputed.

use super::context::{RetryPolicy, StageContext, StageError};
use super::expansion::word_count;
use super::indexing::{global_index, plan_batches};
use super::opener::{repair_opener, OpenerOutcome};
use super::prompts;
use super::state::PipelineStage;
use super::stats::{StageStats, StageTimer};
use crate::llm::{
    parse_json_response, CompletionOptions, CompletionRequest, ModelTier, TokenUsage,
};
use crate::voice::VoiceProfile;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use tracing::{debug, info, warn};

const INITIAL_TEMPERATURE: f32 = 0.7;
const REVISION_TEMPERATURE: f32 = 0.5;

/// A script queued for transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformInput {
    /// Global index, equal to the originating hook index.
    pub script_index: usize,
    pub hook: String,
    pub script: String,
    /// Reviewer notes for a revision pass.
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedScript {
    pub script_index: usize,
    pub original_hook: String,
    pub transformed_script: String,
    pub word_count: usize,
    #[serde(default)]
    pub changes_made: Vec<String>,
    /// The model's own 0-100 estimate; the validator's score is authoritative.
    #[serde(default)]
    pub voice_fidelity_score: Option<f32>,
    #[serde(default)]
    pub ai_tells_removed: Vec<String>,
    #[serde(default)]
    pub voice_elements_added: Vec<String>,
    pub opener: OpenerOutcome,
}

#[derive(Debug, Deserialize)]
struct RawTransformed {
    #[serde(default)]
    script_index: Option<usize>,
    #[serde(default)]
    transformed_script: String,
    #[serde(default)]
    changes_made: Vec<String>,
    #[serde(default)]
    voice_fidelity_score: Option<f32>,
    #[serde(default)]
    ai_tells_removed: Vec<String>,
    #[serde(default)]
    voice_elements_added: Vec<String>,
}

/// First pass or a numbered revision pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    Initial,
    Revision { attempt: u32 },
}

impl TransformMode {
    pub fn temperature(&self) -> f32 {
        match self {
            TransformMode::Initial => INITIAL_TEMPERATURE,
            TransformMode::Revision { .. } => REVISION_TEMPERATURE,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            TransformMode::Initial => PipelineStage::VoiceTransformation,
            TransformMode::Revision { attempt } => PipelineStage::RevisionTransform {
                attempt: *attempt,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub scripts: Vec<TransformedScript>,
    pub stats: StageStats,
}

/// Collapse paragraph breaks and runs of whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean one model output: single paragraph, opener repaired, words recounted.
pub fn finish_script(input: &TransformInput, raw_text: &str) -> (String, usize, OpenerOutcome) {
    let flat = collapse_whitespace(raw_text);
    let repair = repair_opener(&input.hook, &flat);
    let words = word_count(&repair.text);
    (repair.text, words, repair.outcome)
}

pub struct VoiceTransformer {
    ctx: StageContext,
    batch_size: usize,
    retry: RetryPolicy,
}

impl VoiceTransformer {
    pub fn new(ctx: StageContext) -> Self {
        Self {
            ctx,
            batch_size: 5,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn transform(
        &self,
        profile: &VoiceProfile,
        inputs: &[TransformInput],
        approved_excerpts: &[String],
        mode: TransformMode,
    ) -> Result<TransformOutput, StageError> {
        self.ctx.check_cancelled()?;
        let stage = mode.stage();
        let mut timer = StageTimer::start(stage, inputs.len());
        let system = prompts::transform_system(profile, approved_excerpts);
        let options = self.ctx.options(ModelTier::Premium, mode.temperature());

        let batches = plan_batches(inputs.len(), self.batch_size);
        let mut scripts = Vec::with_capacity(inputs.len());
        let mut seen = HashSet::new();
        let mut abandoned = 0;
        let mut openers: BTreeMap<&'static str, usize> = BTreeMap::new();

        for (batch_no, range) in batches.iter().enumerate() {
            if batch_no > 0 {
                self.ctx.pause_between_batches().await?;
            }
            let request =
                CompletionRequest::new(prompts::transform_prompt(&inputs[range.clone()]))
                    .with_system(system.clone());

            let (raws, usage) = self.run_batch(batch_no, &request, &options).await?;
            timer.add_tokens(usage);
            let Some(raws) = raws else {
                abandoned += 1;
                continue;
            };

            for script in self.collect_batch(batch_no, range, inputs, raws) {
                if !seen.insert(script.script_index) {
                    debug!(script_index = script.script_index, "Duplicate transformed script, keeping first");
                    continue;
                }
                *openers.entry(opener_label(script.opener)).or_insert(0) += 1;
                scripts.push(script);
            }
        }
        scripts.sort_by_key(|s| s.script_index);

        let stats = timer.stats_mut();
        stats.set_extra("batches", batches.len());
        stats.set_extra("abandoned_batches", abandoned);
        stats.set_extra("opener_outcomes", &openers);
        let stats = timer.finish(scripts.len());

        info!(
            stage = %stage,
            inputs = inputs.len(),
            transformed = scripts.len(),
            abandoned_batches = abandoned,
            "Voice transformation complete"
        );
        Ok(TransformOutput { scripts, stats })
    }

    /// One batch with retries. Returns `None` once retries are exhausted;
    /// only cancellation is an error.
    async fn run_batch(
        &self,
        batch_no: usize,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<(Option<Vec<RawTransformed>>, TokenUsage), StageError> {
        let mut usage = TokenUsage::default();
        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt);
                debug!(batch = batch_no, attempt, ?delay, "Retrying transform batch");
                self.ctx.sleep(delay).await?;
            }

            let failure = match self.ctx.complete(request, options).await {
                Ok(response) => {
                    usage += response.usage;
                    match parse_json_response::<Vec<RawTransformed>>(&response.text) {
                        Ok(raws) => return Ok((Some(raws), usage)),
                        Err(e) => e.to_string(),
                    }
                }
                Err(e) => match StageError::from(e) {
                    StageError::Cancelled => return Err(StageError::Cancelled),
                    other => other.to_string(),
                },
            };
            warn!(
                batch = batch_no,
                attempt = attempt + 1,
                max_attempts = self.retry.max_retries + 1,
                "Transform batch failed: {}",
                failure
            );
        }
        warn!(batch = batch_no, "Transform batch abandoned after retries");
        Ok((None, usage))
    }

    fn collect_batch(
        &self,
        batch_no: usize,
        range: &Range<usize>,
        inputs: &[TransformInput],
        raws: Vec<RawTransformed>,
    ) -> Vec<TransformedScript> {
        let mut out = Vec::new();
        for (position, raw) in raws.into_iter().enumerate() {
            let local = raw.script_index.unwrap_or(position);
            let Some(position_in_inputs) = global_index(range, local) else {
                warn!(batch = batch_no, local, "Transformed script index outside batch, dropping");
                continue;
            };
            let input = &inputs[position_in_inputs];
            if raw.transformed_script.trim().is_empty() {
                warn!(script_index = input.script_index, "Empty transformed script, dropping");
                continue;
            }

            let (text, words, opener) = finish_script(input, &raw.transformed_script);
            out.push(TransformedScript {
                script_index: input.script_index,
                original_hook: input.hook.clone(),
                transformed_script: text,
                word_count: words,
                changes_made: raw.changes_made,
                voice_fidelity_score: raw
                    .voice_fidelity_score
                    .filter(|s| s.is_finite())
                    .map(|s| s.clamp(0.0, 100.0)),
                ai_tells_removed: raw.ai_tells_removed,
                voice_elements_added: raw.voice_elements_added,
                opener,
            });
        }
        out
    }
}

fn opener_label(outcome: OpenerOutcome) -> &'static str {
    match outcome {
        OpenerOutcome::AlreadyMatched => "already_matched",
        OpenerOutcome::StrippedFiller => "stripped_filler",
        OpenerOutcome::Sliced => "sliced",
        OpenerOutcome::NotFound => "not_found",
        OpenerOutcome::EmptyHook => "empty_hook",
    }
}
