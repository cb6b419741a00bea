//! Hook generation.
//!
//! The hook-type distribution is fixed before the call so the prompt can ask
//! for exact per-type counts. The model's answer is then validated locally:
//! missing fields, overlong hooks and case-insensitive duplicates are dropped.

use super::context::{StageContext, StageError};
use super::prompts;
use super::state::PipelineStage;
use super::stats::{StageStats, StageTimer};
use crate::llm::{parse_json_response, CompletionRequest, ModelTier, ResponseParseError};
use crate::store::CorpusMatch;
use crate::voice::{distribute_hook_types, distribute_pcm_types, HookType, VoiceProfile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Hooks longer than this are discarded.
pub const MAX_HOOK_WORDS: usize = 25;

const INITIAL_TEMPERATURE: f32 = 0.9;
const RETRY_TEMPERATURE: f32 = 0.7;

/// One accepted hook candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedHook {
    pub hook: String,
    pub hook_type: String,
    #[serde(default)]
    pub parasocial_levers: Vec<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcm_type: Option<String>,
    /// Concept group in variation mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<String>,
    /// Variation style in variation mode (angle_shift, intensity, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    /// Part of the suggested A/B subset.
    #[serde(default)]
    pub recommended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareability_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareability_reason: Option<String>,
}

impl GeneratedHook {
    pub fn new(hook: impl Into<String>, hook_type: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            hook_type: hook_type.into(),
            parasocial_levers: Vec::new(),
            rationale: String::new(),
            pcm_type: None,
            concept_id: None,
            variation: None,
            recommended: false,
            shareability_score: None,
            shareability_reason: None,
        }
    }

    pub fn word_count(&self) -> usize {
        self.hook.split_whitespace().count()
    }
}

/// What to ask the model for.
#[derive(Debug, Clone, PartialEq)]
pub struct HookRequest {
    /// Number of hooks, or of concepts in variation mode.
    pub count: usize,
    pub theme: Option<String>,
    /// Spread hooks across PCM personality tags.
    pub use_pcm: bool,
    /// When set, ask for concept groups with this many variations each.
    pub variations_per_concept: Option<usize>,
}

impl HookRequest {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            theme: None,
            use_pcm: false,
            variations_per_concept: None,
        }
    }

    pub fn with_theme(mut self, theme: Option<String>) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_pcm(mut self, use_pcm: bool) -> Self {
        self.use_pcm = use_pcm;
        self
    }

    pub fn with_variations(mut self, variations_per_concept: Option<usize>) -> Self {
        self.variations_per_concept = variations_per_concept.filter(|v| *v > 0);
        self
    }

    /// Upper bound on the number of hooks kept.
    pub fn max_hooks(&self) -> usize {
        self.count * self.variations_per_concept.unwrap_or(1)
    }
}

#[derive(Debug, Clone)]
pub struct HookOutput {
    pub hooks: Vec<GeneratedHook>,
    pub stats: StageStats,
}

/// Counters from local validation of a raw hook list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookValidationReport {
    pub missing_fields: usize,
    pub too_long: usize,
    pub duplicates: usize,
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Coerce a lever field to a list: arrays keep their string items, a bare
/// string is split on commas, anything else is empty.
pub fn coerce_levers(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn normalize_hook_type(raw: &str) -> String {
    match HookType::parse(raw) {
        Some(t) => t.as_str().to_string(),
        None => raw.trim().to_lowercase(),
    }
}

/// Dedup key: lowercase with whitespace collapsed.
pub fn dedup_key(hook: &str) -> String {
    hook.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Validate raw hook objects. The first occurrence of a duplicate wins.
pub fn validate_hooks(items: &[Value]) -> (Vec<GeneratedHook>, HookValidationReport) {
    let mut report = HookValidationReport::default();
    let mut seen = HashSet::new();
    let mut hooks = Vec::new();

    for item in items {
        let (Some(text), Some(hook_type)) =
            (string_field(item, "hook"), string_field(item, "hook_type"))
        else {
            report.missing_fields += 1;
            continue;
        };

        let mut hook = GeneratedHook::new(text, normalize_hook_type(&hook_type));
        if hook.word_count() > MAX_HOOK_WORDS {
            report.too_long += 1;
            continue;
        }
        if !seen.insert(dedup_key(&hook.hook)) {
            report.duplicates += 1;
            continue;
        }

        hook.parasocial_levers = coerce_levers(item.get("parasocial_levers"));
        hook.rationale = string_field(item, "rationale").unwrap_or_default();
        hook.pcm_type = string_field(item, "pcm_type").map(|s| s.to_lowercase());
        hook.concept_id = string_field(item, "concept_id");
        hook.variation = string_field(item, "variation");
        hook.recommended = item
            .get("recommended")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        hooks.push(hook);
    }
    (hooks, report)
}

/// Flatten concept groups into one object per variation. Concept-level
/// `hook_type`, levers and rationale fill in what a variation leaves out.
pub fn flatten_concepts(concepts: &[Value]) -> Vec<Value> {
    let mut flat = Vec::new();
    for (i, concept) in concepts.iter().enumerate() {
        let concept_id =
            string_field(concept, "concept_id").unwrap_or_else(|| format!("concept_{}", i + 1));
        let Some(variations) = concept.get("variations").and_then(Value::as_array) else {
            continue;
        };
        for variation in variations {
            let Value::Object(mut obj) = variation.clone() else {
                continue;
            };
            for key in ["hook_type", "parasocial_levers", "rationale", "pcm_type"] {
                if !obj.contains_key(key) {
                    if let Some(v) = concept.get(key) {
                        obj.insert(key.to_string(), v.clone());
                    }
                }
            }
            obj.insert("concept_id".to_string(), Value::String(concept_id.clone()));
            flat.push(Value::Object(obj));
        }
    }
    flat
}

/// Mark the first surviving variation of every concept as recommended.
pub fn mark_recommended(hooks: &mut [GeneratedHook]) {
    let mut seen = HashSet::new();
    for hook in hooks.iter_mut() {
        if let Some(concept) = &hook.concept_id {
            if seen.insert(concept.clone()) {
                hook.recommended = true;
            }
        }
    }
}

fn count_by<'a>(values: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for v in values {
        *counts.entry(v.to_string()).or_insert(0) += 1;
    }
    counts
}

pub struct HookGenerator {
    ctx: StageContext,
}

impl HookGenerator {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    pub async fn generate(
        &self,
        profile: &VoiceProfile,
        exemplars: &[CorpusMatch],
        request: &HookRequest,
    ) -> Result<HookOutput, StageError> {
        self.ctx.check_cancelled()?;
        let mut timer = StageTimer::start(PipelineStage::HookGeneration, request.count);

        let archetypes = profile.archetypes.tags();
        let distribution = distribute_hook_types(request.count, &archetypes);
        let pcm_distribution = if request.use_pcm {
            distribute_pcm_types(request.count)
        } else {
            Vec::new()
        };
        debug!(?distribution, ?archetypes, "Planned hook type distribution");

        let completion = CompletionRequest::new(prompts::hook_prompt(
            &distribution,
            &pcm_distribution,
            exemplars,
            request.theme.as_deref(),
            request.variations_per_concept,
        ))
        .with_system(prompts::hook_system(profile));

        let mut items = None;
        let mut last_error = None;
        for (attempt, temperature) in [INITIAL_TEMPERATURE, RETRY_TEMPERATURE]
            .into_iter()
            .enumerate()
        {
            let options = self.ctx.options(ModelTier::Mid, temperature);
            let response = self.ctx.complete(&completion, &options).await?;
            timer.add_tokens(response.usage);

            match parse_json_response::<Vec<Value>>(&response.text) {
                Ok(parsed) => {
                    items = Some(parsed);
                    break;
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        temperature, "Hook response unparseable: {}", e
                    );
                    last_error = Some(e);
                }
            }
        }
        let Some(items) = items else {
            return Err(StageError::Parse {
                stage: PipelineStage::HookGeneration.name(),
                attempts: 2,
                source: last_error.unwrap_or(ResponseParseError::Empty),
            });
        };

        let items = if request.variations_per_concept.is_some() {
            flatten_concepts(&items)
        } else {
            items
        };
        let (mut hooks, report) = validate_hooks(&items);
        hooks.truncate(request.max_hooks());
        if request.variations_per_concept.is_some() {
            mark_recommended(&mut hooks);
        }

        let stats = timer.stats_mut();
        stats.set_extra(
            "by_hook_type",
            count_by(hooks.iter().map(|h| h.hook_type.as_str())),
        );
        let by_pcm = count_by(hooks.iter().filter_map(|h| h.pcm_type.as_deref()));
        if !by_pcm.is_empty() {
            stats.set_extra("by_pcm_type", by_pcm);
        }
        stats.set_extra("dropped_duplicates", report.duplicates);
        stats.set_extra("dropped_too_long", report.too_long);
        stats.set_extra("dropped_missing_fields", report.missing_fields);
        let stats = timer.finish(hooks.len());

        info!(
            requested = request.count,
            accepted = hooks.len(),
            duplicates = report.duplicates,
            tokens = stats.tokens.total(),
            "Hook generation complete"
        );
        Ok(HookOutput { hooks, stats })
    }
}
