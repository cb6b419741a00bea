//! Script expansion: hooks into full hook/tension/payload/closer scripts.
//!
//! Hooks are sent in batches. A batch whose call or parse fails is logged and
//! skipped; the remaining batches still run. Structural checks afterwards are
//! advisory and only record issues.

use super::context::{StageContext, StageError};
use super::hooks::GeneratedHook;
use super::indexing::{global_index, plan_batches};
use super::opener::normalize_for_match;
use super::prompts;
use super::state::PipelineStage;
use super::stats::{StageStats, StageTimer};
use crate::llm::{parse_json_response, CompletionRequest, ModelTier};
use crate::store::CorpusMatch;
use crate::voice::{Boundaries, VoiceProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Speaking rate used to estimate duration.
pub const WORDS_PER_SECOND: f32 = 2.5;
/// Normalized hook prefix that must appear near the start of the script.
pub const HOOK_PREFIX_CHARS: usize = 30;
/// How far into the script the hook prefix is looked for.
pub const HOOK_SEARCH_CHARS: usize = 200;
const WORD_SLACK_BELOW: usize = 10;
const WORD_SLACK_ABOVE: usize = 20;
const TEMPERATURE: f32 = 0.8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationTier {
    Short,
    #[default]
    Medium,
    Long,
}

impl DurationTier {
    /// Target word band, inclusive.
    pub fn word_range(&self) -> (usize, usize) {
        match self {
            DurationTier::Short => (40, 75),
            DurationTier::Medium => (75, 150),
            DurationTier::Long => (150, 225),
        }
    }

    pub fn target_seconds(&self) -> u32 {
        match self {
            DurationTier::Short => 25,
            DurationTier::Medium => 45,
            DurationTier::Long => 75,
        }
    }

    /// Word counts outside this band are recorded as issues.
    pub fn accepted_word_range(&self) -> (usize, usize) {
        let (min, max) = self.word_range();
        (min.saturating_sub(WORD_SLACK_BELOW), max + WORD_SLACK_ABOVE)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DurationTier::Short => "short",
            DurationTier::Medium => "medium",
            DurationTier::Long => "long",
        }
    }
}

impl fmt::Display for DurationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(DurationTier::Short),
            "medium" => Ok(DurationTier::Medium),
            "long" => Ok(DurationTier::Long),
            other => Err(format!("unknown duration tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureBreakdown {
    #[serde(default)]
    pub hook: String,
    #[serde(default)]
    pub tension: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub closer: String,
}

impl StructureBreakdown {
    /// Names of the empty sections.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("hook", &self.hook),
            ("tension", &self.tension),
            ("payload", &self.payload),
            ("closer", &self.closer),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedScript {
    /// Position of the originating hook in the run's hook list.
    pub hook_index: usize,
    pub hook: String,
    pub script: String,
    pub word_count: usize,
    pub estimated_duration_seconds: f32,
    pub structure_breakdown: StructureBreakdown,
    pub parasocial_levers_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawExpanded {
    #[serde(default)]
    hook_index: Option<usize>,
    #[serde(default)]
    script: String,
    #[serde(default)]
    structure_breakdown: StructureBreakdown,
    #[serde(default)]
    parasocial_levers_used: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExpansionOutput {
    pub scripts: Vec<ExpandedScript>,
    pub stats: StageStats,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn estimated_duration_seconds(words: usize) -> f32 {
    words as f32 / WORDS_PER_SECOND
}

/// Whether the hook's first normalized characters appear within the first
/// [`HOOK_SEARCH_CHARS`] characters of the script.
pub fn hook_opens_script(hook: &str, script: &str) -> bool {
    let prefix: String = normalize_for_match(hook)
        .chars()
        .take(HOOK_PREFIX_CHARS)
        .collect();
    let prefix = prefix.trim_end();
    if prefix.is_empty() {
        return true;
    }
    let head: String = script.chars().take(HOOK_SEARCH_CHARS).collect();
    normalize_for_match(&head).contains(prefix)
}

/// Advisory structural checks for one expanded script.
pub fn structural_issues(
    script: &ExpandedScript,
    duration: DurationTier,
    boundaries: &Boundaries,
) -> Vec<String> {
    let mut issues = Vec::new();

    let (low, high) = duration.accepted_word_range();
    if script.word_count < low || script.word_count > high {
        issues.push(format!(
            "word count {} outside {}-{} for {} scripts",
            script.word_count, low, high, duration
        ));
    }
    if !hook_opens_script(&script.hook, &script.script) {
        issues.push(format!(
            "hook opening not found in first {} characters",
            HOOK_SEARCH_CHARS
        ));
    }
    for term in boundaries.violations_in(&script.script) {
        issues.push(format!("boundary term present: {}", term));
    }
    for field in script.structure_breakdown.missing_fields() {
        issues.push(format!("structure missing {}", field));
    }
    issues
}

pub struct ScriptExpander {
    ctx: StageContext,
    batch_size: usize,
}

impl ScriptExpander {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx, batch_size: 10 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn expand(
        &self,
        profile: &VoiceProfile,
        hooks: &[GeneratedHook],
        exemplars: &[CorpusMatch],
        duration: DurationTier,
    ) -> Result<ExpansionOutput, StageError> {
        self.ctx.check_cancelled()?;
        let mut timer = StageTimer::start(PipelineStage::ScriptExpansion, hooks.len());
        let system = prompts::expansion_system(profile);
        let options = self.ctx.options(ModelTier::Mid, TEMPERATURE);

        let batches = plan_batches(hooks.len(), self.batch_size);
        let mut by_index: BTreeMap<usize, ExpandedScript> = BTreeMap::new();
        let mut failed_batches = 0;

        for (batch_no, range) in batches.iter().enumerate() {
            if batch_no > 0 {
                self.ctx.pause_between_batches().await?;
            }
            let batch_hooks = &hooks[range.clone()];
            let request = CompletionRequest::new(prompts::expansion_prompt(
                batch_hooks,
                duration,
                exemplars,
            ))
            .with_system(system.clone());

            let response = match self.ctx.complete(&request, &options).await {
                Ok(response) => response,
                Err(e) => {
                    let e = StageError::from(e);
                    if matches!(e, StageError::Cancelled) {
                        return Err(e);
                    }
                    warn!(batch = batch_no, "Expansion batch failed, skipping: {}", e);
                    failed_batches += 1;
                    continue;
                }
            };
            timer.add_tokens(response.usage);

            let raws = match parse_json_response::<Vec<RawExpanded>>(&response.text) {
                Ok(raws) => raws,
                Err(e) => {
                    warn!(batch = batch_no, "Expansion batch unparseable, skipping: {}", e);
                    failed_batches += 1;
                    continue;
                }
            };

            for (position, raw) in raws.into_iter().enumerate() {
                let local = raw.hook_index.unwrap_or(position);
                let Some(hook_index) = global_index(range, local) else {
                    warn!(batch = batch_no, local, "Expanded script index outside batch, dropping");
                    continue;
                };
                if raw.script.trim().is_empty() {
                    warn!(hook_index, "Empty expanded script, dropping");
                    continue;
                }
                if by_index.contains_key(&hook_index) {
                    debug!(hook_index, "Duplicate expanded script for hook, keeping first");
                    continue;
                }

                let script = raw.script.trim().to_string();
                let words = word_count(&script);
                let mut expanded = ExpandedScript {
                    hook_index,
                    hook: hooks[hook_index].hook.clone(),
                    script,
                    word_count: words,
                    estimated_duration_seconds: estimated_duration_seconds(words),
                    structure_breakdown: raw.structure_breakdown,
                    parasocial_levers_used: raw.parasocial_levers_used,
                    validation_issues: Vec::new(),
                };
                expanded.validation_issues =
                    structural_issues(&expanded, duration, &profile.boundaries);
                by_index.insert(hook_index, expanded);
            }
        }

        let scripts: Vec<ExpandedScript> = by_index.into_values().collect();
        let with_issues = scripts
            .iter()
            .filter(|s| !s.validation_issues.is_empty())
            .count();
        let stats = timer.stats_mut();
        stats.set_extra("batches", batches.len());
        stats.set_extra("failed_batches", failed_batches);
        stats.set_extra("scripts_with_issues", with_issues);
        if !scripts.is_empty() {
            let avg = scripts.iter().map(|s| s.word_count).sum::<usize>() as f32
                / scripts.len() as f32;
            stats.set_extra("avg_word_count", avg);
        }
        let stats = timer.finish(scripts.len());

        info!(
            hooks = hooks.len(),
            scripts = scripts.len(),
            failed_batches,
            with_issues,
            "Script expansion complete"
        );
        Ok(ExpansionOutput { scripts, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::pipeline::test_llm::{stage_context, CannedLlm};
    use serde_json::json;

    fn expanded(hook: &str, script: &str) -> ExpandedScript {
        ExpandedScript {
            hook_index: 0,
            hook: hook.to_string(),
            script: script.to_string(),
            word_count: word_count(script),
            estimated_duration_seconds: estimated_duration_seconds(word_count(script)),
            structure_breakdown: StructureBreakdown {
                hook: "h".to_string(),
                tension: "t".to_string(),
                payload: "p".to_string(),
                closer: "c".to_string(),
            },
            parasocial_levers_used: Vec::new(),
            validation_issues: Vec::new(),
        }
    }

    #[test]
    fn test_duration_bands() {
        assert_eq!(DurationTier::Short.accepted_word_range(), (30, 95));
        assert_eq!(DurationTier::Medium.accepted_word_range(), (65, 170));
        assert_eq!("LONG".parse::<DurationTier>(), Ok(DurationTier::Long));
        assert!("epic".parse::<DurationTier>().is_err());
        assert_eq!(estimated_duration_seconds(100), 40.0);
    }

    #[test]
    fn test_clean_script_has_no_issues() {
        let body = "word ".repeat(50);
        let script = expanded("I need a man who stays", &format!("I need a man who stays. {}", body));
        let issues = structural_issues(&script, DurationTier::Short, &Boundaries::default());
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_issues_are_recorded_not_fatal() {
        let mut script = expanded(
            "I need a man who stays",
            "Let me tell you about my ex and his gym obsession",
        );
        script.structure_breakdown.closer.clear();
        let boundaries = Boundaries {
            hard_nos: vec!["ex".to_string()],
            topics_to_avoid: vec!["Gym".to_string()],
        };
        let issues = structural_issues(&script, DurationTier::Short, &boundaries);

        assert!(issues.iter().any(|i| i.starts_with("word count 11")));
        assert!(issues.iter().any(|i| i.contains("hook opening not found")));
        assert!(issues.iter().any(|i| i == "boundary term present: Gym"));
        assert!(issues.iter().any(|i| i == "structure missing closer"));
    }

    fn batch_reply(hooks: &[&str]) -> String {
        let scripts: Vec<_> = hooks
            .iter()
            .enumerate()
            .map(|(local, hook)| {
                json!({
                    "hook_index": local,
                    "script": format!("{}. {}", hook, "and then it got worse ".repeat(10)),
                    "structure_breakdown": {
                        "hook": hook, "tension": "t", "payload": "p", "closer": "c"
                    },
                })
            })
            .collect();
        serde_json::to_string(&scripts).unwrap()
    }

    #[tokio::test]
    async fn test_failed_batch_skipped_later_batches_keep_global_indices() {
        let hooks: Vec<GeneratedHook> = ["Hook zero here", "Hook one here", "Hook two here", "Hook three here"]
            .iter()
            .map(|h| GeneratedHook::new(*h, "tease"))
            .collect();
        let llm = CannedLlm::new(vec![
            Err(LlmError::Connection("reset by peer".to_string())),
            Ok(batch_reply(&["Hook two here", "Hook three here"])),
        ]);
        let expander = ScriptExpander::new(stage_context(llm)).with_batch_size(2);

        let output = expander
            .expand(&VoiceProfile::default(), &hooks, &[], DurationTier::Short)
            .await
            .unwrap();

        let indices: Vec<usize> = output.scripts.iter().map(|s| s.hook_index).collect();
        assert_eq!(indices, vec![2, 3]);
        assert_eq!(output.scripts[0].hook, "Hook two here");
        assert!(output.scripts[1].script.starts_with("Hook three here."));
        assert_eq!(output.stats.extra["failed_batches"], json!(1));
        assert_eq!(output.stats.extra["batches"], json!(2));
    }

    #[tokio::test]
    async fn test_unparseable_batch_skipped() {
        let hooks: Vec<GeneratedHook> = ["Hook zero here", "Hook one here", "Hook two here"]
            .iter()
            .map(|h| GeneratedHook::new(*h, "question"))
            .collect();
        let llm = CannedLlm::new(vec![
            Ok(batch_reply(&["Hook zero here", "Hook one here"])),
            Ok("I'm sorry, I can't help with that.".to_string()),
        ]);
        let expander = ScriptExpander::new(stage_context(llm)).with_batch_size(2);

        let output = expander
            .expand(&VoiceProfile::default(), &hooks, &[], DurationTier::Short)
            .await
            .unwrap();

        let indices: Vec<usize> = output.scripts.iter().map(|s| s.hook_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(output.stats.extra["failed_batches"], json!(1));
    }

    #[test]
    fn test_hook_prefix_within_window() {
        let late = format!("{}I need a man who stays", "blah ".repeat(50));
        assert!(!hook_opens_script("I need a man who stays", &late));
        assert!(hook_opens_script(
            "I need a man who stays",
            "Okay so, I need a man who stays."
        ));
    }
}
