//! Optional shareability scoring of hooks.
//!
//! Hooks are re-ordered by score, never dropped. Any failure other than
//! cancellation leaves the hooks unscored in their original order.

use super::context::{StageContext, StageError};
use super::hooks::GeneratedHook;
use super::prompts;
use super::state::PipelineStage;
use super::stats::{StageStats, StageTimer};
use crate::llm::{parse_json_response, CompletionRequest, ModelTier};
use crate::voice::VoiceProfile;
use serde::Deserialize;
use std::cmp::Ordering;
use tracing::{info, warn};

const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Deserialize)]
struct RawScore {
    index: usize,
    score: f32,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShareabilityOutput {
    pub hooks: Vec<GeneratedHook>,
    pub stats: StageStats,
}

/// Attach scores by index, then sort by descending score. The sort is stable
/// and unscored hooks go last.
fn apply_scores(mut hooks: Vec<GeneratedHook>, scores: Vec<RawScore>) -> (Vec<GeneratedHook>, usize) {
    let mut applied = 0;
    for raw in scores {
        let Some(hook) = hooks.get_mut(raw.index) else {
            warn!(index = raw.index, "Shareability score for unknown hook index");
            continue;
        };
        if !raw.score.is_finite() {
            continue;
        }
        hook.shareability_score = Some(raw.score.clamp(0.0, 100.0));
        hook.shareability_reason = raw.reason.filter(|r| !r.trim().is_empty());
        applied += 1;
    }
    hooks.sort_by(|a, b| match (a.shareability_score, b.shareability_score) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    (hooks, applied)
}

pub struct ShareabilityScorer {
    ctx: StageContext,
}

impl ShareabilityScorer {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    pub async fn score(
        &self,
        profile: &VoiceProfile,
        hooks: Vec<GeneratedHook>,
    ) -> Result<ShareabilityOutput, StageError> {
        self.ctx.check_cancelled()?;
        let mut timer = StageTimer::start(PipelineStage::ShareabilityScoring, hooks.len());
        if hooks.is_empty() {
            return Ok(ShareabilityOutput {
                hooks,
                stats: timer.finish(0),
            });
        }

        let request = CompletionRequest::new(prompts::shareability_prompt(profile, &hooks));
        let options = self.ctx.options(ModelTier::Cheap, TEMPERATURE);
        let scores = match self.ctx.complete(&request, &options).await {
            Ok(response) => {
                timer.add_tokens(response.usage);
                match parse_json_response::<Vec<RawScore>>(&response.text) {
                    Ok(scores) => Some(scores),
                    Err(e) => {
                        warn!("Shareability response unparseable, keeping hooks unscored: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                let e = StageError::from(e);
                if matches!(e, StageError::Cancelled) {
                    return Err(e);
                }
                warn!("Shareability scoring failed, keeping hooks unscored: {}", e);
                None
            }
        };

        let count = hooks.len();
        let (hooks, applied) = match scores {
            Some(scores) => apply_scores(hooks, scores),
            None => (hooks, 0),
        };
        timer.stats_mut().set_extra("scored", applied);
        info!(hooks = count, scored = applied, "Shareability scoring complete");
        Ok(ShareabilityOutput {
            hooks,
            stats: timer.finish(count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hooks(texts: &[&str]) -> Vec<GeneratedHook> {
        texts.iter().map(|t| GeneratedHook::new(*t, "tease")).collect()
    }

    fn score(index: usize, score: f32) -> RawScore {
        RawScore {
            index,
            score,
            reason: Some("because".to_string()),
        }
    }

    #[test]
    fn test_sorted_by_score_and_never_dropped() {
        let (sorted, applied) = apply_scores(
            hooks(&["a", "b", "c", "d"]),
            vec![score(0, 40.0), score(1, 90.0), score(2, 40.0), score(9, 99.0)],
        );
        let order: Vec<&str> = sorted.iter().map(|h| h.hook.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
        assert_eq!(applied, 3);
        assert_eq!(sorted[3].shareability_score, None);
    }

    #[test]
    fn test_scores_are_clamped() {
        let (sorted, _) = apply_scores(hooks(&["a"]), vec![score(0, 140.0)]);
        assert_eq!(sorted[0].shareability_score, Some(100.0));
    }
}
