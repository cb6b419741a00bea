//! LLM-based script validation with locally derived verdicts.
//!
//! The model scores each script; the verdict is always recomputed from the
//! score and the boundary violations, whatever the model claimed.

use super::context::{StageContext, StageError};
use super::indexing::{global_index, plan_batches};
use super::prompts;
use super::state::PipelineStage;
use super::stats::{StageStats, StageTimer};
use super::transform::TransformedScript;
use crate::llm::{parse_json_response, CompletionRequest, ModelTier};
use crate::voice::VoiceProfile;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Minimum score for PASS.
pub const PASS_THRESHOLD: f32 = 80.0;
/// Scores below this FAIL.
pub const FAIL_THRESHOLD: f32 = 60.0;
/// REVISE scores at or above this get low revision priority.
pub const LOW_PRIORITY_THRESHOLD: f32 = 75.0;
const MIN_ISSUE_OCCURRENCES: usize = 2;
const MAX_COMMON_ISSUES: usize = 5;
const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Revise,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Revise => "REVISE",
            Verdict::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionPriority {
    None,
    Low,
    Medium,
    High,
}

impl RevisionPriority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(RevisionPriority::None),
            "low" => Some(RevisionPriority::Low),
            "medium" => Some(RevisionPriority::Medium),
            "high" => Some(RevisionPriority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub script_index: usize,
    pub voice_fidelity_score: f32,
    pub ai_tells: Vec<String>,
    pub boundary_violations: Vec<String>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub verdict: Verdict,
    pub revision_priority: RevisionPriority,
}

impl ValidationResult {
    /// Reviewer notes handed to a revision pass.
    pub fn feedback(&self) -> String {
        let mut parts = vec![format!("Voice fidelity {:.0}/100.", self.voice_fidelity_score)];
        if !self.ai_tells.is_empty() {
            parts.push(format!("Remove AI tells: {}.", self.ai_tells.join("; ")));
        }
        if !self.improvements.is_empty() {
            parts.push(format!("Improve: {}.", self.improvements.join("; ")));
        }
        if !self.boundary_violations.is_empty() {
            parts.push(format!(
                "Remove boundary violations: {}.",
                self.boundary_violations.join("; ")
            ));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Deserialize)]
struct RawValidation {
    #[serde(default)]
    script_index: Option<usize>,
    #[serde(default)]
    voice_fidelity_score: Option<f32>,
    #[serde(default)]
    ai_tells: Vec<String>,
    #[serde(default)]
    boundary_violations: Vec<String>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
    /// Read for logging only.
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    revision_priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonIssue {
    pub issue: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub passed: usize,
    pub revise: usize,
    pub failed: usize,
    pub average_fidelity: Option<f32>,
    pub common_issues: Vec<CommonIssue>,
}

#[derive(Debug, Clone)]
pub struct ValidationOutput {
    pub results: Vec<ValidationResult>,
    pub summary: ValidationSummary,
    pub stats: StageStats,
}

/// PASS needs a score of at least 80 and no boundary violations; any
/// violation or a score under 60 fails; everything else is REVISE.
pub fn derive_verdict(score: f32, boundary_violations: &[String]) -> Verdict {
    if !boundary_violations.is_empty() || score < FAIL_THRESHOLD {
        Verdict::Fail
    } else if score >= PASS_THRESHOLD {
        Verdict::Pass
    } else {
        Verdict::Revise
    }
}

/// An explicit priority from the model wins; otherwise PASS needs none and
/// the rest are backfilled from the score.
pub fn derive_priority(explicit: Option<&str>, verdict: Verdict, score: f32) -> RevisionPriority {
    if let Some(priority) = explicit.and_then(RevisionPriority::parse) {
        return priority;
    }
    match verdict {
        Verdict::Pass => RevisionPriority::None,
        _ if score >= LOW_PRIORITY_THRESHOLD => RevisionPriority::Low,
        _ => RevisionPriority::Medium,
    }
}

fn clamp_score(score: Option<f32>) -> f32 {
    score
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 100.0))
        .unwrap_or(0.0)
}

fn normalize_issue(issue: &str) -> String {
    issue
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c.is_ascii_punctuation() && c != '"')
        .trim()
        .to_lowercase()
}

pub fn summarize(results: &[ValidationResult]) -> ValidationSummary {
    let mut summary = ValidationSummary {
        total: results.len(),
        ..Default::default()
    };
    for r in results {
        match r.verdict {
            Verdict::Pass => summary.passed += 1,
            Verdict::Revise => summary.revise += 1,
            Verdict::Fail => summary.failed += 1,
        }
    }
    if !results.is_empty() {
        summary.average_fidelity = Some(
            results.iter().map(|r| r.voice_fidelity_score).sum::<f32>() / results.len() as f32,
        );
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in results {
        for issue in r.ai_tells.iter().chain(r.improvements.iter()) {
            let key = normalize_issue(issue);
            if !key.is_empty() {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    }
    let mut common: Vec<CommonIssue> = counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_ISSUE_OCCURRENCES)
        .map(|(issue, count)| CommonIssue { issue, count })
        .collect();
    common.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.issue.cmp(&b.issue)));
    common.truncate(MAX_COMMON_ISSUES);
    summary.common_issues = common;
    summary
}

pub struct ScriptValidator {
    ctx: StageContext,
    batch_size: usize,
}

impl ScriptValidator {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx, batch_size: 10 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// `stage` is either the first validation or a revision re-validation.
    pub async fn validate(
        &self,
        profile: &VoiceProfile,
        scripts: &[TransformedScript],
        stage: PipelineStage,
    ) -> Result<ValidationOutput, StageError> {
        self.ctx.check_cancelled()?;
        let mut timer = StageTimer::start(stage, scripts.len());
        let system = prompts::validation_system(profile);
        let options = self.ctx.options(ModelTier::Cheap, TEMPERATURE);

        let batches = plan_batches(scripts.len(), self.batch_size);
        let mut results = Vec::with_capacity(scripts.len());
        let mut seen = HashSet::new();
        let mut failed_batches = 0;
        let mut overridden = 0;

        for (batch_no, range) in batches.iter().enumerate() {
            if batch_no > 0 {
                self.ctx.pause_between_batches().await?;
            }
            let request =
                CompletionRequest::new(prompts::validation_prompt(&scripts[range.clone()]))
                    .with_system(system.clone());

            let response = match self.ctx.complete(&request, &options).await {
                Ok(response) => response,
                Err(e) => {
                    let e = StageError::from(e);
                    if matches!(e, StageError::Cancelled) {
                        return Err(e);
                    }
                    warn!(batch = batch_no, "Validation batch failed, skipping: {}", e);
                    failed_batches += 1;
                    continue;
                }
            };
            timer.add_tokens(response.usage);

            let raws = match parse_json_response::<Vec<RawValidation>>(&response.text) {
                Ok(raws) => raws,
                Err(e) => {
                    warn!(batch = batch_no, "Validation batch unparseable, skipping: {}", e);
                    failed_batches += 1;
                    continue;
                }
            };

            for (position, raw) in raws.into_iter().enumerate() {
                let local = raw.script_index.unwrap_or(position);
                let Some(global) = global_index(range, local) else {
                    warn!(batch = batch_no, local, "Validation index outside batch, dropping");
                    continue;
                };
                let script_index = scripts[global].script_index;
                if !seen.insert(script_index) {
                    continue;
                }

                let score = clamp_score(raw.voice_fidelity_score);
                let verdict = derive_verdict(score, &raw.boundary_violations);
                if let Some(claimed) = raw.verdict.as_deref() {
                    if !claimed.trim().eq_ignore_ascii_case(verdict.as_str()) {
                        overridden += 1;
                        debug!(
                            script_index,
                            claimed,
                            derived = %verdict,
                            score,
                            "Model verdict overridden"
                        );
                    }
                }
                results.push(ValidationResult {
                    script_index,
                    voice_fidelity_score: score,
                    ai_tells: raw.ai_tells,
                    boundary_violations: raw.boundary_violations,
                    strengths: raw.strengths,
                    improvements: raw.improvements,
                    verdict,
                    revision_priority: derive_priority(
                        raw.revision_priority.as_deref(),
                        verdict,
                        score,
                    ),
                });
            }
        }
        results.sort_by_key(|r| r.script_index);
        let summary = summarize(&results);

        let verdicts: BTreeMap<&str, usize> = [
            ("PASS", summary.passed),
            ("REVISE", summary.revise),
            ("FAIL", summary.failed),
        ]
        .into_iter()
        .collect();
        let stats = timer.stats_mut();
        stats.set_extra("verdicts", verdicts);
        stats.set_extra("failed_batches", failed_batches);
        stats.set_extra("verdicts_overridden", overridden);
        if let Some(avg) = summary.average_fidelity {
            stats.set_extra("avg_fidelity", avg);
        }
        let stats = timer.finish(results.len());

        info!(
            stage = %stage,
            scripts = scripts.len(),
            passed = summary.passed,
            revise = summary.revise,
            failed = summary.failed,
            "Validation complete"
        );
        Ok(ValidationOutput {
            results,
            summary,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::pipeline::opener::OpenerOutcome;
    use crate::pipeline::test_llm::{stage_context, CannedLlm};
    use serde_json::json;

    fn transformed(script_index: usize) -> TransformedScript {
        let text = format!("I need a man who stays, take {}", script_index);
        TransformedScript {
            script_index,
            original_hook: "I need a man who stays".to_string(),
            word_count: text.split_whitespace().count(),
            transformed_script: text,
            changes_made: Vec::new(),
            voice_fidelity_score: None,
            ai_tells_removed: Vec::new(),
            voice_elements_added: Vec::new(),
            opener: OpenerOutcome::AlreadyMatched,
        }
    }

    fn result(index: usize, score: f32, tells: &[&str], improvements: &[&str]) -> ValidationResult {
        let verdict = derive_verdict(score, &[]);
        ValidationResult {
            script_index: index,
            voice_fidelity_score: score,
            ai_tells: tells.iter().map(|s| s.to_string()).collect(),
            boundary_violations: Vec::new(),
            strengths: Vec::new(),
            improvements: improvements.iter().map(|s| s.to_string()).collect(),
            verdict,
            revision_priority: derive_priority(None, verdict, score),
        }
    }

    #[test]
    fn test_verdict_ignores_model_claim() {
        assert_eq!(derive_verdict(85.0, &[]), Verdict::Pass);
        assert_eq!(derive_verdict(50.0, &[]), Verdict::Fail);
        assert_eq!(derive_verdict(80.0, &[]), Verdict::Pass);
        assert_eq!(derive_verdict(79.9, &[]), Verdict::Revise);
        assert_eq!(derive_verdict(60.0, &[]), Verdict::Revise);
        assert_eq!(
            derive_verdict(95.0, &["mentions ex".to_string()]),
            Verdict::Fail
        );
    }

    #[test]
    fn test_priority_backfill() {
        assert_eq!(
            derive_priority(None, Verdict::Pass, 90.0),
            RevisionPriority::None
        );
        assert_eq!(
            derive_priority(None, Verdict::Revise, 77.0),
            RevisionPriority::Low
        );
        assert_eq!(
            derive_priority(None, Verdict::Revise, 65.0),
            RevisionPriority::Medium
        );
        assert_eq!(
            derive_priority(Some("HIGH"), Verdict::Revise, 77.0),
            RevisionPriority::High
        );
        assert_eq!(
            derive_priority(Some("urgent"), Verdict::Fail, 40.0),
            RevisionPriority::Medium
        );
    }

    #[test]
    fn test_scores_clamped() {
        assert_eq!(clamp_score(Some(140.0)), 100.0);
        assert_eq!(clamp_score(Some(-3.0)), 0.0);
        assert_eq!(clamp_score(None), 0.0);
    }

    #[test]
    fn test_summary_common_issues() {
        let results = vec![
            result(0, 90.0, &["Honestly, opener"], &["more filler"]),
            result(1, 70.0, &["honestly,  opener."], &["More filler!"]),
            result(2, 40.0, &["HONESTLY, OPENER"], &["shorter"]),
        ];
        let summary = summarize(&results);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.revise, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.average_fidelity.unwrap() - 66.666).abs() < 0.01);
        assert_eq!(
            summary.common_issues,
            vec![
                CommonIssue {
                    issue: "honestly, opener".to_string(),
                    count: 3
                },
                CommonIssue {
                    issue: "more filler".to_string(),
                    count: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_batch_skipped_results_map_to_script_index() {
        // Script indices are not positions: the run dropped some earlier.
        let scripts: Vec<TransformedScript> = [3, 5, 8, 9].into_iter().map(transformed).collect();
        let second_batch = json!([
            {"script_index": 1, "voice_fidelity_score": 55, "verdict": "PASS"},
            {"script_index": 0, "voice_fidelity_score": 88, "verdict": "PASS"},
        ]);
        let llm = CannedLlm::new(vec![
            Err(LlmError::RateLimited),
            Ok(second_batch.to_string()),
        ]);
        let validator = ScriptValidator::new(stage_context(llm)).with_batch_size(2);

        let output = validator
            .validate(&VoiceProfile::default(), &scripts, PipelineStage::Validation)
            .await
            .unwrap();

        let verdicts: Vec<(usize, Verdict)> = output
            .results
            .iter()
            .map(|r| (r.script_index, r.verdict))
            .collect();
        assert_eq!(verdicts, vec![(8, Verdict::Pass), (9, Verdict::Fail)]);
        assert_eq!(output.stats.extra["failed_batches"], json!(1));
        assert_eq!(output.stats.extra["verdicts_overridden"], json!(1));
        assert_eq!(output.summary.total, 2);
    }

    #[tokio::test]
    async fn test_unparseable_batch_skipped() {
        let scripts: Vec<TransformedScript> = (0..3).map(transformed).collect();
        let llm = CannedLlm::new(vec![
            Ok(json!([{"voice_fidelity_score": 91}, {"voice_fidelity_score": 72}]).to_string()),
            Ok("```json\n{\"oops\": true\n```".to_string()),
        ]);
        let validator = ScriptValidator::new(stage_context(llm)).with_batch_size(2);

        let output = validator
            .validate(&VoiceProfile::default(), &scripts, PipelineStage::Validation)
            .await
            .unwrap();

        let verdicts: Vec<(usize, Verdict)> = output
            .results
            .iter()
            .map(|r| (r.script_index, r.verdict))
            .collect();
        assert_eq!(verdicts, vec![(0, Verdict::Pass), (1, Verdict::Revise)]);
        assert_eq!(output.stats.extra["failed_batches"], json!(1));
    }

    #[test]
    fn test_feedback_mentions_issues() {
        let r = result(0, 70.0, &["balanced grammar"], &["use the catchphrase"]);
        let feedback = r.feedback();
        assert!(feedback.contains("balanced grammar"));
        assert!(feedback.contains("use the catchphrase"));
    }
}
