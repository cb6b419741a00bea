use super::state::PipelineStage;
use crate::llm::{ModelTier, TokenUsage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Counters for one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub name: String,
    pub tier: Option<ModelTier>,
    pub input_count: usize,
    pub output_count: usize,
    pub elapsed_ms: u64,
    pub tokens: TokenUsage,
    /// Stage-specific figures (counts by hook type, verdict counts, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StageStats {
    pub fn new(name: impl Into<String>, tier: Option<ModelTier>) -> Self {
        Self {
            name: name.into(),
            tier,
            input_count: 0,
            output_count: 0,
            elapsed_ms: 0,
            tokens: TokenUsage::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn for_stage(stage: PipelineStage) -> Self {
        Self::new(stage.name(), stage.tier())
    }

    pub fn with_extra(mut self, key: &str, value: impl Serialize) -> Self {
        self.set_extra(key, value);
        self
    }

    pub fn set_extra(&mut self, key: &str, value: impl Serialize) {
        if let Ok(value) = serde_json::to_value(value) {
            self.extra.insert(key.to_string(), value);
        }
    }
}

/// Measures a stage from creation to [`StageTimer::finish`].
pub struct StageTimer {
    stats: StageStats,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: PipelineStage, input_count: usize) -> Self {
        let mut stats = StageStats::for_stage(stage);
        stats.input_count = input_count;
        Self {
            stats,
            started: Instant::now(),
        }
    }

    pub fn add_tokens(&mut self, usage: TokenUsage) {
        self.stats.tokens += usage;
    }

    pub fn stats_mut(&mut self) -> &mut StageStats {
        &mut self.stats
    }

    pub fn finish(mut self, output_count: usize) -> StageStats {
        self.stats.output_count = output_count;
        self.stats.elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.stats
    }
}

/// Run-level totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub elapsed_ms: u64,
    pub tokens: TokenUsage,
    pub final_count: usize,
    pub estimated_cost_usd: f64,
}

impl RunTotals {
    pub fn tokens_of(stages: &[StageStats]) -> TokenUsage {
        stages
            .iter()
            .fold(TokenUsage::default(), |acc, s| acc + s.tokens)
    }
}
