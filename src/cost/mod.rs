//! Cost estimation and per-run batch records.

use crate::llm::{ModelTier, TokenUsage};
use crate::pipeline::StageStats;
use crate::store::BatchRecord;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl TierPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost_of(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    pub cheap: TierPrice,
    pub mid: TierPrice,
    pub premium: TierPrice,
    /// Flat charge per run for the embedding calls.
    pub embedding_flat_cost: f64,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            cheap: TierPrice::new(0.80, 4.00),
            mid: TierPrice::new(3.00, 15.00),
            premium: TierPrice::new(15.00, 75.00),
            embedding_flat_cost: 0.0001,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub by_stage: BTreeMap<String, f64>,
    pub embedding: f64,
    pub total_usd: f64,
}

impl PricingTable {
    pub fn price(&self, tier: ModelTier) -> TierPrice {
        match tier {
            ModelTier::Cheap => self.cheap,
            ModelTier::Mid => self.mid,
            ModelTier::Premium => self.premium,
        }
    }

    /// Price every stage by its tier; stages without an LLM tier are free.
    pub fn estimate(&self, stages: &[StageStats]) -> CostEstimate {
        let mut by_stage = BTreeMap::new();
        for stage in stages {
            let Some(tier) = stage.tier else {
                continue;
            };
            *by_stage.entry(stage.name.clone()).or_insert(0.0) +=
                self.price(tier).cost_of(&stage.tokens);
        }
        let total_usd = by_stage.values().sum::<f64>() + self.embedding_flat_cost;
        CostEstimate {
            by_stage,
            embedding: self.embedding_flat_cost,
            total_usd,
        }
    }
}

/// Stage counts that go into a batch record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub hooks_generated: usize,
    pub scripts_expanded: usize,
    pub scripts_transformed: usize,
    pub revision_attempts: u32,
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, n) = values.fold((0.0f32, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f32)
}

/// Assemble the summary record of one run. `passed` holds
/// `(voice_fidelity_score, word_count)` of the passed scripts only.
pub fn build_batch_record(
    model_id: &str,
    counts: BatchCounts,
    stages: &[StageStats],
    passed: &[(f32, usize)],
    total_time_ms: u64,
    cost: &CostEstimate,
) -> BatchRecord {
    let mut stage_tokens: BTreeMap<String, TokenUsage> = BTreeMap::new();
    for stage in stages {
        *stage_tokens.entry(stage.name.clone()).or_default() += stage.tokens;
    }

    BatchRecord {
        id: uuid::Uuid::new_v4().to_string(),
        model_id: model_id.to_string(),
        created_at: Utc::now(),
        hooks_generated: counts.hooks_generated,
        scripts_expanded: counts.scripts_expanded,
        scripts_transformed: counts.scripts_transformed,
        scripts_passed: passed.len(),
        revision_attempts: counts.revision_attempts,
        stage_tokens,
        total_time_ms,
        estimated_cost_usd: cost.total_usd,
        avg_fidelity: mean(passed.iter().map(|(f, _)| *f)),
        avg_word_count: mean(passed.iter().map(|(_, w)| *w as f32)),
    }
}
