use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,

    // Gateways
    pub llm: Option<LlmConfig>,
    pub embedding: Option<EmbeddingConfig>,

    // Pipeline knobs
    pub pipeline: Option<PipelineFileConfig>,
    pub retrieval: Option<RetrievalConfig>,
    pub pricing: Option<PricingConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// Messages API base URL, e.g. "https://api.anthropic.com"
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Shell command printing the API key on stdout
    pub api_key_command: Option<String>,
    pub cheap_model: Option<String>,
    pub mid_model: Option<String>,
    pub premium_model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub model: Option<String>,
    pub dimensions: Option<u32>,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PipelineFileConfig {
    pub hook_count: Option<usize>,
    /// "short", "medium" or "long"
    pub duration: Option<String>,
    pub expansion_batch_size: Option<usize>,
    pub transform_batch_size: Option<usize>,
    pub validation_batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub max_revision_attempts: Option<u32>,
    pub shareability: Option<bool>,
    pub variation_mode: Option<bool>,
    pub variations_per_concept: Option<usize>,
    pub use_pcm: Option<bool>,
    pub transform_max_retries: Option<u32>,
    pub transform_retry_base_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub limit: Option<usize>,
    pub min_similarity: Option<f32>,
    pub diversify: Option<bool>,
    pub per_hook_type: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TierPriceConfig {
    pub input_per_million: Option<f64>,
    pub output_per_million: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PricingConfig {
    pub cheap: Option<TierPriceConfig>,
    pub mid: Option<TierPriceConfig>,
    pub premium: Option<TierPriceConfig>,
    pub embedding_flat_cost: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
