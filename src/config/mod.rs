mod file_config;

pub use file_config::{
    EmbeddingConfig, FileConfig, LlmConfig, PipelineFileConfig, PricingConfig, RetrievalConfig,
    TierPriceConfig,
};

use crate::corpus::RetrievalOptions;
use crate::cost::{PricingTable, TierPrice};
use crate::embedding::MAX_EMBEDDING_BATCH;
use crate::llm::TierModels;
use crate::pipeline::{DurationTier, PipelineConfig, RetryPolicy};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the LLM gateway.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub models: TierModels,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: None,
            api_key_command: None,
            models: TierModels::default(),
            timeout_secs: 120,
            max_tokens: 8192,
        }
    }
}

/// Settings for the embedding gateway.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub model: String,
    pub dimensions: Option<u32>,
    /// Inputs per request, at most [`MAX_EMBEDDING_BATCH`]
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_command: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            batch_size: 100,
            timeout_secs: 60,
        }
    }
}

/// Pipeline knobs with their defaults.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub hook_count: usize,
    pub duration: DurationTier,
    pub expansion_batch_size: usize,
    pub transform_batch_size: usize,
    pub validation_batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_revision_attempts: u32,
    pub shareability: bool,
    pub variation_mode: bool,
    pub variations_per_concept: usize,
    pub use_pcm: bool,
    pub transform_max_retries: u32,
    pub transform_retry_base_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            hook_count: 10,
            duration: DurationTier::Medium,
            expansion_batch_size: 10,
            transform_batch_size: 5,
            validation_batch_size: 10,
            batch_delay_ms: 500,
            max_revision_attempts: 2,
            shareability: false,
            variation_mode: false,
            variations_per_concept: 3,
            use_pcm: false,
            transform_max_retries: 2,
            transform_retry_base_ms: 1000,
        }
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub llm_api_key: Option<String>,
    pub embedding_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub pipeline: PipelineSettings,
    pub retrieval: RetrievalOptions,
    pub pricing: PricingTable,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        // LLM gateway
        let llm_file = file.llm.unwrap_or_default();
        let llm_defaults = LlmSettings::default();
        let llm = LlmSettings {
            base_url: llm_file.base_url.unwrap_or(llm_defaults.base_url),
            api_key: llm_file.api_key.or_else(|| cli.llm_api_key.clone()),
            api_key_command: llm_file.api_key_command,
            models: TierModels {
                cheap: llm_file.cheap_model.unwrap_or(llm_defaults.models.cheap),
                mid: llm_file.mid_model.unwrap_or(llm_defaults.models.mid),
                premium: llm_file.premium_model.unwrap_or(llm_defaults.models.premium),
            },
            timeout_secs: llm_file.timeout_secs.unwrap_or(llm_defaults.timeout_secs),
            max_tokens: llm_file.max_tokens.unwrap_or(llm_defaults.max_tokens),
        };

        // Embedding gateway
        let embedding_file = file.embedding.unwrap_or_default();
        let embedding_defaults = EmbeddingSettings::default();
        let batch_size = embedding_file
            .batch_size
            .unwrap_or(embedding_defaults.batch_size);
        if batch_size == 0 || batch_size > MAX_EMBEDDING_BATCH {
            bail!(
                "embedding.batch_size must be between 1 and {}, got {}",
                MAX_EMBEDDING_BATCH,
                batch_size
            );
        }
        let embedding = EmbeddingSettings {
            base_url: embedding_file
                .base_url
                .unwrap_or(embedding_defaults.base_url),
            api_key: embedding_file
                .api_key
                .or_else(|| cli.embedding_api_key.clone()),
            api_key_command: embedding_file.api_key_command,
            model: embedding_file.model.unwrap_or(embedding_defaults.model),
            dimensions: embedding_file.dimensions.or(embedding_defaults.dimensions),
            batch_size,
            timeout_secs: embedding_file
                .timeout_secs
                .unwrap_or(embedding_defaults.timeout_secs),
        };

        // Pipeline
        let pipeline_file = file.pipeline.unwrap_or_default();
        let pipeline_defaults = PipelineSettings::default();
        let duration = match pipeline_file.duration {
            Some(raw) => raw
                .parse::<DurationTier>()
                .map_err(|e| anyhow::anyhow!("Invalid pipeline.duration: {}", e))?,
            None => pipeline_defaults.duration,
        };
        let pipeline = PipelineSettings {
            hook_count: pipeline_file
                .hook_count
                .unwrap_or(pipeline_defaults.hook_count),
            duration,
            expansion_batch_size: pipeline_file
                .expansion_batch_size
                .unwrap_or(pipeline_defaults.expansion_batch_size)
                .max(1),
            transform_batch_size: pipeline_file
                .transform_batch_size
                .unwrap_or(pipeline_defaults.transform_batch_size)
                .max(1),
            validation_batch_size: pipeline_file
                .validation_batch_size
                .unwrap_or(pipeline_defaults.validation_batch_size)
                .max(1),
            batch_delay_ms: pipeline_file
                .batch_delay_ms
                .unwrap_or(pipeline_defaults.batch_delay_ms),
            max_revision_attempts: pipeline_file
                .max_revision_attempts
                .unwrap_or(pipeline_defaults.max_revision_attempts),
            shareability: pipeline_file
                .shareability
                .unwrap_or(pipeline_defaults.shareability),
            variation_mode: pipeline_file
                .variation_mode
                .unwrap_or(pipeline_defaults.variation_mode),
            variations_per_concept: pipeline_file
                .variations_per_concept
                .unwrap_or(pipeline_defaults.variations_per_concept)
                .max(1),
            use_pcm: pipeline_file.use_pcm.unwrap_or(pipeline_defaults.use_pcm),
            transform_max_retries: pipeline_file
                .transform_max_retries
                .unwrap_or(pipeline_defaults.transform_max_retries),
            transform_retry_base_ms: pipeline_file
                .transform_retry_base_ms
                .unwrap_or(pipeline_defaults.transform_retry_base_ms),
        };

        // Retrieval
        let retrieval_file = file.retrieval.unwrap_or_default();
        let retrieval_defaults = RetrievalOptions::default();
        let retrieval = RetrievalOptions {
            limit: retrieval_file.limit.unwrap_or(retrieval_defaults.limit),
            min_similarity: retrieval_file
                .min_similarity
                .unwrap_or(retrieval_defaults.min_similarity),
            diversify: retrieval_file
                .diversify
                .unwrap_or(retrieval_defaults.diversify),
            per_hook_type: retrieval_file
                .per_hook_type
                .unwrap_or(retrieval_defaults.per_hook_type),
            ..retrieval_defaults
        };

        // Pricing
        let pricing_file = file.pricing.unwrap_or_default();
        let pricing_defaults = PricingTable::default();
        let pricing = PricingTable {
            cheap: resolve_price(pricing_file.cheap, pricing_defaults.cheap),
            mid: resolve_price(pricing_file.mid, pricing_defaults.mid),
            premium: resolve_price(pricing_file.premium, pricing_defaults.premium),
            embedding_flat_cost: pricing_file
                .embedding_flat_cost
                .unwrap_or(pricing_defaults.embedding_flat_cost),
        };

        Ok(AppConfig {
            db_dir,
            llm,
            embedding,
            pipeline,
            retrieval,
            pricing,
        })
    }

    pub fn studio_db_path(&self) -> PathBuf {
        self.db_dir.join("studio.db")
    }

    pub fn corpus_db_path(&self) -> PathBuf {
        self.db_dir.join("corpus.db")
    }

    /// Orchestrator configuration built from the pipeline, retrieval and
    /// pricing sections.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let settings = &self.pipeline;
        PipelineConfig {
            expansion_batch_size: settings.expansion_batch_size,
            transform_batch_size: settings.transform_batch_size,
            validation_batch_size: settings.validation_batch_size,
            max_revision_attempts: settings.max_revision_attempts,
            transform_retry: RetryPolicy::new(
                settings.transform_max_retries,
                Duration::from_millis(settings.transform_retry_base_ms),
            ),
            shareability: settings.shareability,
            variations_per_concept: settings
                .variation_mode
                .then_some(settings.variations_per_concept),
            use_pcm: settings.use_pcm,
            retrieval: self.retrieval.clone(),
            pricing: self.pricing.clone(),
        }
    }
}

fn resolve_price(file: Option<TierPriceConfig>, default: TierPrice) -> TierPrice {
    let file = file.unwrap_or_default();
    TierPrice::new(
        file.input_per_million.unwrap_or(default.input_per_million),
        file.output_per_million.unwrap_or(default.output_per_million),
    )
}
