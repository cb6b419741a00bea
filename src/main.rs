use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookforge::config::{self, AppConfig};
use hookforge::corpus::{backfill_embeddings, ingest_delimited, CorpusRetriever};
use hookforge::embedding::{EmbeddingProvider, OpenAiEmbeddingProvider};
use hookforge::llm::{AnthropicProvider, ApiKeySource, LlmProvider};
use hookforge::pipeline::{DurationTier, Pipeline, PipelineRequest, StageContext};
use hookforge::store::{Model, ModelStore, SqliteCorpusStore, SqliteStudioStore};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

fn parse_delimiter(s: &str) -> Result<char, String> {
    match s {
        "\\t" | "tab" => Ok('\t'),
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format!("Delimiter must be a single character, got '{}'", s)),
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "hookforge", version, about = "Voice-matched short-form script generation")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (studio.db, corpus.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// API key for the LLM gateway.
    #[clap(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// API key for the embedding gateway.
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the full pipeline for one creator and prints a JSON summary.
    Generate {
        #[clap(long)]
        model_id: String,

        /// Number of hooks (concepts in variation mode). Defaults to the config value.
        #[clap(long)]
        hooks: Option<usize>,

        /// Thematic direction for the hooks.
        #[clap(long)]
        theme: Option<String>,

        /// short, medium or long. Defaults to the config value.
        #[clap(long)]
        duration: Option<DurationTier>,

        /// Skip saving scripts and the batch record.
        #[clap(long)]
        no_persist: bool,
    },

    /// Loads a delimited file of prior scripts into the corpus.
    IngestCorpus {
        #[clap(long, value_parser = parse_path)]
        file: PathBuf,

        /// Field delimiter; use "tab" for TSV.
        #[clap(long, default_value = ",", value_parser = parse_delimiter)]
        delimiter: char,
    },

    /// Embeds corpus rows that have no embedding yet.
    BackfillEmbeddings {
        /// Stop after this many rows.
        #[clap(long)]
        limit: Option<usize>,
    },

    /// Inserts or replaces a creator from a JSON file.
    UpsertModel {
        #[clap(long, value_parser = parse_path)]
        file: PathBuf,
    },

    /// Checks that both gateways are reachable.
    Health,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            llm_api_key: args.llm_api_key.clone(),
            embedding_api_key: args.embedding_api_key.clone(),
        }
    }
}

fn build_llm(app_config: &AppConfig) -> Result<Arc<dyn LlmProvider>> {
    let key_source = ApiKeySource::from_config(
        app_config.llm.api_key.clone(),
        app_config.llm.api_key_command.clone(),
    );
    if !key_source.is_configured() {
        anyhow::bail!("No LLM API key configured: set --llm-api-key, ANTHROPIC_API_KEY or [llm] api_key");
    }
    Ok(Arc::new(AnthropicProvider::new(
        &app_config.llm.base_url,
        app_config.llm.models.clone(),
        key_source,
    )))
}

fn build_embedder(app_config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let settings = &app_config.embedding;
    let key_source =
        ApiKeySource::from_config(settings.api_key.clone(), settings.api_key_command.clone());
    if !key_source.is_configured() {
        anyhow::bail!(
            "No embedding API key configured: set --embedding-api-key, OPENAI_API_KEY or [embedding] api_key"
        );
    }
    Ok(Arc::new(
        OpenAiEmbeddingProvider::new(&settings.base_url, &settings.model, key_source)
            .with_dimensions(settings.dimensions)
            .with_batch_size(settings.batch_size)
            .with_timeout(Duration::from_secs(settings.timeout_secs)),
    ))
}

async fn run_generate(
    app_config: &AppConfig,
    request: PipelineRequest,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let llm = build_llm(app_config)?;
    let embedder = build_embedder(app_config)?;

    let studio_store = Arc::new(SqliteStudioStore::new(app_config.studio_db_path())?);
    let corpus_store = Arc::new(SqliteCorpusStore::new(app_config.corpus_db_path())?);

    let retriever = CorpusRetriever::new(studio_store.clone(), corpus_store, embedder);
    let ctx = StageContext::new(llm, shutdown_token)
        .with_call_timeout(Duration::from_secs(app_config.llm.timeout_secs))
        .with_batch_delay(Duration::from_millis(app_config.pipeline.batch_delay_ms))
        .with_max_tokens(app_config.llm.max_tokens);
    let pipeline = Pipeline::new(
        studio_store.clone(),
        studio_store,
        retriever,
        ctx,
        app_config.pipeline_config(),
    );

    let result = pipeline.run(&request).await?;

    let summary = json!({
        "batch_id": result.batch_id,
        "model_id": result.model_id,
        "scripts_passed": result.scripts.len(),
        "revision_attempts": result.revision_attempts,
        "validation": result.validation_summary,
        "totals": result.totals,
        "cost": result.cost,
        "stages": result.stages,
        "retrieval": result.retrieval_stats,
        "scripts": result.scripts,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_ingest(app_config: &AppConfig, file: PathBuf, delimiter: char) -> Result<()> {
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read corpus file: {:?}", file))?;
    let corpus_store = SqliteCorpusStore::new(app_config.corpus_db_path())?;
    let report = ingest_delimited(&corpus_store, &text, delimiter)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_backfill(app_config: &AppConfig, limit: Option<usize>) -> Result<()> {
    let embedder = build_embedder(app_config)?;
    let corpus_store = SqliteCorpusStore::new(app_config.corpus_db_path())?;

    let bar = match limit {
        Some(limit) => ProgressBar::new(limit as u64),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos} embedded {msg}") {
        bar.set_style(style);
    }
    let report = backfill_embeddings(
        &corpus_store,
        embedder.as_ref(),
        app_config.embedding.batch_size,
        limit,
        |embedded| bar.set_position(embedded as u64),
    )
    .await;
    bar.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&report?)?);
    Ok(())
}

fn run_upsert_model(app_config: &AppConfig, file: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read model file: {:?}", file))?;
    let model: Model = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse model file: {:?}", file))?;
    if !model.voice_profile.archetypes.mix_is_normalized() {
        warn!(model_id = %model.id, "Archetype mix does not sum to 1.0");
    }
    let studio_store = SqliteStudioStore::new(app_config.studio_db_path())?;
    studio_store.upsert_model(&model)?;
    info!(model_id = %model.id, "Model saved");
    Ok(())
}

async fn run_health(app_config: &AppConfig) -> Result<()> {
    let llm = build_llm(app_config)?;
    let embedder = build_embedder(app_config)?;

    let llm_status = match llm.health_check().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            error!("LLM gateway unhealthy: {}", e);
            e.to_string()
        }
    };
    let embedding_status = match embedder.health_check().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            error!("Embedding gateway unhealthy: {}", e);
            e.to_string()
        }
    };
    let healthy = llm_status == "ok" && embedding_status == "ok";
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "llm": { "provider": llm.name(), "status": llm_status },
            "embedding": { "model": embedder.model(), "status": embedding_status },
        }))?
    );
    if !healthy {
        anyhow::bail!("One or more gateways are unhealthy");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;
    info!("  db_dir: {:?}", app_config.db_dir);

    match cli_args.command {
        Command::Generate {
            model_id,
            hooks,
            theme,
            duration,
            no_persist,
        } => {
            let request =
                PipelineRequest::new(model_id, hooks.unwrap_or(app_config.pipeline.hook_count))
                    .with_duration(duration.unwrap_or(app_config.pipeline.duration))
                    .with_theme(theme)
                    .with_persist(!no_persist);

            let shutdown_token = CancellationToken::new();
            let run = run_generate(&app_config, request, shutdown_token.clone());
            tokio::pin!(run);
            tokio::select! {
                result = &mut run => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, cancelling pipeline");
                    shutdown_token.cancel();
                    run.await
                }
            }
        }
        Command::IngestCorpus { file, delimiter } => run_ingest(&app_config, file, delimiter),
        Command::BackfillEmbeddings { limit } => run_backfill(&app_config, limit).await,
        Command::UpsertModel { file } => run_upsert_model(&app_config, file),
        Command::Health => run_health(&app_config).await,
    }
}
