use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use reframe_attributes::AttributeScorer;
use reframe_pipeline::{load_index, ServiceConfig, ServiceContext, ShuffleSource};
use reframe_protocol::{
    ClassifyRequest, ControlRequest, MeasureRequest, ReframeRequest, SimilarCase, DEFAULT_K,
};
use reframe_vector_store::EmbeddingModel;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod flags;
pub mod http_api;
mod models;
mod server_security;

use flags::EmbedMode;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    print_stdout(&serde_json::to_string_pretty(value)?)
}

#[derive(Parser)]
#[command(name = "reframe")]
#[command(about = "Retrieval-augmented cognitive reframing with attribute feedback", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Corpus CSV (overrides REFRAME_CORPUS)
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Embedding cache file (overrides REFRAME_EMBEDDING_CACHE)
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Embedding backend (overrides REFRAME_EMBEDDING_MODE)
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Model directory (overrides REFRAME_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Seed for retrieval and prompt shuffling (overrides REFRAME_SHUFFLE_SEED)
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON API over HTTP
    ServeHttp(ServeArgs),

    /// Load the corpus and build or refresh the embedding cache
    Index,

    /// Retrieve the most similar labeled cases
    Search(SearchArgs),

    /// Score a reframe on specificity, actionability, empathy and positivity
    Measure(MeasureArgs),

    /// Label the thinking trap in a thought
    Classify(ClassifyArgs),

    /// Generate three reframes grounded on similar cases
    Reframe(ReframeArgs),

    /// Rewrite a reframe toward one attribute and re-measure it
    Control(ControlArgs),

    /// Download the configured embedding model into the model directory
    #[command(name = "install-model")]
    InstallModel(InstallModelArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind (default 127.0.0.1:$PORT)
    #[arg(long)]
    bind: Option<String>,

    /// Allow binding to non-loopback addresses
    #[arg(long)]
    public: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    thought: String,

    #[arg(long, default_value = "")]
    situation: String,

    #[arg(short, long, default_value_t = 5)]
    k: usize,
}

#[derive(Args)]
struct MeasureArgs {
    #[arg(long)]
    reframe: String,

    #[arg(long, default_value = "")]
    thought: String,

    #[arg(long, default_value = "")]
    situation: String,
}

#[derive(Args)]
struct ClassifyArgs {
    #[arg(long)]
    thought: String,

    #[arg(long, default_value = "")]
    situation: String,
}

#[derive(Args)]
struct ReframeArgs {
    #[arg(long)]
    thought: String,

    #[arg(long)]
    situation: String,

    #[arg(short, long, default_value_t = DEFAULT_K)]
    k: i64,
}

#[derive(Args)]
struct ControlArgs {
    #[arg(long)]
    reframe: String,

    /// empathy | actionability | specificity
    #[arg(long)]
    attribute: String,

    #[arg(long, default_value = "")]
    thought: String,

    #[arg(long, default_value = "")]
    situation: String,

    /// Rewrite budget (1..=5); one pass when omitted
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[derive(Args)]
struct InstallModelArgs {
    /// Re-download files that already exist
    #[arg(long)]
    force: bool,

    /// Report what would be downloaded without fetching
    #[arg(long)]
    dry_run: bool,
}

#[derive(Serialize)]
struct IndexSummary<'a> {
    rows: usize,
    dimension: usize,
    model: String,
    fingerprint: &'a str,
    cache: &'a reframe_vector_store::CacheOutcome,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ONNX Runtime is noisy at info level.
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = service_config(&cli)?;

    match cli.command {
        Commands::ServeHttp(args) => serve_http(args, config).await?,
        Commands::Index => run_index(&config).await?,
        Commands::Search(args) => run_search(args, &config).await?,
        Commands::Measure(args) => run_measure(args, &config).await?,
        Commands::Classify(args) => run_classify(args, &config).await?,
        Commands::Reframe(args) => run_reframe(args, &config).await?,
        Commands::Control(args) => run_control(args, &config).await?,
        Commands::InstallModel(args) => run_install_model(args, &config).await?,
    }

    Ok(())
}

fn service_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::from_env()?;
    if let Some(corpus) = &cli.corpus {
        config.corpus_path = corpus.clone();
    }
    if let Some(cache) = &cli.cache {
        config.cache_path = Some(cache.clone());
    }
    if let Some(mode) = cli.embed_mode {
        config.embedding.mode = mode.as_domain();
    }
    if let Some(dir) = &cli.model_dir {
        config.embedding.model_dir = dir.clone();
    }
    if let Some(seed) = cli.seed {
        config.shuffle_seed = Some(seed);
    }
    Ok(config)
}

async fn serve_http(args: ServeArgs, config: ServiceConfig) -> Result<()> {
    let bind = args
        .bind
        .unwrap_or_else(|| config.bind_addr().to_string());
    let addrs = server_security::resolve_guarded_bind_addrs(&bind, args.public).await?;
    let addr = server_security::choose_preferred_bind_addr(&addrs)
        .with_context(|| format!("No usable bind address for {bind}"))?;

    let ctx = ServiceContext::initialize(&config)
        .await
        .context("Failed to initialize service")?;
    let app = http_api::router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!("Serving reframe API on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

async fn run_index(config: &ServiceConfig) -> Result<()> {
    let index = load_index(config).await?;
    print_json(&IndexSummary {
        rows: index.len(),
        dimension: index.dimension(),
        model: index.model().space_id(),
        fingerprint: index.fingerprint(),
        cache: index.cache_outcome(),
    })
}

async fn run_search(args: SearchArgs, config: &ServiceConfig) -> Result<()> {
    let index = load_index(config).await?;
    let mut rng = ShuffleSource::new(config.shuffle_seed).request_rng();
    let result = index
        .find_similar(&args.thought, &args.situation, args.k, &mut rng)
        .await?;
    let cases: Vec<SimilarCase> = result
        .hits()
        .iter()
        .map(|hit| SimilarCase {
            index: hit.index,
            similarity: hit.similarity,
            record: hit.entry.clone(),
        })
        .collect();
    print_json(&cases)
}

async fn run_measure(args: MeasureArgs, config: &ServiceConfig) -> Result<()> {
    let request = MeasureRequest {
        reframe: args.reframe,
        thought: args.thought,
        situation: args.situation,
    };
    if request.reframe.trim().is_empty() {
        anyhow::bail!("reframe is required");
    }
    let model = EmbeddingModel::new(&config.embedding).context("Failed to load embedding model")?;
    let scorer = AttributeScorer::new(Arc::new(model));
    let scores = scorer
        .measure_all(&request.reframe, &request.thought, &request.situation)
        .await?;
    print_json(&scores)
}

async fn run_classify(args: ClassifyArgs, config: &ServiceConfig) -> Result<()> {
    let gateway = config.gateway()?;
    let response = reframe_pipeline::classify(
        &gateway,
        ClassifyRequest {
            thought: args.thought,
            situation: args.situation,
        },
    )
    .await?;
    print_json(&response)
}

async fn run_reframe(args: ReframeArgs, config: &ServiceConfig) -> Result<()> {
    let ctx = ServiceContext::initialize(config).await?;
    let response = ctx
        .reframe(ReframeRequest {
            thought: args.thought,
            situation: args.situation,
            k: args.k,
        })
        .await?;
    print_json(&response)
}

async fn run_control(args: ControlArgs, config: &ServiceConfig) -> Result<()> {
    let ctx = ServiceContext::initialize(config).await?;
    let response = ctx
        .control(ControlRequest {
            reframe: args.reframe,
            attribute: args.attribute,
            thought: args.thought,
            situation: args.situation,
            max_attempts: args.max_attempts,
        })
        .await?;
    print_json(&response)
}

async fn run_install_model(args: InstallModelArgs, config: &ServiceConfig) -> Result<()> {
    let report = models::install_model(
        &config.embedding.model_dir,
        &config.embedding.model_id,
        args.force,
        args.dry_run,
    )
    .await?;
    log::info!(
        "Model {} in {}: {} downloaded, {} skipped",
        report.model_id,
        report.model_dir,
        report.downloaded.len(),
        report.skipped.len()
    );
    print_json(&report)
}
