use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use cryptomarkets::api::router::create_router;
use cryptomarkets::config::{AppConfig, LogFormat};
use cryptomarkets::db::{self, MarketStore, MemoryMarketStore, PgMarketStore};
use cryptomarkets::ingestion::Pipeline;
use cryptomarkets::observability::{EventSink, Fanout, FileRunLog, RunLog, TracingSink};
use cryptomarkets::polymarket::GammaClient;
use cryptomarkets::services::{run_scheduler, HealthMonitor};
use cryptomarkets::AppState;

/// Crypto prediction-market ingestion pipeline.
#[derive(Parser, Debug)]
#[command(name = "cryptomarkets")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Keep markets in process memory instead of Postgres
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single ingestion cycle and exit
    RunOnce,

    /// Run ingestion cycles on the configured interval until interrupted
    Schedule,

    /// Print the pipeline health report
    Status {
        /// Print the JSON snapshot instead of the text report
        #[arg(long)]
        json: bool,

        /// Where to write the JSON snapshot (defaults to STATUS_EXPORT_PATH)
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Serve the HTTP API with the scheduler running alongside
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    let store = open_store(&config, cli.memory).await?;
    let run_log: Arc<FileRunLog> = Arc::new(FileRunLog::open(&config.run_log_path)?);
    tracing::debug!(path = %run_log.path().display(), "Run log opened");
    let sink: Arc<dyn EventSink> = Arc::new(
        Fanout::new()
            .with(Arc::new(TracingSink))
            .with(run_log.clone()),
    );

    let source = Arc::new(GammaClient::with_base_url(
        config.gamma_api_url.clone(),
        config.fetch_timeout(),
    ));
    let pipeline = Arc::new(Pipeline::new(
        source,
        store.clone(),
        sink,
        config.pipeline_config(),
    ));
    let run_log: Arc<dyn RunLog> = run_log;
    let monitor =
        HealthMonitor::new(store.clone(), run_log).with_issue_limit(config.recent_issue_limit);

    match cli.command {
        Commands::RunOnce => {
            let report = pipeline.run_guarded().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.succeeded() {
                std::process::exit(1);
            }
        }
        Commands::Schedule => {
            let cancel = CancellationToken::new();
            spawn_ctrl_c(cancel.clone());
            let cycles = run_scheduler(pipeline, config.poll_interval(), cancel).await;
            tracing::info!(cycles, "Scheduler exited");
        }
        Commands::Status { json, export } => {
            let path = export.unwrap_or_else(|| config.status_export_path.clone());
            let report = monitor.export_json(&path).await?;
            if json {
                println!("{}", report.to_json_pretty()?);
            } else {
                println!("{report}");
            }
            tracing::info!(path = %path.display(), "Status snapshot exported");
        }
        Commands::Serve => serve(config, store, pipeline, monitor).await?,
    }

    Ok(())
}

async fn open_store(config: &AppConfig, memory: bool) -> anyhow::Result<Arc<dyn MarketStore>> {
    if memory {
        tracing::warn!("Using in-memory market store; data is lost on exit");
        return Ok(Arc::new(MemoryMarketStore::new()));
    }

    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set (or pass --memory)"))?;

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(url).await?;
    tracing::info!("Database connected");

    Ok(Arc::new(PgMarketStore::new(pool)))
}

async fn serve(
    config: AppConfig,
    store: Arc<dyn MarketStore>,
    pipeline: Arc<Pipeline>,
    monitor: HealthMonitor,
) -> anyhow::Result<()> {
    let metrics_handle = cryptomarkets::metrics::init_metrics()?;
    tracing::info!("Prometheus metrics exporter initialized");

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let scheduler = tokio::spawn(run_scheduler(
        pipeline.clone(),
        config.poll_interval(),
        cancel.clone(),
    ));

    let addr = config.bind_addr();
    let state = AppState {
        store,
        pipeline,
        monitor,
        config,
        metrics_handle: Some(metrics_handle),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");

    let shutdown = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    // The server only returns once the token fired; wait for the in-flight cycle.
    cancel.cancel();
    let cycles = scheduler.await?;
    tracing::info!(cycles, "Shutdown complete");

    Ok(())
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received interrupt, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for interrupt"),
        }
        cancel.cancel();
    });
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}
