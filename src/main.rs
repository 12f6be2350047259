use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drop_stats::api::state::AppState;
use drop_stats::api::build_router;
use drop_stats::cache::{CacheContext, MemorySharedStore};
use drop_stats::config::AppConfig;
use drop_stats::engine::drop_info::DropInfoService;
use drop_stats::engine::drop_matrix::DropMatrixService;
use drop_stats::engine::pattern_matrix::PatternMatrixService;
use drop_stats::engine::refresh::RefreshService;
use drop_stats::engine::time_range::TimeRangeService;
use drop_stats::engine::trend::TrendService;
use drop_stats::models::Server;
use drop_stats::repo::memory::{
    JsonlMatrixElementRepo, MemoryAccountRepo, MemoryDropInfoRepo, MemoryItemRepo,
    MemoryReportStore, MemoryStageRepo, MemoryTimeRangeRepo,
};
use drop_stats::repo::{DropMatrixElementRepo, DropReportQuery};
use drop_stats::shim::Shim;
use drop_stats::storage::StorageConfig;

#[derive(Parser)]
#[command(name = "drop-stats")]
#[command(about = "Community drop statistics backend")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Start {
        /// Bind address (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port number (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Refresh persisted matrix elements for every server before serving
        #[arg(long)]
        refresh_on_start: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting drop-stats v{}", env!("CARGO_PKG_VERSION"));

    let config_path = PathBuf::from(&cli.config);
    let mut config = if config_path.exists() {
        AppConfig::from_file(&config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?
    } else {
        tracing::warn!(
            "Config file {} not found, using defaults",
            config_path.display()
        );
        AppConfig::default()
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = PathBuf::from(data_dir);
    }

    match cli.command {
        Commands::Start {
            host,
            port,
            refresh_on_start,
        } => {
            let host = host.unwrap_or(config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(config, host, port, refresh_on_start).await
        }
    }
}

async fn serve(config: AppConfig, host: String, port: u16, refresh_on_start: bool) -> Result<()> {
    let storage = StorageConfig::new(config.data_dir.clone());

    let stage_repo =
        Arc::new(MemoryStageRepo::from_storage(&storage).context("loading stages")?);
    let item_repo = Arc::new(MemoryItemRepo::from_storage(&storage).context("loading items")?);
    let time_range_repo =
        Arc::new(MemoryTimeRangeRepo::from_storage(&storage).context("loading time ranges")?);
    let drop_info_repo =
        Arc::new(MemoryDropInfoRepo::from_storage(&storage).context("loading drop infos")?);
    let report_query: Arc<dyn DropReportQuery> =
        Arc::new(MemoryReportStore::from_storage(&storage).context("loading reports")?);
    let elements: Arc<dyn DropMatrixElementRepo> =
        Arc::new(JsonlMatrixElementRepo::new(storage.clone()));

    let caches = CacheContext::with_shared(Arc::new(MemorySharedStore::new()));
    let time_range = Arc::new(TimeRangeService::new(time_range_repo));
    let drop_info = Arc::new(DropInfoService::new(drop_info_repo, &caches));
    let shim = Arc::new(Shim::new(stage_repo.clone(), item_repo.clone()));

    let drop_matrix = Arc::new(DropMatrixService::new(
        time_range.clone(),
        drop_info.clone(),
        report_query.clone(),
        elements.clone(),
        shim.clone(),
        &caches,
    ));
    let trend = Arc::new(TrendService::new(
        time_range.clone(),
        drop_info.clone(),
        report_query.clone(),
        shim.clone(),
        &caches,
    ));
    let pattern_matrix = Arc::new(PatternMatrixService::new(
        time_range.clone(),
        drop_info,
        report_query,
        shim,
        &caches,
        config.pattern_quantity_threshold,
    ));

    if refresh_on_start {
        let refresh = RefreshService::new(
            time_range,
            drop_matrix.clone(),
            elements,
            config.refresh.concurrency,
        );
        for server in Server::ALL {
            let outcome = refresh
                .refresh_server(server)
                .await
                .with_context(|| format!("refreshing matrix elements for {}", server))?;
            tracing::info!(%server, saved = outcome.saved, "matrix refresh done");
        }
    }

    let state = AppState {
        stage_repo,
        item_repo,
        account_repo: Arc::new(MemoryAccountRepo::new(HashMap::new())),
        drop_matrix,
        trend,
        pattern_matrix,
    };

    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
