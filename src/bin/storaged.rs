use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use storaged::{
    api::{self, ApiConfig, ApiState},
    config::{Config, Overrides, read_config_file},
    storage::{MetaStorage, StorageBackend},
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Storage proxy for key-value entries and timeseries")]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<String>,

    /// Address to serve the HTTP API on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Backend descriptor, e.g. bolt:///var/lib/storaged.boltdb
    #[arg(long)]
    backend: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new()
        .with_targets(vec![("storaged", level)])
        .with_target("tower_http", LevelFilter::DEBUG.min(level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };
    let config = config.apply(
        |name| std::env::var(name).ok(),
        Overrides {
            listen: args.listen,
            backend: args.backend.clone(),
            log_level: args.log_level.clone(),
        },
    )?;

    init(config.level_filter()?);
    trace!("started with args: {args:?}");
    info!("using config: {config:?}");

    let storage: Arc<dyn StorageBackend> = Arc::new(MetaStorage::open(&config.backend).await?);

    let served = api::serve(
        ApiConfig {
            bind_addr: config.listen,
        },
        ApiState::new(storage.clone()),
        shutdown_signal(),
    )
    .await;

    if let Err(e) = storage.close().await {
        error!("failed to close backend: {e}");
    }

    served
}
