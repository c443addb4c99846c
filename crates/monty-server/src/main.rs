use anyhow::Result;
use chrono::Utc;
use monty_storage::{EndpointStore, SqliteResultStore};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use monty_server::app;
use monty_server::config::ServerConfig;
use monty_server::probe::NetworkProber;
use monty_server::scheduler::ProbeScheduler;
use monty_server::seed;
use monty_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    monty_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("monty=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MONTY_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string());
    let config = ServerConfig::load_or_default(&config_path)?;

    tracing::info!(
        host = %config.host,
        http_port = config.http_port,
        data_dir = %config.data_dir,
        "monty-server starting"
    );

    let endpoints = Arc::new(EndpointStore::new(Path::new(&config.data_dir))?);
    let results: Arc<dyn monty_storage::ResultStore> =
        Arc::new(SqliteResultStore::new(Path::new(&config.data_dir))?);

    if config.probe.seed_default_endpoint {
        if let Err(e) = seed::init_default_endpoint(&endpoints, config.http_port) {
            tracing::error!(error = %e, "Failed to seed default endpoint");
        }
    }

    let scheduler = ProbeScheduler::spawn(
        Arc::new(NetworkProber),
        results.clone(),
        config.probe.max_concurrent,
    );
    for endpoint in endpoints.list()? {
        scheduler.register(endpoint);
    }

    let state = AppState {
        endpoints,
        results,
        scheduler,
        start_time: Utc::now(),
    };
    let app = app::build_http_app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(http = %addr, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
