use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use bitbar::config::MonitorConfig;
use bitbar::explorer::ExplorerClient;
use bitbar::http;
use bitbar::ingest::Ingestor;
use bitbar::ledger::Ledger;
use bitbar::poller::AddressPoller;
use bitbar::state::AppState;
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = MonitorConfig::load().context("Failed to load configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let explorer = ExplorerClient::new(&config.watch.explorer_url, config.watch.request_timeout())
        .context("Failed to initialize explorer client")?;

    let ledger = Ledger::new(database);
    let last_check = Arc::new(AtomicI64::new(0));
    let app_state = AppState::new(
        ledger.clone(),
        config.watch.address.clone(),
        Arc::clone(&last_check),
    );

    let ingestor = Ingestor::new(
        ledger.clone(),
        explorer.clone(),
        config.watch.address.clone(),
        config.watch.threshold_sats,
    );
    let poller = AddressPoller::new(
        explorer,
        ingestor,
        ledger,
        config.watch.address.clone(),
        config.poller.poll_interval(),
        config.retention.clone(),
        last_check,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("bitbar monitor listening on {local_addr}");

    let router: Router = http::router(app_state);
    let server = axum::serve(listener, router.into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Err(join_err) = poller_handle.await {
        error!("Poller task join error: {join_err}");
    }

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn connect_database(config: &MonitorConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    Database::connect(options)
        .await
        .context("Failed to open ledger database")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt signal: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => error!("Failed to listen for terminate signal: {err}"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
