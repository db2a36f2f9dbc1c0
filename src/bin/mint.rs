use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bitbar::config::WorkerConfig;
use bitbar::minter::client::MonitorClient;
use bitbar::minter::executor::MintExecutor;
use bitbar::minter::http::{self as worker_http, WorkerHttpState};
use bitbar::minter::journal::Journal;
use bitbar::minter::scheduler::MintScheduler;
use bitbar::minter::MinterState;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Polls the bitbar monitor for eligible deposits and inscribes a reward
/// back to each sender.
#[derive(Parser, Debug)]
#[command(name = "bitbar-mint", version, about)]
struct Args {
    /// Wallet the inscription tool spends from.
    wallet_name: String,
    /// File inscribed onto every reward.
    file_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    if !args.file_path.exists() {
        bail!(
            "Inscription file {} does not exist",
            args.file_path.display()
        );
    }

    let config = WorkerConfig::from_env().context("Failed to load worker configuration")?;

    let journal = Arc::new(Journal::open(&config.data_dir)?);
    // The journal is not authoritative; an unreadable one degrades the mint
    // counter but never stops the worker.
    let recovered = match journal.load() {
        Ok(records) => records.len() as u64,
        Err(err) => {
            warn!("Journal unreadable, starting with empty history: {err:#}");
            0
        }
    };
    let state = Arc::new(MinterState::new(recovered));
    if let Err(err) = journal.log_line("Minting service started") {
        warn!("Service log write failed: {err:#}");
    }
    info!(
        monitor = %config.server_url,
        wallet = %args.wallet_name,
        recovered_mints = recovered,
        "Starting bitbar minter"
    );

    let client = MonitorClient::new(&config.server_url)?;
    let executor = Arc::new(MintExecutor::new(
        client.clone(),
        Arc::clone(&journal),
        Arc::clone(&state),
        config.command_template.clone(),
        args.wallet_name,
        args.file_path,
        config.max_retries,
        config.retry_backoff,
    ));
    let scheduler = MintScheduler::new(
        client,
        executor,
        Arc::clone(&state),
        config.interval,
        config.inter_dispatch,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let http_state = WorkerHttpState {
        state,
        journal,
        max_retries: config.max_retries,
    };
    let listener = TcpListener::bind(SocketAddr::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        config.status_port,
    ))
    .await
    .context("Failed to bind introspection listener")?;
    info!(
        "Minter introspection listening on {}",
        listener
            .local_addr()
            .context("Failed to obtain listener address")?
    );

    let server = axum::serve(listener, worker_http::router(http_state).into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("Introspection server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Err(join_err) = scheduler_handle.await {
        error!("Scheduler task join error: {join_err}");
    }
    // A subprocess in flight at this point is orphaned; the pending list
    // surfaces its txid again on the next run.
    info!("bitbar minter exiting");

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

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Interrupt received, shutting down");
}
