use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::minter::client::MonitorClient;
use crate::minter::executor::MintExecutor;
use crate::minter::MinterState;

/// Periodic dispatch loop. Each tick fetches the pending queue and hands
/// every listed txid that is not already in flight to a spawned executor
/// task, spaced out so the wallet tool is not hammered.
pub struct MintScheduler {
    client: MonitorClient,
    executor: Arc<MintExecutor>,
    state: Arc<MinterState>,
    interval: Duration,
    inter_dispatch: Duration,
}

impl MintScheduler {
    pub fn new(
        client: MonitorClient,
        executor: Arc<MintExecutor>,
        state: Arc<MinterState>,
        interval: Duration,
        inter_dispatch: Duration,
    ) -> Self {
        assert!(
            interval >= Duration::from_secs(1),
            "Scheduler interval below 1s is unsafe"
        );
        assert!(
            inter_dispatch >= Duration::from_secs(1),
            "Dispatch spacing below 1s hammers the wallet tool"
        );
        Self {
            client,
            executor,
            state,
            interval,
            inter_dispatch,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(monitor = %self.client.base(), "Starting mint scheduler loop");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Scheduler shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting scheduler loop");
                            break;
                        }
                    }
                }
                _ = sleep(self.interval) => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let pending = match self.client.pending_mints().await {
            Ok(pending) => pending,
            Err(err) if err.is_connection_refused() => {
                error!(
                    "Monitor at {} refused the connection. Is bitbar-monitor running?",
                    self.client.base()
                );
                return;
            }
            Err(err) => {
                warn!("Pending-mints fetch failed, retrying next tick: {err}");
                return;
            }
        };

        if pending.is_empty() {
            debug!("No pending mints");
            return;
        }
        info!(count = pending.len(), "Fetched pending mints");

        let mut dispatched_any = false;
        for job in pending {
            // The confirmation for an in-flight txid may not have
            // round-tripped yet; never double-dispatch it.
            if self.state.is_in_flight(&job.txid) {
                debug!(txid = %job.txid, "Skipping txid already in flight");
                continue;
            }

            if dispatched_any {
                sleep(self.inter_dispatch).await;
            }
            dispatched_any = true;

            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                executor.process(job).await;
            });
        }
    }
}
