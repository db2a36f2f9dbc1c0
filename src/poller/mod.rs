use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::explorer::ExplorerClient;
use crate::ingest::{IngestOutcome, Ingestor};
use crate::ledger::{epoch_millis, Ledger};

const MAX_LISTING_LEN: usize = 50_000;

/// Periodic ingestion driver. Ticks run strictly one after another; a tick
/// that overruns the interval delays the next one instead of overlapping it.
pub struct AddressPoller {
    explorer: ExplorerClient,
    ingestor: Ingestor,
    ledger: Ledger,
    watched_address: String,
    poll_interval: Duration,
    retention: RetentionConfig,
    last_check: Arc<AtomicI64>,
}

impl AddressPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        explorer: ExplorerClient,
        ingestor: Ingestor,
        ledger: Ledger,
        watched_address: String,
        poll_interval: Duration,
        retention: RetentionConfig,
        last_check: Arc<AtomicI64>,
    ) -> Self {
        assert!(!watched_address.is_empty(), "Watched address must be set");
        assert!(
            poll_interval >= Duration::from_millis(100),
            "Poll interval below 100ms is unsafe"
        );
        Self {
            explorer,
            ingestor,
            ledger,
            watched_address,
            poll_interval,
            retention,
            last_check,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(address = %self.watched_address, "Starting address poller loop");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Poller shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting poller loop");
                            break;
                        }
                    }
                }
                _ = sleep(self.poll_interval) => {
                    // A failed tick mutates nothing; the next tick retries.
                    if let Err(err) = self.tick().await {
                        warn!("Poller tick aborted: {err:#}");
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let transactions = self
            .explorer
            .address_transactions(&self.watched_address)
            .await
            .context("Upstream transaction listing failed")?;
        // Untrusted upstream data: an oversized listing aborts the tick like
        // any other upstream fault, it never takes the poller down.
        if transactions.len() > MAX_LISTING_LEN {
            bail!(
                "Upstream listing returned {} entries, exceeding the {MAX_LISTING_LEN} bound",
                transactions.len()
            );
        }

        for tx in &transactions {
            match self.ingestor.ingest(tx).await {
                Ok(IngestOutcome::Recorded(status)) => info!(
                    txid = %tx.txid,
                    status = status.as_str(),
                    "Recorded incoming transaction"
                ),
                Ok(_) => {}
                // Ledger write failures abort this record only; the poll
                // sees the transaction again next tick.
                Err(err) => warn!(txid = %tx.txid, "Ingestion failed: {err:#}"),
            }
        }

        self.last_check
            .store(epoch_millis(), AtomicOrdering::SeqCst);

        if let Some(days) = self.retention.sweep_days {
            match self.ledger.sweep_settled(days).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Swept settled ledger rows"),
                Err(err) => warn!("Retention sweep failed: {err}"),
            }
        }

        Ok(())
    }
}
