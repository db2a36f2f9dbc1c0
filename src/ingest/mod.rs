//! Normalizes one upstream transaction into a ledger record.
//!
//! Ingestion is idempotent: the txid is the anchor, and replaying the same
//! upstream listing any number of times leaves the ledger unchanged.

use anyhow::Result;
use tracing::{debug, warn};

use crate::explorer::{ExplorerClient, TxSummary};
use crate::ledger::{InsertOutcome, Ledger, MintStatus, NewTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The ledger already holds this txid.
    AlreadyKnown,
    /// Txid is not 64 hex characters; the record was skipped.
    Malformed,
    /// The transaction does not pay the watched address (inputs only).
    NotAPayment,
    Recorded(MintStatus),
}

pub struct Ingestor {
    ledger: Ledger,
    explorer: ExplorerClient,
    watched_address: String,
    threshold_sats: u64,
}

impl Ingestor {
    pub fn new(
        ledger: Ledger,
        explorer: ExplorerClient,
        watched_address: String,
        threshold_sats: u64,
    ) -> Self {
        assert!(!watched_address.is_empty(), "Watched address must be set");
        assert!(threshold_sats > 0, "Threshold must be positive");
        Self {
            ledger,
            explorer,
            watched_address,
            threshold_sats,
        }
    }

    pub async fn ingest(&self, tx: &TxSummary) -> Result<IngestOutcome> {
        if !is_valid_txid(&tx.txid) {
            warn!(txid = %tx.txid, "Skipping transaction with malformed txid");
            return Ok(IngestOutcome::Malformed);
        }

        if self.ledger.get(&tx.txid).await?.is_some() {
            return Ok(IngestOutcome::AlreadyKnown);
        }

        let amount_sats = received_amount(tx, &self.watched_address);
        if amount_sats == 0 {
            debug!(txid = %tx.txid, "Transaction does not pay the watched address");
            return Ok(IngestOutcome::NotAPayment);
        }

        let mut sender_address = listed_sender(tx);
        let mut block_height = tx.status.block_height;

        // The listing may omit prevout data; the detail endpoint is the
        // canonical source for the sender and, when available, the height.
        // A failed lookup leaves the sender absent rather than aborting:
        // such a record classifies as not_required.
        if sender_address.is_none() {
            match self.explorer.transaction_detail(&tx.txid).await {
                Ok(detail) => {
                    sender_address = listed_sender(&detail);
                    if detail.status.block_height.is_some() {
                        block_height = detail.status.block_height;
                    }
                }
                Err(err) => {
                    warn!(
                        txid = %tx.txid,
                        "Sender lookup failed, recording without sender: {err}"
                    );
                }
            }
        }

        let status = classify(amount_sats, self.threshold_sats, sender_address.as_deref());
        let record = NewTransaction {
            txid: tx.txid.clone(),
            amount_sats,
            block_height,
            sender_address,
            status,
        };

        match self.ledger.insert(record).await? {
            InsertOutcome::Inserted => Ok(IngestOutcome::Recorded(status)),
            InsertOutcome::Exists => Ok(IngestOutcome::AlreadyKnown),
        }
    }
}

/// Sum of all outputs paying `address`. A transaction with several outputs
/// to the watched address counts them all.
pub fn received_amount(tx: &TxSummary, address: &str) -> u64 {
    tx.vout
        .iter()
        .filter(|out| out.scriptpubkey_address.as_deref() == Some(address))
        .fold(0u64, |sum, out| sum.saturating_add(out.value))
}

/// First input carrying a previous-output address, if any.
pub fn listed_sender(tx: &TxSummary) -> Option<String> {
    tx.vin
        .iter()
        .find_map(|input| input.prevout.as_ref()?.scriptpubkey_address.clone())
}

/// A payment is eligible for reward issuance iff it reaches the threshold
/// and the sender is known; without a sender there is no destination to
/// inscribe to.
pub fn classify(amount_sats: u64, threshold_sats: u64, sender: Option<&str>) -> MintStatus {
    if amount_sats >= threshold_sats && sender.is_some() {
        MintStatus::Pending
    } else {
        MintStatus::NotRequired
    }
}

pub fn is_valid_txid(txid: &str) -> bool {
    txid.len() == 64 && hex::decode(txid).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::{ConfirmationStatus, PrevOutput, TxInput, TxOutput};

    const WATCHED: &str = "bc1qwatched";

    fn summary(outputs: Vec<(Option<&str>, u64)>, sender: Option<&str>) -> TxSummary {
        TxSummary {
            txid: "ab".repeat(32),
            vin: sender
                .map(|addr| {
                    vec![TxInput {
                        prevout: Some(PrevOutput {
                            scriptpubkey_address: Some(addr.to_string()),
                        }),
                    }]
                })
                .unwrap_or_default(),
            vout: outputs
                .into_iter()
                .map(|(addr, value)| TxOutput {
                    scriptpubkey_address: addr.map(str::to_string),
                    value,
                })
                .collect(),
            status: ConfirmationStatus::default(),
        }
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        assert_eq!(
            classify(1_641, 1_641, Some("bc1qsender")),
            MintStatus::Pending
        );
        assert_eq!(
            classify(1_640, 1_641, Some("bc1qsender")),
            MintStatus::NotRequired
        );
    }

    #[test]
    fn eligible_amount_without_sender_is_not_required() {
        assert_eq!(classify(2_000, 1_641, None), MintStatus::NotRequired);
    }

    #[test]
    fn amount_sums_every_output_to_the_watched_address() {
        let tx = summary(
            vec![
                (Some(WATCHED), 1_000),
                (Some("bc1qchange"), 50_000),
                (Some(WATCHED), 1_000),
            ],
            Some("bc1qsender"),
        );
        assert_eq!(received_amount(&tx, WATCHED), 2_000);
    }

    #[test]
    fn amount_is_zero_when_only_inputs_reference_us() {
        let tx = summary(vec![(Some("bc1qelsewhere"), 9_000)], Some(WATCHED));
        assert_eq!(received_amount(&tx, WATCHED), 0);
    }

    #[test]
    fn outputs_without_address_are_ignored() {
        let tx = summary(vec![(None, 7_000), (Some(WATCHED), 1_641)], None);
        assert_eq!(received_amount(&tx, WATCHED), 1_641);
    }

    #[test]
    fn sender_comes_from_first_input_with_prevout_address() {
        let mut tx = summary(vec![(Some(WATCHED), 2_000)], Some("bc1qsender"));
        tx.vin.insert(0, TxInput { prevout: None });
        assert_eq!(listed_sender(&tx), Some("bc1qsender".to_string()));
    }

    #[test]
    fn txid_validation_requires_64_hex_characters() {
        assert!(is_valid_txid(&"ab".repeat(32)));
        assert!(!is_valid_txid(&"ab".repeat(31)));
        assert!(!is_valid_txid(&"zz".repeat(32)));
    }
}
