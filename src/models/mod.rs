//! JSON payloads exchanged between the monitor API and the minter worker.

use serde::{Deserialize, Serialize};

use crate::entities::mint_transaction;

/// One entry of `GET /api/pending-mints`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMintItem {
    pub txid: String,
    /// Sats received by the watched address.
    pub amount: u64,
    /// First-seen time, epoch milliseconds.
    pub timestamp: i64,
    pub sender_address: Option<String>,
}

/// Body of `POST /api/confirm-mint`. Fields are optional so that a missing
/// `txid` surfaces as a 400 rather than a body-rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmMintRequest {
    pub txid: Option<String>,
    pub inscription_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmMintResponse {
    pub success: bool,
    pub transaction: mint_transaction::Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatusResponse {
    pub total_transactions: u64,
    pub pending_mints: u64,
    /// Seconds since process start.
    pub uptime: u64,
    /// Epoch milliseconds of the last completed poller tick, if any.
    pub last_check: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatusResponse {
    pub uptime: u64,
    pub active_operations: Vec<String>,
    pub pending_retries: Vec<RetryStatus>,
    pub total_mints: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStatus {
    pub txid: String,
    pub attempts: u32,
    pub max_retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_status_uses_camel_case_wire_names() {
        let status = MonitorStatusResponse {
            total_transactions: 7,
            pending_mints: 2,
            uptime: 30,
            last_check: Some(1_700_000_000_000),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["totalTransactions"], 7);
        assert_eq!(value["pendingMints"], 2);
        assert_eq!(value["lastCheck"], 1_700_000_000_000_i64);
    }

    #[test]
    fn retry_status_uses_camel_case_wire_names() {
        let retry = RetryStatus {
            txid: "ab".repeat(32),
            attempts: 3,
            max_retries: 3,
        };
        let value = serde_json::to_value(&retry).unwrap();
        assert_eq!(value["maxRetries"], 3);
    }
}
