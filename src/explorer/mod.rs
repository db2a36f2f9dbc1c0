//! Client for the upstream block-explorer REST API.
//!
//! The explorer is an opaque, eventually-consistent JSON source; every call
//! carries the configured timeout and a failed call never mutates local
//! state. Individual malformed entries in a listing are skipped so one bad
//! record cannot abort a whole poller tick.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("explorer request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("explorer returned status {status} for {path}")]
    Status { status: StatusCode, path: String },
}

/// Transaction shape shared by the address listing and the detail endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TxSummary {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
    #[serde(default)]
    pub status: ConfirmationStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmationStatus {
    /// Absent while the transaction is still in the mempool.
    #[serde(default)]
    pub block_height: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOutput {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxInput {
    #[serde(default)]
    pub prevout: Option<PrevOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrevOutput {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
}

#[derive(Clone)]
pub struct ExplorerClient {
    http: Client,
    base: String,
}

impl ExplorerClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        assert!(!base.is_empty(), "Explorer base URL must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| format!("Failed to build explorer client for {base}"))?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// All transactions the explorer associates with `address`, in
    /// upstream-reported order.
    pub async fn address_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<TxSummary>, ExplorerError> {
        assert!(!address.is_empty(), "Address must be provided");
        let raw: Vec<Value> = self
            .get_json(&format!("/address/{address}/txs"))
            .await?;
        Ok(decode_transactions(raw))
    }

    /// Full transaction including input prevouts.
    pub async fn transaction_detail(&self, txid: &str) -> Result<TxSummary, ExplorerError> {
        assert!(!txid.is_empty(), "Txid must be provided");
        self.get_json(&format!("/tx/{txid}")).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, ExplorerError> {
        let url = format!("{}{}", self.base, path);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExplorerError::Status {
                status,
                path: path.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

fn decode_transactions(raw: Vec<Value>) -> Vec<TxSummary> {
    let mut transactions = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<TxSummary>(value) {
            Ok(tx) => transactions.push(tx),
            Err(err) => warn!("Skipping malformed upstream transaction: {err}"),
        }
    }
    transactions
}
