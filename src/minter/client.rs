//! HTTP client for the monitor's ledger API.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::models::{ConfirmMintRequest, PendingMintItem};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MonitorClientError {
    #[error("monitor request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("monitor returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl MonitorClientError {
    /// True when nothing is listening at the monitor address, which gets a
    /// distinct diagnostic from ordinary request failures.
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, MonitorClientError::Transport(err) if err.is_connect())
    }
}

/// Result of a confirm call. The monitor answers 400 for a record that is no
/// longer pending; the worker treats that as idempotent success because the
/// ledger already reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAck {
    Confirmed,
    AlreadyCompleted,
}

#[derive(Clone)]
pub struct MonitorClient {
    http: Client,
    base: String,
}

impl MonitorClient {
    pub fn new(base: &str) -> Result<Self> {
        assert!(!base.is_empty(), "Monitor base URL must be provided");
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .with_context(|| format!("Failed to build monitor client for {base}"))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn pending_mints(&self) -> Result<Vec<PendingMintItem>, MonitorClientError> {
        let response = self
            .http
            .get(format!("{}/api/pending-mints", self.base))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorClientError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn confirm(
        &self,
        txid: &str,
        inscription_id: &str,
    ) -> Result<ConfirmAck, MonitorClientError> {
        assert!(!txid.is_empty(), "Txid must be provided");
        assert!(!inscription_id.is_empty(), "Inscription id must be provided");

        let request = ConfirmMintRequest {
            txid: Some(txid.to_string()),
            inscription_id: Some(inscription_id.to_string()),
        };
        let response = self
            .http
            .post(format!("{}/api/confirm-mint", self.base))
            .json(&request)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(ConfirmAck::Confirmed),
            StatusCode::BAD_REQUEST => Ok(ConfirmAck::AlreadyCompleted),
            status => Err(MonitorClientError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
