//! Invokes the external inscription tool for one pending transaction.
//!
//! The tool is a shared physical resource (one wallet). The in-flight set
//! claimed in [`MinterState`] keeps a txid from ever having two concurrent
//! subprocesses; bounded retries keep a persistently failing txid from
//! hammering the wallet forever.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::minter::client::MonitorClient;
use crate::minter::journal::{Journal, MintRecord};
use crate::minter::MinterState;
use crate::models::PendingMintItem;

/// Case-sensitive stderr substrings that mark a run as failed even when
/// stdout parsed cleanly.
pub const FAILURE_MARKERS: [&str; 3] = ["insufficient funds", "error", "failed"];

const STDERR_SNIPPET_LEN: usize = 400;

#[derive(Debug, Error)]
pub enum MintFailure {
    #[error("failed to launch inscription tool: {0}")]
    Spawn(std::io::Error),
    #[error("inscription tool exited with {code:?}: {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },
    #[error("inscription tool stderr reported {marker:?}")]
    StderrMarker { marker: &'static str },
    #[error("no inscription id found in tool output")]
    UnparsableOutput,
}

pub struct MintExecutor {
    client: MonitorClient,
    journal: Arc<Journal>,
    state: Arc<MinterState>,
    command_template: String,
    wallet: String,
    file: PathBuf,
    max_retries: u32,
    retry_backoff: Duration,
}

impl MintExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: MonitorClient,
        journal: Arc<Journal>,
        state: Arc<MinterState>,
        command_template: String,
        wallet: String,
        file: PathBuf,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        assert!(!wallet.is_empty(), "Wallet name must be provided");
        assert!(max_retries >= 1, "Retry budget must be at least 1");
        Self {
            client,
            journal,
            state,
            command_template,
            wallet,
            file,
            max_retries,
            retry_backoff,
        }
    }

    /// Handles one pending mint end to end. Never panics and never returns
    /// an error: every outcome is accounted for in the attempts map, and the
    /// in-flight claim is released on all paths.
    pub async fn process(&self, job: PendingMintItem) {
        let txid = job.txid.clone();

        let attempts = self.state.attempts_for(&txid);
        if attempts >= self.max_retries {
            debug!(txid = %txid, attempts, "Retries exhausted, skipping");
            return;
        }

        let Some(destination) = job.sender_address.clone() else {
            // The monitor never lists sender-less records as pending, but a
            // worker must survive one showing up anyway.
            warn!(txid = %txid, "Pending mint without sender address, poisoning");
            self.state.poison(&txid, self.max_retries);
            self.service_log(&format!("Refused mint for {txid}: no sender address"));
            return;
        };

        if !self.state.begin(&txid) {
            debug!(txid = %txid, "Mint already in flight");
            return;
        }

        match self.execute(&txid, &destination).await {
            Ok(inscription_id) => {
                self.settle_success(&txid, &destination, &inscription_id)
                    .await;
            }
            Err(failure) => {
                let attempts = self.state.record_failure(&txid);
                warn!(
                    txid = %txid,
                    attempts,
                    max_retries = self.max_retries,
                    "Mint attempt failed: {failure}"
                );
                self.service_log(&format!(
                    "Mint attempt {attempts}/{} failed for {txid}: {failure}",
                    self.max_retries
                ));
                // Hold the in-flight claim through the backoff so a tick
                // landing right after the failure cannot re-dispatch.
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        self.state.finish(&txid);
    }

    async fn execute(&self, txid: &str, destination: &str) -> Result<String, MintFailure> {
        let argv = build_command(
            &self.command_template,
            &self.wallet,
            &self.file.to_string_lossy(),
            destination,
        );
        assert!(!argv.is_empty(), "Command template produced no tokens");

        let program = argv[0].clone();
        info!(txid = %txid, program = %program, "Invoking inscription tool");
        // No timeout here: an inscription can legitimately take minutes.
        let output = Command::new(&program)
            .args(&argv[1..])
            .output()
            .await
            .map_err(MintFailure::Spawn)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(MintFailure::ToolFailed {
                code: output.status.code(),
                stderr: truncate(&stderr, STDERR_SNIPPET_LEN),
            });
        }
        if let Some(marker) = failure_marker(&stderr) {
            return Err(MintFailure::StderrMarker { marker });
        }
        parse_inscription_id(&stdout).ok_or(MintFailure::UnparsableOutput)
    }

    async fn settle_success(&self, txid: &str, destination: &str, inscription_id: &str) {
        let record = MintRecord {
            txid: txid.to_string(),
            inscription_id: inscription_id.to_string(),
            destination: destination.to_string(),
            timestamp: Utc::now(),
        };
        // The journal is a local projection; a failed append never blocks
        // confirmation.
        if let Err(err) = self.journal.append(&record) {
            warn!(txid = %txid, "Journal append failed: {err:#}");
        }
        self.state.record_mint();
        self.service_log(&format!(
            "Minted {inscription_id} for {txid} -> {destination}"
        ));

        match self.client.confirm(txid, inscription_id).await {
            Ok(ack) => {
                self.state.clear_attempts(txid);
                info!(txid = %txid, inscription_id = %inscription_id, ?ack, "Mint confirmed");
            }
            Err(err) => {
                // The inscription is on-chain but the ledger still says
                // pending. Attempts stay untouched so the next tick retries
                // the confirmation path; MAX_RETRIES bounds the damage if
                // that leads to a duplicate inscription.
                warn!(
                    txid = %txid,
                    "Confirm failed after successful inscription, ledger not yet updated: {err}"
                );
                self.service_log(&format!(
                    "Confirm failed for {txid} ({inscription_id}); will retry"
                ));
            }
        }
    }

    fn service_log(&self, message: &str) {
        if let Err(err) = self.journal.log_line(message) {
            warn!("Service log write failed: {err:#}");
        }
    }
}

/// Substitutes `{wallet}`, `{file}` and `{destination}` into the template.
/// Tokens are split before substitution so values containing spaces stay
/// single arguments.
pub fn build_command(template: &str, wallet: &str, file: &str, destination: &str) -> Vec<String> {
    template
        .split_whitespace()
        .map(|token| {
            token
                .replace("{wallet}", wallet)
                .replace("{file}", file)
                .replace("{destination}", destination)
        })
        .collect()
}

/// Extracts the inscription id from tool stdout. Two formats are tolerated:
/// a JSON object carrying `inscriptions[0].id`, and a plain
/// `inscription_id: <value>` line.
pub fn parse_inscription_id(stdout: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) {
        if let Some(id) = value
            .get("inscriptions")
            .and_then(|list| list.get(0))
            .and_then(|entry| entry.get("id"))
            .and_then(Value::as_str)
        {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }

    stdout.lines().find_map(|line| {
        line.trim()
            .strip_prefix("inscription_id:")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

pub fn failure_marker(stderr: &str) -> Option<&'static str> {
    FAILURE_MARKERS
        .iter()
        .copied()
        .find(|marker| stderr.contains(marker))
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.trim_end().to_string();
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_substitution_preserves_spaced_values() {
        let argv = build_command(
            "ord wallet --name {wallet} inscribe --file {file} --destination {destination}",
            "main",
            "/data/bit bar.png",
            "bc1qsender",
        );
        assert_eq!(argv[0], "ord");
        assert!(argv.contains(&"main".to_string()));
        assert!(argv.contains(&"/data/bit bar.png".to_string()));
        assert_eq!(argv.last().unwrap(), "bc1qsender");
    }

    #[test]
    fn parses_json_inscription_output() {
        let stdout = r#"{"commit":"c1","inscriptions":[{"id":"abc123i0","location":"x"}]}"#;
        assert_eq!(parse_inscription_id(stdout), Some("abc123i0".to_string()));
    }

    #[test]
    fn parses_line_format_inscription_output() {
        let stdout = "committing...\ninscription_id: def456i0\ndone\n";
        assert_eq!(parse_inscription_id(stdout), Some("def456i0".to_string()));
    }

    #[test]
    fn rejects_output_without_an_id() {
        assert_eq!(parse_inscription_id("all good"), None);
        assert_eq!(parse_inscription_id(r#"{"inscriptions":[]}"#), None);
        assert_eq!(parse_inscription_id("inscription_id:\n"), None);
    }

    #[test]
    fn stderr_markers_are_case_sensitive() {
        assert_eq!(
            failure_marker("error: insufficient funds in wallet"),
            Some("insufficient funds")
        );
        assert_eq!(failure_marker("broadcast failed"), Some("failed"));
        assert_eq!(failure_marker("ERROR: shouting"), None);
        assert_eq!(failure_marker("syncing index"), None);
    }
}
