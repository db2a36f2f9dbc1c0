//! Local append-only record of successful mints.
//!
//! The journal is a forensics aid and feeds the `/mints` introspection
//! endpoint; the monitor's ledger stays authoritative. Each mint is one JSON
//! record per line so a crash mid-write can damage at most the trailing
//! record, which recovery tolerates and skips.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

const MINTS_FILE: &str = "mints.json";
const SERVICE_LOG_FILE: &str = "minting-service.log";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintRecord {
    pub txid: String,
    pub inscription_id: String,
    pub destination: String,
    pub timestamp: DateTime<Utc>,
}

pub struct Journal {
    mints_path: PathBuf,
    log_path: PathBuf,
}

impl Journal {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        Ok(Self {
            mints_path: data_dir.join(MINTS_FILE),
            log_path: data_dir.join(SERVICE_LOG_FILE),
        })
    }

    /// Every recoverable record in the journal. A missing file is an empty
    /// journal; a torn trailing record is skipped, never fatal.
    pub fn load(&self) -> Result<Vec<MintRecord>> {
        let raw = match std::fs::read_to_string(&self.mints_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read {}", self.mints_path.display()))
            }
        };

        let mut records = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MintRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) => warn!("Skipping unreadable journal record: {err}"),
            }
        }
        Ok(records)
    }

    pub fn append(&self, record: &MintRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to encode mint record")?;
        line.push('\n');
        self.append_raw(&self.mints_path, &line)
    }

    /// One `ISO8601 - message` line in the service log.
    pub fn log_line(&self, message: &str) -> Result<()> {
        assert!(!message.contains('\n'), "Log messages are single lines");
        let stamped = format!(
            "{} - {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message
        );
        self.append_raw(&self.log_path, &stamped)
    }

    fn append_raw(&self, path: &Path, payload: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(payload.as_bytes())
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        file.flush()
            .with_context(|| format!("Failed to flush {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(txid: &str) -> MintRecord {
        MintRecord {
            txid: txid.to_string(),
            inscription_id: format!("{txid}i0"),
            destination: "bc1qsender".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn appended_records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();

        journal.append(&record("aa")).unwrap();
        journal.append(&record("bb")).unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].txid, "aa");
        assert_eq!(loaded[1].inscription_id, "bbi0");
    }

    #[test]
    fn missing_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        assert!(journal.load().unwrap().is_empty());
    }

    #[test]
    fn torn_trailing_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        journal.append(&record("aa")).unwrap();

        // Simulate a crash mid-append.
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(MINTS_FILE))
            .unwrap();
        file.write_all(b"{\"txid\":\"bb\",\"inscript").unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].txid, "aa");
    }

    #[test]
    fn service_log_lines_carry_a_timestamp_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        journal.log_line("Minting service started").unwrap();

        let raw = std::fs::read_to_string(dir.path().join(SERVICE_LOG_FILE)).unwrap();
        let line = raw.lines().next().unwrap();
        let (stamp, message) = line.split_once(" - ").unwrap();
        assert!(stamp.parse::<DateTime<Utc>>().is_ok(), "bad stamp: {stamp}");
        assert_eq!(message, "Minting service started");
    }
}
