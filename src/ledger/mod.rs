//! Durable minting ledger.
//!
//! The ledger is the single authority on the txid → transaction mapping.
//! Records move along `not_required` (terminal) or `pending → completed`
//! (terminal); downgrades are impossible because `confirm` is the only
//! mutation and it refuses anything that is not currently pending.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, SqlErr,
};
use thiserror::Error;

use crate::entities::mint_transaction;
use crate::entities::prelude::MintTransaction;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("amount {amount} exceeds storage bounds")]
    AmountOverflow { amount: u64 },
    #[error("block height {height} exceeds storage bounds")]
    HeightOverflow { height: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintStatus {
    NotRequired,
    Pending,
    Completed,
}

impl MintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MintStatus::NotRequired => "not_required",
            MintStatus::Pending => "pending",
            MintStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "not_required" => Some(MintStatus::NotRequired),
            "pending" => Some(MintStatus::Pending),
            "completed" => Some(MintStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed(mint_transaction::Model),
    NotFound,
    AlreadyCompleted,
}

/// Input to [`Ledger::insert`]; classification has already happened in the
/// ingestor, the ledger only enforces representability and invariants.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub txid: String,
    pub amount_sats: u64,
    pub block_height: Option<u64>,
    pub sender_address: Option<String>,
    pub status: MintStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerCounts {
    pub total: u64,
    pub pending: u64,
}

pub fn epoch_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    assert!(now > 0, "Clock predates Unix epoch");
    now
}

#[derive(Clone)]
pub struct Ledger {
    database: DatabaseConnection,
}

impl Ledger {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Inserts a freshly ingested transaction. A second insert of the same
    /// txid is reported as [`InsertOutcome::Exists`] and changes nothing.
    pub async fn insert(&self, record: NewTransaction) -> Result<InsertOutcome, LedgerError> {
        assert!(!record.txid.is_empty(), "Txid cannot be empty");
        assert!(
            record.status != MintStatus::Pending || record.sender_address.is_some(),
            "Pending records require a sender address"
        );
        assert!(
            record.status != MintStatus::Completed,
            "Records are never inserted as completed"
        );

        let amount = i64::try_from(record.amount_sats).map_err(|_| LedgerError::AmountOverflow {
            amount: record.amount_sats,
        })?;
        let block_height = match record.block_height {
            Some(height) => Some(
                i64::try_from(height).map_err(|_| LedgerError::HeightOverflow { height })?,
            ),
            None => None,
        };

        if MintTransaction::find_by_id(record.txid.as_str())
            .one(&self.database)
            .await?
            .is_some()
        {
            return Ok(InsertOutcome::Exists);
        }

        let model = mint_transaction::ActiveModel {
            txid: Set(record.txid),
            first_seen_ms: Set(epoch_millis()),
            amount_sats: Set(amount),
            block_height: Set(block_height),
            sender_address: Set(record.sender_address),
            status: Set(record.status.as_str().to_string()),
            inscription_id: Set(None),
            completed_at_ms: Set(None),
        };

        match model.insert(&self.database).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            // Lost the race against a concurrent ingestion of the same txid.
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(InsertOutcome::Exists)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(&self, txid: &str) -> Result<Option<mint_transaction::Model>, LedgerError> {
        Ok(MintTransaction::find_by_id(txid).one(&self.database).await?)
    }

    /// Pending records, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<mint_transaction::Model>, LedgerError> {
        Ok(MintTransaction::find()
            .filter(mint_transaction::Column::Status.eq(MintStatus::Pending.as_str()))
            .order_by_asc(mint_transaction::Column::FirstSeenMs)
            .all(&self.database)
            .await?)
    }

    /// Completed records, newest first.
    pub async fn list_completed(&self) -> Result<Vec<mint_transaction::Model>, LedgerError> {
        Ok(MintTransaction::find()
            .filter(mint_transaction::Column::Status.eq(MintStatus::Completed.as_str()))
            .order_by_desc(mint_transaction::Column::CompletedAtMs)
            .all(&self.database)
            .await?)
    }

    /// Transitions `pending → completed`, recording the inscription identity.
    /// The write carries its own `status = pending` predicate, so of any
    /// number of concurrent confirms for one txid exactly one update matches
    /// the row; the rest observe zero affected rows and report
    /// `AlreadyCompleted`. The earlier read is advisory only and is never
    /// trusted at write time.
    ///
    /// A confirm against a `not_required` record reports `AlreadyCompleted`
    /// rather than resurrecting it.
    pub async fn confirm(
        &self,
        txid: &str,
        inscription_id: &str,
    ) -> Result<ConfirmOutcome, LedgerError> {
        assert!(!inscription_id.is_empty(), "Inscription id cannot be empty");

        let Some(existing) = MintTransaction::find_by_id(txid).one(&self.database).await? else {
            return Ok(ConfirmOutcome::NotFound);
        };
        if MintStatus::parse(&existing.status) != Some(MintStatus::Pending) {
            return Ok(ConfirmOutcome::AlreadyCompleted);
        }

        let completed_at = epoch_millis();
        let result = MintTransaction::update_many()
            .col_expr(
                mint_transaction::Column::Status,
                Expr::value(MintStatus::Completed.as_str()),
            )
            .col_expr(
                mint_transaction::Column::InscriptionId,
                Expr::value(inscription_id),
            )
            .col_expr(
                mint_transaction::Column::CompletedAtMs,
                Expr::value(completed_at),
            )
            .filter(mint_transaction::Column::Txid.eq(txid))
            .filter(mint_transaction::Column::Status.eq(MintStatus::Pending.as_str()))
            .exec(&self.database)
            .await?;

        if result.rows_affected == 0 {
            // Lost the race to a concurrent confirm.
            return Ok(ConfirmOutcome::AlreadyCompleted);
        }
        assert!(
            result.rows_affected == 1,
            "Txid is the primary key, a guarded update cannot match more than one row"
        );

        Ok(ConfirmOutcome::Confirmed(mint_transaction::Model {
            status: MintStatus::Completed.as_str().to_string(),
            inscription_id: Some(inscription_id.to_string()),
            completed_at_ms: Some(completed_at),
            ..existing
        }))
    }

    pub async fn counts(&self) -> Result<LedgerCounts, LedgerError> {
        let total = MintTransaction::find().count(&self.database).await?;
        let pending = MintTransaction::find()
            .filter(mint_transaction::Column::Status.eq(MintStatus::Pending.as_str()))
            .count(&self.database)
            .await?;
        assert!(pending <= total, "Pending count exceeds total");
        Ok(LedgerCounts { total, pending })
    }

    /// Deletes settled rows older than the horizon. Pending rows are immortal
    /// regardless of age.
    pub async fn sweep_settled(&self, horizon_days: u32) -> Result<u64, LedgerError> {
        assert!(horizon_days > 0, "Retention horizon must be positive");
        let cutoff = epoch_millis() - i64::from(horizon_days) * 86_400_000;
        let result = MintTransaction::delete_many()
            .filter(mint_transaction::Column::Status.ne(MintStatus::Pending.as_str()))
            .filter(mint_transaction::Column::FirstSeenMs.lt(cutoff))
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            MintStatus::NotRequired,
            MintStatus::Pending,
            MintStatus::Completed,
        ] {
            assert_eq!(MintStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MintStatus::parse("minted"), None);
    }
}
