//! Ledger row binding a chain transaction to its minting outcome.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// 64-hex-character chain transaction id. Immutable once inserted.
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(StringLen::N(64))")]
    pub txid: String,
    /// Wall-clock time of first ingestion, epoch milliseconds.
    pub first_seen_ms: i64,
    /// Sum of outputs paying the watched address.
    pub amount_sats: i64,
    /// Present iff the upstream reports the transaction as confirmed.
    pub block_height: Option<i64>,
    /// Recipient of the reward inscription; first input's previous-output address.
    pub sender_address: Option<String>,
    /// One of `not_required`, `pending`, `completed`.
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub status: String,
    /// Present iff status = completed.
    pub inscription_id: Option<String>,
    /// Present iff status = completed, epoch milliseconds.
    pub completed_at_ms: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
