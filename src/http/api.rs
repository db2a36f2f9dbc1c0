//! Ledger operations exposed to the minter worker.

use std::sync::atomic::Ordering as AtomicOrdering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::entities::mint_transaction;
use crate::ledger::ConfirmOutcome;
use crate::models::{
    ConfirmMintRequest, ConfirmMintResponse, MonitorStatusResponse, PendingMintItem,
};
use crate::state::AppState;

use super::HttpError;

/// Records awaiting inscription. Only pending records with a known sender
/// are listed; the worker has no destination for anything else.
pub async fn pending_mints(
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingMintItem>>, HttpError> {
    let records = state
        .ledger
        .list_pending()
        .await
        .map_err(HttpError::internal)?;

    let items: Vec<PendingMintItem> = records
        .into_iter()
        .filter(|record| record.sender_address.is_some())
        .map(|record| PendingMintItem {
            txid: record.txid,
            amount: record.amount_sats as u64,
            timestamp: record.first_seen_ms,
            sender_address: record.sender_address,
        })
        .collect();

    Ok(Json(items))
}

pub async fn confirm_mint(
    State(state): State<AppState>,
    Json(request): Json<ConfirmMintRequest>,
) -> Result<Json<ConfirmMintResponse>, HttpError> {
    let Some(txid) = request.txid.filter(|txid| !txid.is_empty()) else {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "txid is required".to_string(),
        ));
    };
    let Some(inscription_id) = request.inscription_id.filter(|id| !id.is_empty()) else {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "inscription_id is required".to_string(),
        ));
    };

    match state
        .ledger
        .confirm(&txid, &inscription_id)
        .await
        .map_err(HttpError::internal)?
    {
        ConfirmOutcome::Confirmed(transaction) => {
            info!(txid = %txid, inscription_id = %inscription_id, "Mint confirmed");
            Ok(Json(ConfirmMintResponse {
                success: true,
                transaction,
            }))
        }
        ConfirmOutcome::AlreadyCompleted => Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("Transaction {txid} is not awaiting mint confirmation"),
        )),
        ConfirmOutcome::NotFound => Err(HttpError::new(
            StatusCode::NOT_FOUND,
            format!("Unknown transaction {txid}"),
        )),
    }
}

pub async fn status(
    State(state): State<AppState>,
) -> Result<Json<MonitorStatusResponse>, HttpError> {
    let counts = state.ledger.counts().await.map_err(HttpError::internal)?;
    let last_check = state.last_check.load(AtomicOrdering::SeqCst);

    Ok(Json(MonitorStatusResponse {
        total_transactions: counts.total,
        pending_mints: counts.pending,
        uptime: state.start_time.elapsed().as_secs(),
        last_check: (last_check > 0).then_some(last_check),
    }))
}

/// Full completed records, newest first.
pub async fn minted(
    State(state): State<AppState>,
) -> Result<Json<Vec<mint_transaction::Model>>, HttpError> {
    let records = state
        .ledger
        .list_completed()
        .await
        .map_err(HttpError::internal)?;
    Ok(Json(records))
}
