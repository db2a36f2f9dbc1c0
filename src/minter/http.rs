//! Worker introspection endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::http::HttpError;
use crate::minter::journal::{Journal, MintRecord};
use crate::minter::MinterState;
use crate::models::WorkerStatusResponse;

#[derive(Clone)]
pub struct WorkerHttpState {
    pub state: Arc<MinterState>,
    pub journal: Arc<Journal>,
    pub max_retries: u32,
}

pub fn router(state: WorkerHttpState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/mints", get(mints))
        .with_state(state)
}

async fn status(
    State(http_state): State<WorkerHttpState>,
) -> Result<Json<WorkerStatusResponse>, HttpError> {
    let state = &http_state.state;
    Ok(Json(WorkerStatusResponse {
        uptime: state.uptime_secs(),
        active_operations: state.active_operations(),
        pending_retries: state.pending_retries(http_state.max_retries),
        total_mints: state.total_mints(),
    }))
}

async fn mints(
    State(http_state): State<WorkerHttpState>,
) -> Result<Json<Vec<MintRecord>>, HttpError> {
    let records = http_state.journal.load().map_err(HttpError::internal)?;
    Ok(Json(records))
}
