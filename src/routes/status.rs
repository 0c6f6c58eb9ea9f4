//! Pool status endpoint.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::Result;
use crate::pool::PoolStats;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(status))
}

#[derive(Serialize)]
struct StatusResponse {
    version: &'static str,
    /// One entry per active worker pool, keyed by option-set label.
    pools: BTreeMap<String, PoolStats>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        pools: state.ocr().stats().await,
    }))
}
