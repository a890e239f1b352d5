//! Operational HTTP endpoints.
//!
//! A small read-only surface for monitoring: liveness, ledger counts and
//! the most recent outcomes. The reconciliation itself runs on the
//! scheduler task, not behind these routes.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use ordersync_engine::LedgerStore;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerStore,
    pub poll_interval_secs: u64,
    pub issue_tag_name: String,
}

/// Build the operational router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/recent", get(recent))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    match state.ledger.watermark().await {
        Ok(watermark) => Json(json!({
            "status": "ok",
            "time": chrono::Utc::now(),
            "poll_interval_secs": state.poll_interval_secs,
            "issue_tag": state.issue_tag_name,
            "watermark": watermark,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read watermark");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn stats(State(state): State<AppState>) -> Response {
    match state.ledger.stats().await {
        Ok(counts) => {
            let body: serde_json::Map<String, serde_json::Value> = counts
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), json!(count)))
                .collect();
            Json(serde_json::Value::Object(body)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to read ledger stats");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    limit: Option<u32>,
}

async fn recent(State(state): State<AppState>, Query(params): Query<RecentParams>) -> Response {
    let limit = params.limit.unwrap_or(20).min(500);
    match state.ledger.recent(limit).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read recent ledger entries");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
