use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::types::AppState;

/// GET /health
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    let uptime = Utc::now().signed_duration_since(s.started_at);
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "uptime_secs": uptime.num_seconds(),
        })),
    )
        .into_response()
}
