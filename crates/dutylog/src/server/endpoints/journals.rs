//! The `/journals` endpoints. Bodies use the relational naming: a header row,
//! with `periods` and `checklist` on single-journal requests.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::JournalError;
use crate::journal::assemble::relational::{from_document, summary_to_row, to_document};
use crate::journal::assemble::{JournalDocument, JournalRow};
use crate::journal::Journal;
use crate::server::types::ApiErrorType;
use crate::types::AppState;

fn journal_error_to_response(error: JournalError) -> Response {
    let (status, message) = match &error {
        JournalError::NotFound { .. } => (StatusCode::NOT_FOUND, "Journal not found"),
        JournalError::Invalid { .. } => (StatusCode::BAD_REQUEST, "Invalid journal"),
        JournalError::Remote { .. } => (StatusCode::BAD_GATEWAY, "Journal store rejected the request"),
        JournalError::Connectivity { .. } => (StatusCode::BAD_GATEWAY, "Journal store unreachable"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Journal store failed"),
    };

    if status.is_server_error() {
        warn!(error = %error, "Request failed");
    }
    ApiErrorType::from((status, message, Some(error.to_string()))).into_response()
}

/// Reads a request body into an unsaved, validated journal.
fn journal_from_body(doc: &JournalDocument) -> Result<Journal, JournalError> {
    let mut journal = from_document(doc)?;
    journal.id = None;
    journal.created_at = None;
    journal.validate()?;
    Ok(journal)
}

/// GET /journals
pub async fn get_journals(State(s): State<Arc<AppState>>) -> Response {
    match s.store.list().await {
        Ok(journals) => {
            let rows: Vec<JournalRow> = journals.iter().map(summary_to_row).collect();
            (StatusCode::OK, Json(rows)).into_response()
        }
        Err(e) => journal_error_to_response(e),
    }
}

/// GET /journals/:id
pub async fn get_journal(Path(id): Path<String>, State(s): State<Arc<AppState>>) -> Response {
    match s.store.get(&id).await {
        Ok(Some(journal)) => (StatusCode::OK, Json(to_document(&journal))).into_response(),
        Ok(None) => journal_error_to_response(JournalError::NotFound { id }),
        Err(e) => journal_error_to_response(e),
    }
}

/// POST /journals
pub async fn post_journal(
    State(s): State<Arc<AppState>>,
    Json(doc): Json<JournalDocument>,
) -> Response {
    let journal = match journal_from_body(&doc) {
        Ok(journal) => journal,
        Err(e) => return journal_error_to_response(e),
    };

    match s.store.create(&journal).await {
        Ok(id) => {
            info!(journal_id = %id, "Journal created");
            (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
        }
        Err(e) => journal_error_to_response(e),
    }
}

/// PUT /journals/:id
pub async fn put_journal(
    Path(id): Path<String>,
    State(s): State<Arc<AppState>>,
    Json(doc): Json<JournalDocument>,
) -> Response {
    let journal = match journal_from_body(&doc) {
        Ok(journal) => journal,
        Err(e) => return journal_error_to_response(e),
    };

    match s.store.update(&id, &journal).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => journal_error_to_response(e),
    }
}

/// DELETE /journals/:id
pub async fn delete_journal(Path(id): Path<String>, State(s): State<Arc<AppState>>) -> Response {
    match s.store.delete(&id).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => journal_error_to_response(e),
    }
}
