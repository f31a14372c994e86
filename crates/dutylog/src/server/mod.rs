use std::sync::Arc;

use axum::routing::get;
use axum::{middleware as mw, Router};

use crate::server::endpoints::{journals, status};
use crate::types::AppState;

mod endpoints;
mod middleware;
mod types;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let journal_router = Router::new()
        .route(
            "/journals",
            get(journals::get_journals).post(journals::post_journal),
        )
        .route(
            "/journals/:id",
            get(journals::get_journal)
                .put(journals::put_journal)
                .delete(journals::delete_journal),
        );

    Router::new()
        .route("/health", get(status::get_health))
        .merge(journal_router)
        .layer(mw::from_fn(middleware::log_request))
        .with_state(app_state)
}
