//! Shared state handed to every HTTP handler

use crate::remote::RemoteStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct AppState {
    /// Backend the `/journals` endpoints read and write
    pub store: Arc<dyn RemoteStore>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            started_at: Utc::now(),
        }
    }
}
