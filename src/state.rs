//! Shared application state handed to every handler.

use crate::services::{
    build_runner::BuildRunner, build_tracker::BuildTracker, publisher::LocalPublisher,
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub runner: BuildRunner,
    pub publisher: Arc<LocalPublisher>,
    /// Bearer token guarding the build API; `None` leaves it open.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn tracker(&self) -> &BuildTracker {
        self.runner.tracker()
    }
}
