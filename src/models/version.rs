//! A published snapshot of a user's site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Where an artifact is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Preview,
    Live,
}

impl Destination {
    pub fn as_str(self) -> &'static str {
        match self {
            Destination::Preview => "preview",
            Destination::Live => "live",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `website_versions`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct WebsiteVersion {
    pub id: Uuid,

    pub user_id: String,

    /// `preview` or `live`.
    pub destination: String,

    /// Directory (relative to the storage root) holding the files.
    pub storage_prefix: String,

    /// Public URL of the version's `index.html`.
    pub index_url: String,

    /// MD5 over every file path and body of the artifact.
    pub checksum: String,

    pub file_count: i64,

    /// At most one live version per user is active.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}
