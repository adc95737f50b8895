//! A tracked build: one run of the render-and-publish pipeline for a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Lifecycle state of a build.
///
/// The only legal edges are `Queued → InProgress`, `InProgress → Complete`
/// and `InProgress → Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Queued,
    InProgress,
    Complete,
    Error,
}

impl BuildStatus {
    pub const ALL: [BuildStatus; 4] = [
        BuildStatus::Queued,
        BuildStatus::InProgress,
        BuildStatus::Complete,
        BuildStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::InProgress => "in_progress",
            BuildStatus::Complete => "complete",
            BuildStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Complete | BuildStatus::Error)
    }

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        matches!(
            (self, next),
            (BuildStatus::Queued, BuildStatus::InProgress)
                | (BuildStatus::InProgress, BuildStatus::Complete)
                | (BuildStatus::InProgress, BuildStatus::Error)
        )
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown build status `{}`", s))
    }
}

/// A build record as persisted in the `builds` table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Build {
    /// Generated at creation, never reused.
    pub id: Uuid,

    /// Owner of the site being built.
    pub user_id: String,

    /// Publish to the preview destination only.
    pub preview_only: bool,

    pub status: BuildStatus,

    /// Set only once the build is `complete`.
    pub preview_url: Option<String>,

    /// Set only once the build is `error`.
    pub error_message: Option<String>,

    /// Published version, set only once the build is `complete`.
    pub version_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    /// Refreshed on every status transition.
    pub updated_at: DateTime<Utc>,
}

/// Row shape of `builds`; status is stored as text.
#[derive(sqlx::FromRow)]
pub(crate) struct BuildRow {
    pub id: Uuid,
    pub user_id: String,
    pub preview_only: bool,
    pub status: String,
    pub preview_url: Option<String>,
    pub error_message: Option<String>,
    pub version_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BuildRow> for Build {
    type Error = String;

    fn try_from(row: BuildRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            preview_only: row.preview_only,
            status: row.status.parse()?,
            preview_url: row.preview_url,
            error_message: row.error_message,
            version_id: row.version_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
