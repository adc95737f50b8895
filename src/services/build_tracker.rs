//! src/services/build_tracker.rs
//!
//! BuildTracker — owns the lifecycle of build records stored in SQLite.
//!
//! Every status change is a single conditional `UPDATE … WHERE status = ?`,
//! so a transition either applies completely or not at all. Per-user limits
//! are checked and the new row inserted inside one `BEGIN IMMEDIATE`
//! transaction, which serializes concurrent `create` calls on the write lock.

use crate::models::build::{Build, BuildRow, BuildStatus};
use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest stored error message, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 2000;
const MAX_USER_ID_LEN: usize = 128;
const QUOTA_WINDOW_HOURS: i64 = 24;

const BUILD_COLUMNS: &str = "id, user_id, preview_only, status, preview_url, error_message, \
                             version_id, created_at, updated_at";

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid build request: {0}")]
    Validation(String),
    #[error("user `{user_id}` already has {limit} builds in progress")]
    ConcurrencyLimit { user_id: String, limit: u32 },
    #[error("user `{user_id}` reached the limit of {limit} builds per 24 hours")]
    QuotaExceeded { user_id: String, limit: u32 },
    #[error("{0} not found")]
    NotFound(String),
    #[error("build `{build_id}` cannot move from {from} to {to}")]
    InvalidTransition {
        build_id: Uuid,
        from: BuildStatus,
        to: BuildStatus,
    },
    #[error("corrupt build record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Per-user admission limits applied at `create` time.
#[derive(Debug, Clone, Copy)]
pub struct BuildLimits {
    /// Builds in `queued` or `in_progress` at the same time.
    pub max_concurrent: u32,
    /// Builds created within any rolling 24 hour window.
    pub max_per_day: u32,
}

impl Default for BuildLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_per_day: 100,
        }
    }
}

/// One page of a user's builds, newest first.
#[derive(Debug)]
pub struct BuildPage {
    pub builds: Vec<Build>,
    /// Opaque cursor for the next page, if any.
    pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct BuildTracker {
    db: Arc<SqlitePool>,
    limits: BuildLimits,
}

impl BuildTracker {
    pub fn new(db: Arc<SqlitePool>, limits: BuildLimits) -> Self {
        Self { db, limits }
    }

    /// Admit a new build in `queued`.
    ///
    /// Fails without persisting anything when the user id is malformed or
    /// when either per-user limit is already reached. Preview and live
    /// builds count against the same limits.
    pub async fn create(&self, user_id: &str, preview_only: bool) -> TrackerResult<Build> {
        let user_id = validate_user_id(user_id)?;
        let now = Utc::now();
        let build = Build {
            id: Uuid::new_v4(),
            user_id,
            preview_only,
            status: BuildStatus::Queued,
            preview_url: None,
            error_message: None,
            version_id: None,
            created_at: now,
            updated_at: now,
        };

        // dropping the transaction rolls it back, including on cancellation
        let mut tx = self.db.begin_with("BEGIN IMMEDIATE").await?;
        self.insert_within_limits(&mut tx, &build).await?;
        tx.commit().await?;

        info!(
            build_id = %build.id,
            user_id = %build.user_id,
            preview_only,
            "Build queued"
        );
        Ok(build)
    }

    async fn insert_within_limits(
        &self,
        conn: &mut SqliteConnection,
        build: &Build,
    ) -> TrackerResult<()> {
        let in_flight: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM builds WHERE user_id = ? AND status IN (?, ?)",
        )
        .bind(&build.user_id)
        .bind(BuildStatus::Queued.as_str())
        .bind(BuildStatus::InProgress.as_str())
        .fetch_one(&mut *conn)
        .await?;
        if in_flight >= i64::from(self.limits.max_concurrent) {
            warn!(user_id = %build.user_id, in_flight, "Concurrency limit reached");
            return Err(TrackerError::ConcurrencyLimit {
                user_id: build.user_id.clone(),
                limit: self.limits.max_concurrent,
            });
        }

        let window_start = build.created_at - Duration::hours(QUOTA_WINDOW_HOURS);
        let recent: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM builds WHERE user_id = ? AND created_at > ?")
                .bind(&build.user_id)
                .bind(window_start)
                .fetch_one(&mut *conn)
                .await?;
        if recent >= i64::from(self.limits.max_per_day) {
            warn!(user_id = %build.user_id, recent, "Daily build quota reached");
            return Err(TrackerError::QuotaExceeded {
                user_id: build.user_id.clone(),
                limit: self.limits.max_per_day,
            });
        }

        sqlx::query(
            "INSERT INTO builds (id, user_id, preview_only, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(build.id)
        .bind(&build.user_id)
        .bind(build.preview_only)
        .bind(build.status.as_str())
        .bind(build.created_at)
        .bind(build.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// `queued → in_progress`
    pub async fn start(&self, build_id: Uuid) -> TrackerResult<Build> {
        self.transition(build_id, BuildStatus::Queued, BuildStatus::InProgress, Outcome::None)
            .await
    }

    /// `in_progress → complete`, recording where the site was published.
    pub async fn complete(
        &self,
        build_id: Uuid,
        preview_url: &str,
        version_id: Uuid,
    ) -> TrackerResult<Build> {
        let preview_url = preview_url.trim();
        if preview_url.is_empty() {
            return Err(TrackerError::Validation(
                "preview_url must not be empty".into(),
            ));
        }
        self.transition(
            build_id,
            BuildStatus::InProgress,
            BuildStatus::Complete,
            Outcome::Published {
                preview_url,
                version_id,
            },
        )
        .await
    }

    /// `in_progress → error`. The message is sanitized and truncated to
    /// [`MAX_ERROR_MESSAGE_CHARS`].
    pub async fn fail(&self, build_id: Uuid, error_message: &str) -> TrackerResult<Build> {
        let message = sanitize_error_message(error_message);
        self.transition(
            build_id,
            BuildStatus::InProgress,
            BuildStatus::Error,
            Outcome::Failed(&message),
        )
        .await
    }

    async fn transition(
        &self,
        build_id: Uuid,
        from: BuildStatus,
        to: BuildStatus,
        outcome: Outcome<'_>,
    ) -> TrackerResult<Build> {
        debug_assert!(from.can_transition_to(to), "{from} -> {to} is not an edge");
        let (preview_url, error_message, version_id) = match outcome {
            Outcome::None => (None, None, None),
            Outcome::Published {
                preview_url,
                version_id,
            } => (Some(preview_url), None, Some(version_id)),
            Outcome::Failed(message) => (None, Some(message), None),
        };

        let row = sqlx::query_as::<_, BuildRow>(&format!(
            "UPDATE builds
             SET status = ?, preview_url = ?, error_message = ?, version_id = ?,
                 updated_at = MAX(updated_at, ?)
             WHERE id = ? AND status = ?
             RETURNING {BUILD_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(preview_url)
        .bind(error_message)
        .bind(version_id)
        .bind(Utc::now())
        .bind(build_id)
        .bind(from.as_str())
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => {
                debug!(build_id = %build_id, from = %from, to = %to, "Build transitioned");
                Build::try_from(row).map_err(TrackerError::Corrupt)
            }
            None => {
                let current = self.get(build_id).await?;
                Err(TrackerError::InvalidTransition {
                    build_id,
                    from: current.status,
                    to,
                })
            }
        }
    }

    /// Read a build by id.
    pub async fn get(&self, build_id: Uuid) -> TrackerResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>(&format!(
            "SELECT {BUILD_COLUMNS} FROM builds WHERE id = ?"
        ))
        .bind(build_id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("build `{}`", build_id)))?;

        Build::try_from(row).map_err(TrackerError::Corrupt)
    }

    /// Most recently created build for a user.
    pub async fn latest_for_user(&self, user_id: &str) -> TrackerResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>(&format!(
            "SELECT {BUILD_COLUMNS} FROM builds
             WHERE user_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("builds for user `{}`", user_id)))?;

        Build::try_from(row).map_err(TrackerError::Corrupt)
    }

    /// List a user's builds newest first.
    ///
    /// `cursor` is a value previously returned in [`BuildPage::next_cursor`].
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> TrackerResult<BuildPage> {
        let limit = limit.clamp(1, 100);
        let fetch_limit = limit + 1;

        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT {BUILD_COLUMNS} FROM builds WHERE user_id = "
        ));
        builder.push_bind(user_id);

        if let Some(cursor) = cursor {
            let (created_at, id) = decode_cursor(cursor)?;
            builder.push(" AND (created_at < ");
            builder.push_bind(created_at);
            builder.push(" OR (created_at = ");
            builder.push_bind(created_at);
            builder.push(" AND id < ");
            builder.push_bind(id);
            builder.push("))");
        }

        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let rows: Vec<BuildRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        let mut builds = rows
            .into_iter()
            .map(Build::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(TrackerError::Corrupt)?;

        let mut next_cursor = None;
        if builds.len() == fetch_limit {
            builds.pop();
            next_cursor = builds.last().map(encode_cursor);
        }

        Ok(BuildPage {
            builds,
            next_cursor,
        })
    }

    /// Builds still `queued` or `in_progress`, oldest first.
    pub async fn unfinished(&self) -> TrackerResult<Vec<Build>> {
        let rows = sqlx::query_as::<_, BuildRow>(&format!(
            "SELECT {BUILD_COLUMNS} FROM builds
             WHERE status IN (?, ?)
             ORDER BY created_at ASC"
        ))
        .bind(BuildStatus::Queued.as_str())
        .bind(BuildStatus::InProgress.as_str())
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter()
            .map(Build::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(TrackerError::Corrupt)
    }
}

enum Outcome<'a> {
    None,
    Published { preview_url: &'a str, version_id: Uuid },
    Failed(&'a str),
}

/// Trim and check a user id: 1–128 characters of `[A-Za-z0-9_.@-]`.
pub fn validate_user_id(user_id: &str) -> TrackerResult<String> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::Validation("user_id is required".into()));
    }
    if trimmed.len() > MAX_USER_ID_LEN {
        return Err(TrackerError::Validation(format!(
            "user_id must be at most {} characters",
            MAX_USER_ID_LEN
        )));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
    {
        return Err(TrackerError::Validation(
            "user_id may only contain letters, digits, '-', '_', '.' and '@'".into(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Strip control characters (newlines and tabs survive) and cap the length.
pub fn sanitize_error_message(message: &str) -> String {
    let cleaned: String = message
        .trim()
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .take(MAX_ERROR_MESSAGE_CHARS)
        .collect();

    if cleaned.is_empty() {
        "build failed".to_string()
    } else {
        cleaned
    }
}

fn encode_cursor(build: &Build) -> String {
    format!("{}|{}", build.created_at.to_rfc3339(), build.id)
}

fn decode_cursor(cursor: &str) -> TrackerResult<(DateTime<Utc>, Uuid)> {
    let invalid = || TrackerError::Validation("invalid continuation token".into());
    let (created_at, id) = cursor.split_once('|').ok_or_else(invalid)?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|_| invalid())?
        .with_timezone(&Utc);
    let id = Uuid::parse_str(id).map_err(|_| invalid())?;
    Ok((created_at, id))
}
