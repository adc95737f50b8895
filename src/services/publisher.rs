//! src/services/publisher.rs
//!
//! Artifact publishing to local disk. Every publish lands in its own version
//! directory, `base_path/{destination}/{user_id}/{version_id}/`, so published
//! versions are immutable and never overwritten.

use crate::{
    models::version::{Destination, WebsiteVersion},
    services::renderer::Artifact,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

const MAX_KEY_LEN: usize = 1024;
const INDEX_FILE: &str = "index.html";
const VERSION_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("artifact has no files")]
    EmptyArtifact,
    #[error("artifact has no index.html")]
    MissingIndex,
    #[error("`{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type PublishResult<T> = Result<T, PublishError>;

/// Where a publish ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub url: String,
    pub version_id: Uuid,
}

/// A published file opened for streaming.
#[derive(Debug)]
pub struct PublishedFile {
    pub file: File,
    pub content_type: String,
    pub len: u64,
}

/// Destination for rendered artifacts.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(
        &self,
        artifact: &Artifact,
        destination: Destination,
        user_id: &str,
    ) -> PublishResult<Published>;
}

#[derive(Clone)]
pub struct LocalPublisher {
    db: Arc<SqlitePool>,
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalPublisher {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Public URL for a key relative to the storage root.
    fn public_url(&self, key: &str) -> String {
        format!("{}/sites/{}", self.public_base_url, key)
    }

    /// Version history for a user, newest first.
    pub async fn versions(&self, user_id: &str) -> PublishResult<Vec<WebsiteVersion>> {
        let versions = sqlx::query_as::<_, WebsiteVersion>(
            r#"
            SELECT id, user_id, destination, storage_prefix, index_url, checksum,
                   file_count, is_active, created_at
            FROM website_versions
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(VERSION_HISTORY_LIMIT)
        .fetch_all(&*self.db)
        .await?;
        Ok(versions)
    }

    /// The currently active live version, if any.
    pub async fn active_version(&self, user_id: &str) -> PublishResult<Option<WebsiteVersion>> {
        let version = sqlx::query_as::<_, WebsiteVersion>(
            r#"
            SELECT id, user_id, destination, storage_prefix, index_url, checksum,
                   file_count, is_active, created_at
            FROM website_versions
            WHERE user_id = ? AND is_active = 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(version)
    }

    /// Open a published file. A key ending in `/` serves that directory's
    /// `index.html`.
    pub async fn open(&self, key: &str) -> PublishResult<PublishedFile> {
        ensure_key_safe(key)?;
        if key.split('/').any(|segment| segment.starts_with('.')) {
            return Err(PublishError::InvalidKey(key.to_string()));
        }

        let mut path = self.base_path.join(key);
        if key.ends_with('/') {
            path.push(INDEX_FILE);
        }

        let not_found = |err: io::Error| {
            if err.kind() == ErrorKind::NotFound {
                PublishError::NotFound(key.to_string())
            } else {
                PublishError::Io(err)
            }
        };
        let file = File::open(&path).await.map_err(not_found)?;
        let meta = file.metadata().await.map_err(not_found)?;
        if !meta.is_file() {
            return Err(PublishError::NotFound(key.to_string()));
        }

        Ok(PublishedFile {
            file,
            content_type: mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string(),
            len: meta.len(),
        })
    }

    async fn write_files(&self, root: &Path, artifact: &Artifact) -> PublishResult<()> {
        for (rel_path, body) in artifact.files() {
            ensure_key_safe(rel_path)?;
            write_atomic(&root.join(rel_path), body).await?;
        }
        Ok(())
    }

    /// Insert the version row. A live version becomes the user's only active
    /// version in the same transaction.
    async fn record_version(&self, version: &WebsiteVersion) -> PublishResult<()> {
        let mut tx = self.db.begin().await?;

        if version.is_active {
            sqlx::query(
                "UPDATE website_versions SET is_active = 0 WHERE user_id = ? AND is_active = 1",
            )
            .bind(&version.user_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO website_versions (
                id, user_id, destination, storage_prefix, index_url,
                checksum, file_count, is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(version.id)
        .bind(&version.user_id)
        .bind(&version.destination)
        .bind(&version.storage_prefix)
        .bind(&version.index_url)
        .bind(&version.checksum)
        .bind(version.file_count)
        .bind(version.is_active)
        .bind(version.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactPublisher for LocalPublisher {
    /// Write every file of `artifact` into a fresh version directory and
    /// record the version. On any failure the version directory is removed.
    async fn publish(
        &self,
        artifact: &Artifact,
        destination: Destination,
        user_id: &str,
    ) -> PublishResult<Published> {
        if artifact.is_empty() {
            return Err(PublishError::EmptyArtifact);
        }
        if artifact.get(INDEX_FILE).is_none() {
            return Err(PublishError::MissingIndex);
        }

        let version_id = Uuid::new_v4();
        let prefix = format!("{}/{}/{}", destination, user_id, version_id);
        ensure_key_safe(&prefix)?;
        let root = self.base_path.join(&prefix);

        if let Err(err) = self.write_files(&root, artifact).await {
            remove_version_dir(&root).await;
            return Err(err);
        }

        let url = self.public_url(&format!("{}/{}", prefix, INDEX_FILE));
        let version = WebsiteVersion {
            id: version_id,
            user_id: user_id.to_string(),
            destination: destination.as_str().to_string(),
            storage_prefix: prefix,
            index_url: url.clone(),
            checksum: artifact.checksum(),
            file_count: artifact.len() as i64,
            is_active: destination == Destination::Live,
            created_at: Utc::now(),
        };

        if let Err(err) = self.record_version(&version).await {
            remove_version_dir(&root).await;
            return Err(err);
        }

        info!(
            user_id,
            %version_id,
            %destination,
            files = version.file_count,
            "Published site version"
        );
        Ok(Published { url, version_id })
    }
}

/// Reject keys that could escape the storage root.
fn ensure_key_safe(key: &str) -> PublishResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if invalid {
        return Err(PublishError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Write to a temp file beside `path`, fsync, then rename into place.
async fn write_atomic(path: &Path, body: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("file path missing parent directory"))?;
    fs::create_dir_all(parent).await?;
    let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

    let result = async {
        let mut file = File::create(&tmp_path).await?;
        file.write_all(body).await?;
        file.flush().await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

async fn remove_version_dir(root: &Path) {
    match fs::remove_dir_all(root).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => debug!("failed to remove {}: {}", root.display(), err),
    }
}
