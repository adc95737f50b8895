//! Content store gateway: reads a user's approved content.
//!
//! The builder never writes content. Only approved rows are read (final bio,
//! active style profile, `status = 'approved'` everywhere else) and every
//! section is fetched concurrently.

use crate::{
    models::content::{
        Bio, BlogPost, Content, ImageRef, Images, SocialLink, StoryChunk, StyleProfile, ValueItem,
        Video,
    },
    services::validation,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

const APPROVED: &str = "approved";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no approved content for user `{0}`")]
    NotFound(String),
    #[error("failed to fetch {section}: {source}")]
    Fetch {
        section: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("malformed {section}: {message}")]
    Malformed {
        section: &'static str,
        message: String,
    },
}

/// Source of the content a site is rendered from.
#[async_trait]
pub trait ContentGateway: Send + Sync {
    /// All approved content for `user_id`, with invalid list items removed.
    async fn fetch(&self, user_id: &str) -> Result<Content, GatewayError>;
}

#[derive(FromRow)]
struct BioRow {
    name: Option<String>,
    headline: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    expertise: Option<String>,
}

#[derive(FromRow)]
struct ImageRow {
    kind: String,
    url: String,
    alt_text: Option<String>,
}

#[derive(FromRow)]
struct BlogRow {
    title: String,
    slug: String,
    content: String,
    excerpt: Option<String>,
    thumbnail: Option<String>,
    tags: Option<String>,
    published_at: Option<String>,
}

#[derive(FromRow)]
struct VideoRow {
    title: String,
    url: String,
    kind: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
    tags: Option<String>,
}

#[derive(FromRow)]
struct StyleRow {
    colors: Option<String>,
    typography: Option<String>,
}

/// Gateway over the content tables in the builder's SQLite database.
#[derive(Clone)]
pub struct SqliteContentGateway {
    db: Arc<SqlitePool>,
}

impl SqliteContentGateway {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    async fn fetch_bio(&self, user_id: &str) -> Result<Option<Bio>, GatewayError> {
        let row = sqlx::query_as::<_, BioRow>(
            "SELECT name, headline, summary, content, expertise FROM bios
             WHERE user_id = ? AND is_final = 1
             ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&*self.db)
        .await
        .map_err(fetch_err("bio"))?;

        Ok(row.map(|row| Bio {
            name: row.name,
            headline: row.headline,
            summary: row.summary,
            content: row.content,
            expertise: parse_list(row.expertise.as_deref()),
        }))
    }

    async fn fetch_images(&self, user_id: &str) -> Result<Images, GatewayError> {
        let rows = sqlx::query_as::<_, ImageRow>(
            "SELECT kind, url, alt_text FROM images
             WHERE user_id = ? AND status = ?
             ORDER BY id DESC",
        )
        .bind(user_id)
        .bind(APPROVED)
        .fetch_all(&*self.db)
        .await
        .map_err(fetch_err("images"))?;

        // newest approved image of each kind wins
        let mut images = Images::default();
        for row in rows {
            if let Some(slot) = images.slot_mut(&row.kind) {
                if slot.is_none() {
                    *slot = Some(ImageRef {
                        url: row.url,
                        alt: row.alt_text.unwrap_or_default(),
                    });
                }
            }
        }
        Ok(images)
    }

    async fn fetch_blogs(&self, user_id: &str) -> Result<Vec<BlogPost>, GatewayError> {
        let rows = sqlx::query_as::<_, BlogRow>(
            "SELECT title, slug, content, excerpt, thumbnail, tags, published_at FROM blogs
             WHERE user_id = ? AND status = ?
             ORDER BY published_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(APPROVED)
        .fetch_all(&*self.db)
        .await
        .map_err(fetch_err("blogs"))?;

        Ok(rows
            .into_iter()
            .map(|row| BlogPost {
                title: row.title,
                slug: row.slug,
                content: row.content,
                excerpt: row.excerpt,
                thumbnail: row.thumbnail,
                tags: parse_list(row.tags.as_deref()),
                published_at: row.published_at,
            })
            .collect())
    }

    async fn fetch_videos(&self, user_id: &str) -> Result<Vec<Video>, GatewayError> {
        let rows = sqlx::query_as::<_, VideoRow>(
            "SELECT title, url, kind, thumbnail, description, tags FROM videos
             WHERE user_id = ? AND status = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(APPROVED)
        .fetch_all(&*self.db)
        .await
        .map_err(fetch_err("videos"))?;

        Ok(rows
            .into_iter()
            .map(|row| Video {
                title: row.title,
                url: row.url,
                kind: row.kind,
                thumbnail: row.thumbnail,
                description: row.description,
                tags: parse_list(row.tags.as_deref()),
            })
            .collect())
    }

    async fn fetch_story_chunks(&self, user_id: &str) -> Result<Vec<StoryChunk>, GatewayError> {
        let rows: Vec<(Option<String>, Option<String>, Option<String>, i64)> = sqlx::query_as(
            "SELECT title, content, image, order_index FROM story_chunks
             WHERE user_id = ? AND status = ?
             ORDER BY order_index, id",
        )
        .bind(user_id)
        .bind(APPROVED)
        .fetch_all(&*self.db)
        .await
        .map_err(fetch_err("story chunks"))?;

        Ok(rows
            .into_iter()
            .map(|(title, content, image, order_index)| StoryChunk {
                title,
                content,
                image,
                order_index,
            })
            .collect())
    }

    async fn fetch_values(&self, user_id: &str) -> Result<Vec<ValueItem>, GatewayError> {
        let rows: Vec<(Option<String>, Option<String>, Option<String>, i64)> = sqlx::query_as(
            "SELECT title, description, icon, order_index FROM value_items
             WHERE user_id = ? AND status = ?
             ORDER BY order_index, id",
        )
        .bind(user_id)
        .bind(APPROVED)
        .fetch_all(&*self.db)
        .await
        .map_err(fetch_err("values"))?;

        Ok(rows
            .into_iter()
            .map(|(title, description, icon, order_index)| ValueItem {
                title,
                description,
                icon,
                order_index,
            })
            .collect())
    }

    async fn fetch_social_links(&self, user_id: &str) -> Result<Vec<SocialLink>, GatewayError> {
        let rows: Vec<(Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT platform, url, icon FROM social_links
             WHERE user_id = ? AND status = ?
             ORDER BY id",
        )
        .bind(user_id)
        .bind(APPROVED)
        .fetch_all(&*self.db)
        .await
        .map_err(fetch_err("social links"))?;

        Ok(rows
            .into_iter()
            .map(|(platform, url, icon)| SocialLink {
                platform,
                url,
                icon,
            })
            .collect())
    }

    async fn fetch_style(&self, user_id: &str) -> Result<Option<StyleProfile>, GatewayError> {
        let row = sqlx::query_as::<_, StyleRow>(
            "SELECT colors, typography FROM style_profiles
             WHERE user_id = ? AND is_active = 1
             ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&*self.db)
        .await
        .map_err(fetch_err("style profile"))?;

        row.map(|row| {
            Ok(StyleProfile {
                colors: parse_style_map(row.colors.as_deref(), "value")?,
                typography: parse_style_map(row.typography.as_deref(), "family")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ContentGateway for SqliteContentGateway {
    async fn fetch(&self, user_id: &str) -> Result<Content, GatewayError> {
        let (bio, images, blogs, videos, story_chunks, values, social_links, style) = futures::try_join!(
            self.fetch_bio(user_id),
            self.fetch_images(user_id),
            self.fetch_blogs(user_id),
            self.fetch_videos(user_id),
            self.fetch_story_chunks(user_id),
            self.fetch_values(user_id),
            self.fetch_social_links(user_id),
            self.fetch_style(user_id),
        )?;

        let content = Content {
            bio,
            images,
            blogs,
            videos,
            story_chunks,
            values,
            social_links,
            style,
        };
        if content.is_empty() {
            return Err(GatewayError::NotFound(user_id.to_string()));
        }

        tracing::debug!(
            user_id,
            blogs = content.blogs.len(),
            videos = content.videos.len(),
            story_chunks = content.story_chunks.len(),
            "Fetched content"
        );
        Ok(validation::clean_content(content, user_id))
    }
}

fn fetch_err(section: &'static str) -> impl FnOnce(sqlx::Error) -> GatewayError {
    move |source| GatewayError::Fetch { section, source }
}

/// A JSON array of strings, or a comma-separated list.
fn parse_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Vec::new();
    };
    if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
        return items;
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A JSON object whose values are either plain strings or objects holding
/// the string under `field` (`{"primary": {"value": "#fff"}}`).
fn parse_style_map(
    raw: Option<&str>,
    field: &str,
) -> Result<BTreeMap<String, String>, GatewayError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(BTreeMap::new());
    };
    let parsed: BTreeMap<String, Value> =
        serde_json::from_str(raw).map_err(|err| GatewayError::Malformed {
            section: "style profile",
            message: err.to_string(),
        })?;

    Ok(parsed
        .into_iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::String(s) => Some(s),
                Value::Object(mut map) => match map.remove(field) {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                },
                _ => None,
            }?;
            Some((name, value))
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::testing;

    /// Seed a complete set of approved content for `user_id`.
    pub(crate) async fn seed_user(pool: &SqlitePool, user_id: &str) {
        let statements = [
            "INSERT INTO bios (user_id, name, headline, summary, expertise, is_final)
             VALUES (?1, 'Ada', 'Analyst', 'First programmer', '[\"math\",\"engines\"]', 1)",
            "INSERT INTO bios (user_id, name, summary, is_final) VALUES (?1, 'Draft', 'draft', 0)",
            "INSERT INTO images (user_id, kind, url, alt_text, status)
             VALUES (?1, 'profile', 'https://cdn.example.com/p.png', 'Ada', 'approved')",
            "INSERT INTO images (user_id, kind, url, status)
             VALUES (?1, 'background', 'https://cdn.example.com/b.png', 'approved')",
            "INSERT INTO images (user_id, kind, url, status)
             VALUES (?1, 'banner', 'https://cdn.example.com/pending.png', 'pending')",
            "INSERT INTO blogs (user_id, title, slug, content, tags, published_at, status)
             VALUES (?1, 'Older', 'older', 'old post', 'a, b', '2024-01-01', 'approved')",
            "INSERT INTO blogs (user_id, title, slug, content, published_at, status)
             VALUES (?1, 'Newer', 'newer', 'new post', '2024-06-01', 'approved')",
            "INSERT INTO blogs (user_id, title, slug, content, status)
             VALUES (?1, 'Draft', 'draft', 'nope', 'draft')",
            "INSERT INTO story_chunks (user_id, title, content, order_index, status)
             VALUES (?1, 'Later', 'b', 2, 'approved')",
            "INSERT INTO story_chunks (user_id, title, content, order_index, status)
             VALUES (?1, 'Earlier', 'a', 1, 'approved')",
            "INSERT INTO value_items (user_id, title, description, order_index, status)
             VALUES (?1, 'Curiosity', 'Always ask', 0, 'approved')",
            "INSERT INTO social_links (user_id, platform, url, status)
             VALUES (?1, 'GitHub', 'https://github.com/ada', 'approved')",
            "INSERT INTO social_links (user_id, platform, url, status)
             VALUES (?1, 'x', 'not-a-url', 'approved')",
            "INSERT INTO style_profiles (user_id, colors, typography, is_active)
             VALUES (?1, '{\"primary\": {\"value\": \"#112233\"}, \"accent\": \"#ff0000\"}',
                     '{\"heading\": {\"family\": \"Georgia\"}}', 1)",
        ];
        for stmt in statements {
            sqlx::query(stmt).bind(user_id).execute(pool).await.unwrap();
        }
    }

    #[tokio::test]
    async fn fetches_only_approved_content() {
        let (_dir, pool) = testing::pool().await;
        seed_user(&pool, "u1").await;
        let gateway = SqliteContentGateway::new(Arc::new(pool));

        let content = gateway.fetch("u1").await.unwrap();

        let bio = content.bio.unwrap();
        assert_eq!(bio.name.as_deref(), Some("Ada"));
        assert_eq!(bio.expertise, vec!["math", "engines"]);
        assert_eq!(
            content.images.profile.unwrap().url,
            "https://cdn.example.com/p.png"
        );
        assert!(content.images.banner.is_none());

        let titles: Vec<_> = content.blogs.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Newer", "Older"]);
        assert_eq!(content.blogs[1].tags, vec!["a", "b"]);

        let chunks: Vec<_> = content
            .story_chunks
            .iter()
            .map(|c| c.title.as_deref().unwrap())
            .collect();
        assert_eq!(chunks, vec!["Earlier", "Later"]);
        assert_eq!(content.values.len(), 1);

        // the malformed link is dropped, the other normalized
        assert_eq!(content.social_links.len(), 1);
        assert_eq!(content.social_links[0].platform.as_deref(), Some("github"));

        let style = content.style.unwrap();
        assert_eq!(style.colors["primary"], "#112233");
        assert_eq!(style.colors["accent"], "#ff0000");
        assert_eq!(style.typography["heading"], "Georgia");
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_dir, pool) = testing::pool().await;
        seed_user(&pool, "u1").await;
        let gateway = SqliteContentGateway::new(Arc::new(pool));

        let err = gateway.fetch("ghost").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(user) if user == "ghost"));
    }

    #[tokio::test]
    async fn malformed_style_profile_is_reported() {
        let (_dir, pool) = testing::pool().await;
        sqlx::query("INSERT INTO style_profiles (user_id, colors, is_active) VALUES ('u3', '{oops', 1)")
            .execute(&pool)
            .await
            .unwrap();
        let gateway = SqliteContentGateway::new(Arc::new(pool));

        let err = gateway.fetch("u3").await.unwrap_err();
        assert!(matches!(err, GatewayError::Malformed { .. }));
    }

    #[test]
    fn lists_parse_from_json_or_commas() {
        assert_eq!(parse_list(Some("[\"a\", \"b\"]")), vec!["a", "b"]);
        assert_eq!(parse_list(Some(" a ,, b ")), vec!["a", "b"]);
        assert!(parse_list(None).is_empty());
    }
}
