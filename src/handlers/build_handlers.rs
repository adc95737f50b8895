//! HTTP handlers for the build API.
//! Build execution happens on a background task; every handler here only
//! touches build records and returns immediately.

use crate::{
    errors::AppError,
    models::{
        build::{Build, BuildStatus},
        version::WebsiteVersion,
    },
    services::build_tracker::validate_user_id,
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{Html, IntoResponse},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_PREVIEW_HEIGHT: i64 = 800;
const MIN_PREVIEW_HEIGHT: i64 = 100;
const MAX_PREVIEW_HEIGHT: i64 = 4000;
const DEFAULT_PAGE_SIZE: usize = 20;

/// Body of `POST /build-site`.
#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    pub user_id: String,
    #[serde(default)]
    pub preview_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuildAccepted {
    pub build_id: Uuid,
    pub status: BuildStatus,
    pub preview_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuildStatusResponse {
    pub build_id: Uuid,
    pub user_id: String,
    pub status: BuildStatus,
    pub preview_only: bool,
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<Build> for BuildStatusResponse {
    fn from(build: Build) -> Self {
        Self {
            build_id: build.id,
            user_id: build.user_id,
            status: build.status,
            preview_only: build.preview_only,
            preview_url: build.preview_url,
            version_id: build.version_id,
            created_at: build.created_at,
            updated_at: build.updated_at,
            error_message: build.error_message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuildListResponse {
    pub builds: Vec<BuildStatusResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersionListResponse {
    /// The live version currently served, if any.
    pub active_version_id: Option<Uuid>,
    pub versions: Vec<WebsiteVersion>,
}

#[derive(Debug, Deserialize)]
pub struct ListBuildsQuery {
    pub limit: Option<usize>,
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub height: Option<i64>,
}

/// `POST /build-site` — queue a build and start it in the background.
pub async fn create_build(
    State(state): State<AppState>,
    payload: Result<Json<BuildRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;

    let build = state
        .tracker()
        .create(&request.user_id, request.preview_only)
        .await?;
    let accepted = BuildAccepted {
        build_id: build.id,
        status: build.status,
        preview_url: None,
    };
    state.runner.spawn(build);

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// `GET /build-status/{build_id}`
pub async fn build_status(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<Json<BuildStatusResponse>, AppError> {
    let build = state.tracker().get(parse_build_id(&build_id)?).await?;
    Ok(Json(build.into()))
}

/// `GET /preview/{build_id}?height=` — an HTML page framing the published
/// site of a complete build.
pub async fn preview(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
    query: Result<Query<PreviewQuery>, QueryRejection>,
) -> Result<Html<String>, AppError> {
    let Query(q) = query?;
    let build = state.tracker().get(parse_build_id(&build_id)?).await?;
    let preview_url = match (build.status, build.preview_url.as_deref()) {
        (BuildStatus::Complete, Some(url)) => url,
        _ => {
            return Err(AppError::not_found(format!(
                "build `{}` has no preview yet",
                build.id
            )));
        }
    };

    let height = q
        .height
        .unwrap_or(DEFAULT_PREVIEW_HEIGHT)
        .clamp(MIN_PREVIEW_HEIGHT, MAX_PREVIEW_HEIGHT);

    Ok(Html(preview_page(preview_url, height)))
}

/// `GET /users/{user_id}/builds/latest`
pub async fn latest_build(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<BuildStatusResponse>, AppError> {
    let user_id = validate_user_id(&user_id)?;
    let build = state.tracker().latest_for_user(&user_id).await?;
    Ok(Json(build.into()))
}

/// `GET /users/{user_id}/builds?limit=&continuation-token=` — newest first.
/// Tokens are URL-safe base64 so they survive a query string unescaped.
pub async fn list_builds(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    query: Result<Query<ListBuildsQuery>, QueryRejection>,
) -> Result<Json<BuildListResponse>, AppError> {
    let Query(q) = query?;
    let user_id = validate_user_id(&user_id)?;
    let cursor = q
        .continuation_token
        .as_deref()
        .map(decode_continuation_token);

    let page = state
        .tracker()
        .list_for_user(
            &user_id,
            q.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            cursor.as_deref(),
        )
        .await?;

    Ok(Json(BuildListResponse {
        builds: page.builds.into_iter().map(Into::into).collect(),
        next_continuation_token: page.next_cursor.as_deref().map(encode_continuation_token),
    }))
}

/// `GET /users/{user_id}/versions` — published versions, newest first.
pub async fn list_versions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<VersionListResponse>, AppError> {
    let user_id = validate_user_id(&user_id)?;
    let versions = state.publisher.versions(&user_id).await?;
    let active = state.publisher.active_version(&user_id).await?;
    Ok(Json(VersionListResponse {
        active_version_id: active.map(|v| v.id),
        versions,
    }))
}

/// Unparseable ids cannot name a build, so they are simply not found.
fn parse_build_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found(format!("build `{}` not found", raw)))
}

fn preview_page(preview_url: &str, height: i64) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html lang=\"en\">\n",
            "<head><meta charset=\"utf-8\"><title>Site preview</title></head>\n",
            "<body style=\"margin:0\">\n",
            "<iframe src=\"{url}\" width=\"100%\" height=\"{height}\" ",
            "style=\"border:0\" title=\"Site preview\"></iframe>\n",
            "</body>\n",
            "</html>\n"
        ),
        url = html_escape(preview_url),
        height = height
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn encode_continuation_token(token: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

fn decode_continuation_token(token: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_page_escapes_the_url() {
        let page = preview_page("https://x.test/a?b=1&c=\"><script>", 640);
        assert!(page.contains("src=\"https://x.test/a?b=1&amp;c=&quot;&gt;&lt;script&gt;\""));
        assert!(page.contains("height=\"640\""));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn continuation_tokens_are_opaque_base64() {
        let raw = "2024-01-01T00:00:00+00:00|00000000-0000-0000-0000-000000000000";
        let encoded = encode_continuation_token(raw);
        assert!(!encoded.contains('|'));
        assert_eq!(decode_continuation_token(&encoded), raw);
        assert_eq!(decode_continuation_token("not base64!"), "not base64!");
    }
}
