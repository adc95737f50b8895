//! Defines routes for the site builder API.
//!
//! ## Structure
//! - **Build API** (bearer token when configured)
//!   - `POST /build-site` — queue a build
//!   - `GET  /build-status/{build_id}` — current status of one build
//!   - `GET  /preview/{build_id}` — HTML frame around a finished build
//!   - `GET  /users/{user_id}/builds` — a user's builds, newest first
//!   - `GET  /users/{user_id}/builds/latest` — a user's newest build
//!   - `GET  /users/{user_id}/versions` — published versions
//!
//! - **Public endpoints**
//!   - `GET /sites/{*key}` — published site files
//!   - `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        build_handlers::{
            build_status, create_build, latest_build, list_builds, list_versions, preview,
        },
        health_handlers::{healthz, readyz},
        site_handlers::serve_site_file,
    },
    routes::middleware::require_token,
    state::AppState,
};
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// Build the router. The state is needed up front for the auth layer.
pub fn routes(state: &AppState) -> Router<AppState> {
    let api = Router::new()
        .route("/build-site", post(create_build))
        .route("/build-status/{build_id}", get(build_status))
        .route("/preview/{build_id}", get(preview))
        .route("/users/{user_id}/builds", get(list_builds))
        .route("/users/{user_id}/builds/latest", get(latest_build))
        .route("/users/{user_id}/versions", get(list_versions))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/sites/{*key}", get(serve_site_file))
        .merge(api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::testing,
        models::build::BuildStatus,
        services::{
            build_runner::{BuildRunner, DEFAULT_BUILD_TIMEOUT},
            build_tracker::{BuildLimits, BuildTracker},
            content_gateway::{SqliteContentGateway, tests::seed_user},
            publisher::LocalPublisher,
            renderer::SiteRenderer,
        },
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use sqlx::SqlitePool;
    use std::{sync::Arc, time::Duration};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct TestApp {
        _db_dir: TempDir,
        _storage: TempDir,
        pool: SqlitePool,
        state: AppState,
        router: Router,
    }

    impl TestApp {
        async fn new(limits: BuildLimits, api_token: Option<&str>) -> Self {
            let (db_dir, pool) = testing::pool().await;
            let storage = tempfile::tempdir().unwrap();
            let db = Arc::new(pool.clone());

            let publisher = Arc::new(LocalPublisher::new(
                db.clone(),
                storage.path(),
                "http://localhost:3000",
            ));
            let runner = BuildRunner::new(
                BuildTracker::new(db.clone(), limits),
                Arc::new(SqliteContentGateway::new(db.clone())),
                Arc::new(SiteRenderer::new().unwrap()),
                publisher.clone(),
                DEFAULT_BUILD_TIMEOUT,
            );
            let state = AppState {
                db,
                runner,
                publisher,
                api_token: api_token.map(Arc::from),
            };
            let router = routes(&state).with_state(state.clone());

            Self {
                _db_dir: db_dir,
                _storage: storage,
                pool,
                state,
                router,
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        async fn get(&self, uri: &str) -> Response {
            self.send(Request::get(uri).body(Body::empty()).unwrap())
                .await
        }

        async fn post_json(&self, uri: &str, body: &str) -> Response {
            self.send(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }

        async fn wait_until_finished(&self, build_id: Uuid) -> BuildStatus {
            for _ in 0..200 {
                let build = self.state.tracker().get(build_id).await.unwrap();
                if build.status.is_terminal() {
                    return build.status;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("build {build_id} did not finish");
        }
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn health_endpoints_report_ok() {
        let app = TestApp::new(BuildLimits::default(), None).await;

        let response = app.get("/healthz").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));

        let response = app.get("/readyz").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["checks"]["sqlite"]["ok"], true);
        assert_eq!(body["checks"]["storage"]["ok"], true);
    }

    #[tokio::test]
    async fn build_runs_to_completion_and_is_served() {
        let app = TestApp::new(BuildLimits::default(), None).await;
        seed_user(&app.pool, "u1").await;

        let response = app.post_json("/build-site", r#"{"user_id": "u1"}"#).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let accepted = body_json(response).await;
        assert_eq!(accepted["status"], "queued");
        assert_eq!(accepted["preview_url"], Value::Null);
        let build_id: Uuid = accepted["build_id"].as_str().unwrap().parse().unwrap();

        assert_eq!(app.wait_until_finished(build_id).await, BuildStatus::Complete);

        let status = body_json(app.get(&format!("/build-status/{build_id}")).await).await;
        assert_eq!(status["status"], "complete");
        assert!(status.get("error_message").is_none());
        let url = status["preview_url"].as_str().unwrap().to_string();
        assert!(url.starts_with("http://localhost:3000/sites/live/u1/"));

        let response = app.get(&format!("/preview/{build_id}?height=50")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(page.contains(&format!("src=\"{url}\"")));
        assert!(page.contains("height=\"100\""));

        let site_path = url.trim_start_matches("http://localhost:3000");
        let response = app.get(site_path).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("Ada"));

        let latest = body_json(app.get("/users/u1/builds/latest").await).await;
        assert_eq!(latest["build_id"], build_id.to_string());

        let versions = body_json(app.get("/users/u1/versions").await).await;
        assert_eq!(versions["versions"].as_array().unwrap().len(), 1);
        assert_eq!(versions["versions"][0]["is_active"], true);
        assert_eq!(versions["active_version_id"], versions["versions"][0]["id"]);
    }

    #[tokio::test]
    async fn failed_build_reports_its_error() {
        let app = TestApp::new(BuildLimits::default(), None).await;

        let response = app
            .post_json("/build-site", r#"{"user_id": "ghost", "preview_only": true}"#)
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let build_id: Uuid = body_json(response).await["build_id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();

        assert_eq!(app.wait_until_finished(build_id).await, BuildStatus::Error);
        let status = body_json(app.get(&format!("/build-status/{build_id}")).await).await;
        assert_eq!(status["status"], "error");
        assert_eq!(status["preview_url"], Value::Null);
        assert!(
            status["error_message"]
                .as_str()
                .unwrap()
                .contains("no approved content")
        );

        let response = app.get(&format!("/preview/{build_id}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_requests_are_rejected() {
        let app = TestApp::new(BuildLimits::default(), None).await;

        let response = app.post_json("/build-site", "{not json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.post_json("/build-site", r#"{"preview_only": true}"#).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app.post_json("/build-site", r#"{"user_id": "bad id"}"#).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["status"], 422);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM builds")
            .fetch_one(&app.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn malformed_query_strings_get_json_errors() {
        let app = TestApp::new(BuildLimits::default(), None).await;
        let build_id = Uuid::new_v4();

        for uri in [
            format!("/preview/{build_id}?height=abc"),
            "/users/u1/builds?limit=-1".to_string(),
        ] {
            let response = app.get(&uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = body_json(response).await;
            assert_eq!(body["status"], 400);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn limits_answer_too_many_requests() {
        let limits = BuildLimits {
            max_concurrent: 1,
            max_per_day: 100,
        };
        let app = TestApp::new(limits, None).await;
        // queued but never dispatched, so it holds the only slot
        app.state.tracker().create("u1", false).await.unwrap();

        let response = app.post_json("/build-site", r#"{"user_id": "u1"}"#).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("in progress"));
    }

    #[tokio::test]
    async fn unknown_builds_are_not_found() {
        let app = TestApp::new(BuildLimits::default(), None).await;

        let response = app.get(&format!("/build-status/{}", Uuid::new_v4())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app.get("/build-status/not-a-uuid").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app.get(&format!("/preview/{}", Uuid::new_v4())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app.get("/users/u1/builds/latest").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn queued_builds_have_no_preview() {
        let app = TestApp::new(BuildLimits::default(), None).await;
        let build = app.state.tracker().create("u1", true).await.unwrap();

        let response = app.get(&format!("/preview/{}", build.id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let status = body_json(app.get(&format!("/build-status/{}", build.id)).await).await;
        assert_eq!(status["status"], "queued");
    }

    #[tokio::test]
    async fn build_lists_page_with_continuation_tokens() {
        let app = TestApp::new(BuildLimits::default(), None).await;
        let mut created = Vec::new();
        for _ in 0..3 {
            created.push(app.state.tracker().create("u1", true).await.unwrap().id);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let first = body_json(app.get("/users/u1/builds?limit=2").await).await;
        let ids: Vec<_> = first["builds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["build_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec![created[2].to_string(), created[1].to_string()]);
        let token = first["next_continuation_token"].as_str().unwrap();

        let second = body_json(
            app.get(&format!("/users/u1/builds?limit=2&continuation-token={token}"))
                .await,
        )
        .await;
        assert_eq!(second["builds"].as_array().unwrap().len(), 1);
        assert_eq!(second["builds"][0]["build_id"], created[0].to_string());
        assert!(second.get("next_continuation_token").is_none());

        let response = app
            .get("/users/u1/builds?continuation-token=garbage")
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn token_guards_the_build_api_only() {
        let app = TestApp::new(BuildLimits::default(), Some("s3cret")).await;

        let response = app.post_json("/build-site", r#"{"user_id": "u1"}"#).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app.get("/users/u1/versions").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .send(
                Request::get("/users/u1/versions")
                    .header(header::AUTHORIZATION, "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        for wrong in ["Bearer s3creT", "Bearer s3cret2", "Bearer s3c", "s3cret"] {
            let response = app
                .send(
                    Request::get("/users/u1/versions")
                        .header(header::AUTHORIZATION, wrong)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{wrong}");
        }

        assert_eq!(app.get("/healthz").await.status(), StatusCode::OK);
        assert_eq!(
            app.get("/sites/live/u1/missing/index.html").await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn unsafe_site_paths_are_not_found() {
        let app = TestApp::new(BuildLimits::default(), None).await;
        let response = app.get("/sites/live/..%2F..%2Fetc/passwd").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
