use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    build_runner::BuildRunner, build_tracker::BuildTracker, content_gateway::SqliteContentGateway,
    publisher::LocalPublisher, renderer::SiteRenderer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting site builder with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .await
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Apply schema (idempotent); migration mode stops here ---
    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let tracker = BuildTracker::new(db.clone(), cfg.limits());
    let publisher = Arc::new(LocalPublisher::new(
        db.clone(),
        cfg.storage_dir.clone(),
        cfg.public_base_url.clone(),
    ));
    let renderer = Arc::new(SiteRenderer::new().context("loading site templates")?);
    let runner = BuildRunner::new(
        tracker,
        Arc::new(SqliteContentGateway::new(db.clone())),
        renderer,
        publisher.clone(),
        cfg.build_timeout(),
    );

    // --- Release builds left over from a previous run ---
    runner
        .recover()
        .await
        .context("recovering unfinished builds")?;

    let state = state::AppState {
        db,
        runner,
        publisher,
        api_token: cfg.api_token.as_deref().map(Arc::from),
    };
    if state.api_token.is_none() {
        tracing::warn!("SITE_BUILDER_API_TOKEN is not set; the build API is unauthenticated");
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(&state).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
