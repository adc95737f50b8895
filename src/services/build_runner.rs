//! src/services/build_runner.rs
//!
//! BuildRunner — executes one build end to end on its own tokio task:
//! fetch content, check it, render on a blocking thread, publish, then record
//! the outcome with the tracker. Only the task that started a build moves it
//! to a terminal state.

use crate::{
    models::{
        build::{Build, BuildStatus},
        version::Destination,
    },
    services::{
        build_tracker::{BuildTracker, TrackerError, TrackerResult},
        content_gateway::{ContentGateway, GatewayError},
        publisher::{ArtifactPublisher, PublishError, Published},
        renderer::{RenderError, SiteRenderer},
        validation,
    },
};
use futures::FutureExt;
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);
pub const INTERRUPTED_MESSAGE: &str = "build interrupted by service restart";

/// Why a build ended in `error`. The display text becomes the stored message.
#[derive(Debug, Error)]
pub enum BuildFailure {
    #[error("missing required content: {}", .0.join(", "))]
    ContentMissing(Vec<&'static str>),
    #[error("content fetch failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("render task failed: {0}")]
    RenderTask(#[from] tokio::task::JoinError),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
    #[error("build timed out after {0}s")]
    Timeout(u64),
    #[error("build panicked: {0}")]
    Panicked(String),
}

/// Result of startup recovery.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Builds found `in_progress` and failed.
    pub interrupted: usize,
    /// Tasks for builds found `queued` and dispatched again.
    pub requeued: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct BuildRunner {
    tracker: BuildTracker,
    gateway: Arc<dyn ContentGateway>,
    renderer: Arc<SiteRenderer>,
    publisher: Arc<dyn ArtifactPublisher>,
    timeout: Duration,
}

impl BuildRunner {
    pub fn new(
        tracker: BuildTracker,
        gateway: Arc<dyn ContentGateway>,
        renderer: Arc<SiteRenderer>,
        publisher: Arc<dyn ArtifactPublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            tracker,
            gateway,
            renderer,
            publisher,
            timeout,
        }
    }

    pub fn tracker(&self) -> &BuildTracker {
        &self.tracker
    }

    /// Run `build` on a background task.
    pub fn spawn(&self, build: Build) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            let build_id = build.id;
            if let Err(err) = runner.execute(build).await {
                error!(%build_id, "Failed to record build outcome: {}", err);
            }
        })
    }

    /// Take a queued build through the pipeline and record how it ended.
    ///
    /// Pipeline failures, panics included, are not errors here: they end the
    /// build in `error`, as does a failure to record completion. `Err` means
    /// the tracker itself could not be updated.
    pub async fn execute(&self, build: Build) -> TrackerResult<Build> {
        let build = self.tracker.start(build.id).await?;
        let build_id = build.id;
        info!(
            %build_id,
            user_id = %build.user_id,
            preview_only = build.preview_only,
            "Build started"
        );

        let pipeline = AssertUnwindSafe(self.pipeline(&build)).catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout, pipeline).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => Err(BuildFailure::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(BuildFailure::Timeout(self.timeout.as_secs())),
        };

        let failure = match outcome {
            Ok(published) => {
                match self
                    .tracker
                    .complete(build_id, &published.url, published.version_id)
                    .await
                {
                    Ok(build) => {
                        info!(%build_id, url = %published.url, "Build complete");
                        return Ok(build);
                    }
                    // someone else already moved the build on; leave it alone
                    Err(err @ TrackerError::InvalidTransition { .. }) => return Err(err),
                    Err(err) => {
                        error!(%build_id, "Could not record completed build: {}", err);
                        format!("could not record build result: {err}")
                    }
                }
            }
            Err(failure) => {
                warn!(%build_id, "Build failed: {}", failure);
                failure.to_string()
            }
        };
        self.tracker.fail(build_id, &failure).await
    }

    async fn pipeline(&self, build: &Build) -> Result<Published, BuildFailure> {
        let content = self.gateway.fetch(&build.user_id).await?;

        let missing = validation::missing_required(&content);
        if !missing.is_empty() {
            return Err(BuildFailure::ContentMissing(missing));
        }

        let renderer = Arc::clone(&self.renderer);
        let artifact = tokio::task::spawn_blocking(move || {
            let style = content.style.clone().unwrap_or_default();
            renderer.render(&content, &style)
        })
        .await??;

        let destination = if build.preview_only {
            Destination::Preview
        } else {
            Destination::Live
        };
        Ok(self
            .publisher
            .publish(&artifact, destination, &build.user_id)
            .await?)
    }

    /// Release builds left behind by a previous process: `in_progress` ones
    /// are failed, `queued` ones are dispatched again.
    pub async fn recover(&self) -> TrackerResult<Recovery> {
        let mut recovery = Recovery::default();
        for build in self.tracker.unfinished().await? {
            match build.status {
                BuildStatus::InProgress => {
                    match self.tracker.fail(build.id, INTERRUPTED_MESSAGE).await {
                        Ok(_) => recovery.interrupted += 1,
                        Err(err) => warn!(
                            build_id = %build.id,
                            "Could not fail interrupted build: {}", err
                        ),
                    }
                }
                BuildStatus::Queued => recovery.requeued.push(self.spawn(build)),
                BuildStatus::Complete | BuildStatus::Error => {}
            }
        }
        if recovery.interrupted > 0 || !recovery.requeued.is_empty() {
            info!(
                interrupted = recovery.interrupted,
                requeued = recovery.requeued.len(),
                "Recovered unfinished builds"
            );
        }
        Ok(recovery)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
