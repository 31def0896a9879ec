//! HTTP control surface.
//!
//! | Route | Effect |
//! |---|---|
//! | `GET /health` | `{ ok, running, sourceFilesExist, authValid, phase, encoder? }` |
//! | `POST /stream/start` | launch with optional overlay overrides; idempotent while running |
//! | `POST /stream/stop` | stop the encoder and the engagement loop |
//!
//! Failures answer `{ ok: false, error, msg }`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::chat::{Credentials, EngagementScheduler};
use crate::config::{AppConfig, OverlayOverrides};
use crate::stream::{EncoderProgress, StreamError, StreamPhase, Supervisor};

/// Health snapshot returned by `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub ok: bool,
    pub running: bool,
    pub source_files_exist: bool,
    pub auth_valid: bool,
    #[serde(flatten)]
    pub phase: StreamPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<EncoderProgress>,
}

/// The operations behind the HTTP routes.
pub struct ControlSurface {
    config: AppConfig,
    supervisor: Supervisor,
    engagement: Option<Arc<EngagementScheduler>>,
    credentials: Arc<Credentials>,
    progress: Option<watch::Receiver<Option<EncoderProgress>>>,
}

impl ControlSurface {
    #[must_use]
    pub fn new(config: AppConfig, supervisor: Supervisor, credentials: Arc<Credentials>) -> Self {
        Self {
            config,
            supervisor,
            engagement: None,
            credentials,
            progress: None,
        }
    }

    /// Start and stop this scheduler together with the stream.
    #[must_use]
    pub fn with_engagement(mut self, scheduler: Arc<EngagementScheduler>) -> Self {
        self.engagement = Some(scheduler);
        self
    }

    /// Report the latest encoder progress in health snapshots.
    #[must_use]
    pub fn with_progress(mut self, progress: watch::Receiver<Option<EncoderProgress>>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub async fn health(&self) -> Health {
        let running = self.supervisor.is_live();
        let encoder = if running {
            self.progress.as_ref().and_then(|rx| rx.borrow().clone())
        } else {
            None
        };

        Health {
            ok: true,
            running,
            source_files_exist: self
                .config
                .stream_config(&OverlayOverrides::default())
                .sources_exist(),
            auth_valid: self.credentials.is_valid(),
            phase: self.supervisor.phase().await,
            encoder,
        }
    }

    /// Launch the stream. Succeeds without relaunching if already running.
    pub async fn start(&self, overrides: &OverlayOverrides) -> Result<(), StreamError> {
        let config = self.config.stream_config(overrides);
        match self.supervisor.start(config).await {
            Ok(()) => {}
            Err(StreamError::AlreadyRunning) => {
                info!("start requested while already streaming");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if let Some(scheduler) = &self.engagement {
            scheduler.start().await;
        }
        Ok(())
    }

    /// Stop the stream. The engagement loop is stopped even if the stream
    /// was already down, e.g. after a failed crash replay.
    pub async fn stop(&self) -> Result<(), StreamError> {
        let stopped = self.supervisor.stop().await;
        if let Some(scheduler) = &self.engagement {
            scheduler.stop().await;
        }
        stopped
    }
}

/// Build the axum router for `surface`.
pub fn router(surface: Arc<ControlSurface>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stream/start", post(start))
        .route("/stream/stop", post(stop))
        .with_state(surface)
}

async fn health(State(surface): State<Arc<ControlSurface>>) -> Json<Health> {
    Json(surface.health().await)
}

async fn start(
    State(surface): State<Arc<ControlSurface>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let overrides = parse_overrides(&headers, &body)?;
    surface.start(&overrides).await?;
    Ok(Json(json!({ "ok": true })))
}

/// An empty body means no overrides; anything else must be a JSON object.
fn parse_overrides(headers: &HeaderMap, body: &[u8]) -> Result<OverlayOverrides, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(OverlayOverrides::default());
    }

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json"));
    if !is_json {
        return Err(invalid_body("expected Content-Type: application/json".to_string()));
    }

    Json::<OverlayOverrides>::from_bytes(body)
        .map(|Json(overrides)| overrides)
        .map_err(|rejection| invalid_body(rejection.body_text()))
}

fn invalid_body(reason: String) -> ApiError {
    ApiError(StreamError::InvalidConfig(format!("invalid start body: {reason}")))
}

async fn stop(State(surface): State<Arc<ControlSurface>>) -> Result<Json<serde_json::Value>, ApiError> {
    surface.stop().await?;
    Ok(Json(json!({ "ok": true })))
}

/// A [`StreamError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub StreamError);

impl From<StreamError> for ApiError {
    fn from(e: StreamError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self.0 {
            StreamError::InvalidConfig(_) => "InvalidConfig",
            StreamError::AlreadyRunning => "AlreadyRunning",
            StreamError::NotRunning => "NotRunning",
            StreamError::Spawn(_) => "Spawn",
            StreamError::Playlist(_) => "Playlist",
        }
    }

    fn status(&self) -> StatusCode {
        match self.0 {
            StreamError::InvalidConfig(_) | StreamError::AlreadyRunning | StreamError::NotRunning => {
                StatusCode::BAD_REQUEST
            }
            StreamError::Spawn(_) | StreamError::Playlist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "ok": false,
            "error": self.kind(),
            "msg": self.0.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
