//! HTTP surface.
//!
//! Error payloads are `{error, details?}` JSON: 400 for validation, 503 for
//! missing dependencies or a not-ready template, 500 for internal failures,
//! 202 for accepted events.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus::{Registry, TextEncoder};
use serde::Serialize;

use facteur_bridge::consumer::{process_event, DEFAULT_SESSION_TTL};
use facteur_core::error::BridgeError;
use facteur_core::event::CommandEvent;
use facteur_ports::dispatcher::Dispatcher;
use facteur_ports::session::SessionStore;

/// Shared handler state.
pub struct AppState {
    pub dispatcher: Option<Arc<dyn Dispatcher>>,
    pub store: Option<Arc<dyn SessionStore>>,
    pub session_ttl: Duration,
    pub registry: Registry,
}

impl AppState {
    pub fn new(
        dispatcher: Option<Arc<dyn Dispatcher>>,
        store: Option<Arc<dyn SessionStore>>,
        registry: Registry,
    ) -> Self {
        Self {
            dispatcher,
            store,
            session_ttl: DEFAULT_SESSION_TTL,
            registry,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/commands", post(accept_command))
        .route("/api/status", get(status))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Errors surfaced to HTTP callers.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unavailable(String),
    Internal(String),
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Decode(_) | BridgeError::Validation(_) => {
                ApiError::Validation(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::Validation(details) => {
                (StatusCode::BAD_REQUEST, "invalid request", Some(details))
            }
            ApiError::Unavailable(details) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "dependency unavailable",
                Some(details),
            ),
            ApiError::Internal(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
                Some(details),
            ),
        };

        (
            status,
            Json(ErrorBody {
                error: error.to_string(),
                details,
            }),
        )
            .into_response()
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    TextEncoder::new()
        .encode_to_string(&state.registry.gather())
        .map_err(|err| ApiError::Internal(err.to_string()))
}

async fn accept_command(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let dispatcher = state
        .dispatcher
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("dispatcher is not configured".to_string()))?;

    let event = CommandEvent::decode(&body)?;

    let result = process_event(
        &event,
        dispatcher.as_ref(),
        state.store.as_deref(),
        state.session_ttl,
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(result)).into_response())
}

async fn status(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let dispatcher = state
        .dispatcher
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("dispatcher is not configured".to_string()))?;

    let report = dispatcher.status().await?;
    if !report.ready {
        return Err(ApiError::Unavailable(report.message));
    }

    Ok(Json(report).into_response())
}
