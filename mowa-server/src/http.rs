//! REST surface: session lifecycle plus a health probe.

use crate::websocket;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mowa_core::config::SessionOverrides;
use mowa_core::Error;
use mowa_engine::SessionManager;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::error;

pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub started_at: Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/sessions", post(create_session))
        .route(
            "/api/v1/sessions/:id",
            get(get_session).delete(delete_session),
        )
        .route("/api/v1/sessions/:id/ws", get(websocket::websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
        Error::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Backpressure => StatusCode::TOO_MANY_REQUESTS,
        Error::SessionClosed => StatusCode::GONE,
        Error::TransportDecode(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "error": err.error_type(),
            "message": err.to_string(),
        })),
    )
        .into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.manager.session_count(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateSessionRequest {
    #[allow(dead_code)]
    session_name: Option<String>,
    language: Option<String>,
    voice_id: Option<String>,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<CreateSessionRequest>>,
) -> Response {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let overrides = SessionOverrides {
        language: request.language,
        voice_id: request.voice_id,
        ..SessionOverrides::default()
    };
    match state.manager.create_session(overrides).await {
        Ok(session) => (
            StatusCode::CREATED,
            Json(json!({
                "session_id": session.id(),
                "created_at": session.created_at().to_rfc3339(),
                "status": session.state().as_str(),
            })),
        )
            .into_response(),
        Err(e) => {
            error!("failed to create session: {}", e);
            error_response(&e)
        }
    }
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.get_session(&id) {
        Ok(session) => {
            session.touch();
            Json(session.snapshot()).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    // Idempotent by design: deleting an unknown or already-closed id is fine.
    match state.manager.close_session(&id).await {
        Ok(()) => Json(json!({ "message": "session closed" })).into_response(),
        Err(e) => error_response(&e),
    }
}
