//! Configuration read/write handlers.
//!
//! Every mutation goes through the same store the watcher and scheduler
//! use, so an admin write is immediately visible to the next poll cycle
//! and lands on disk with the same atomic-write protocol as any other
//! configuration change.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::config::{self, ConfigError};
use crate::http::response;
use crate::http::state::AppState;

pub async fn get_config(State(state): State<AppState>) -> Response {
    Json(state.store.get().as_ref().clone()).into_response()
}

pub async fn get_servers(State(state): State<AppState>) -> Response {
    Json(state.store.get().servers.clone()).into_response()
}

pub async fn replace_config(
    State(state): State<AppState>,
    Json(candidate): Json<serde_json::Value>,
) -> Response {
    match state.store.replace(candidate).await {
        Ok(()) => Json(state.store.get().as_ref().clone()).into_response(),
        Err(e) => config_error(&e),
    }
}

pub async fn merge_config(
    State(state): State<AppState>,
    Json(partial): Json<serde_json::Value>,
) -> Response {
    match state.store.merge(partial).await {
        Ok(()) => Json(state.store.get().as_ref().clone()).into_response(),
        Err(e) => config_error(&e),
    }
}

/// Runs validation only; neither persists nor publishes.
pub async fn validate_config(Json(candidate): Json<serde_json::Value>) -> Response {
    match config::validate_value(&candidate) {
        Ok(_) => Json(serde_json::json!({ "valid": true })).into_response(),
        Err(e) => config_error(&e),
    }
}

pub async fn get_csrf(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({ "csrf_token": state.auth.csrf_token() })).into_response()
}

fn config_error(err: &ConfigError) -> Response {
    if err.is_validation() {
        response::json_error(StatusCode::BAD_REQUEST, "CONFIG_INVALID", err.to_string())
    } else {
        response::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIG_IO",
            err.to_string(),
        )
    }
}
