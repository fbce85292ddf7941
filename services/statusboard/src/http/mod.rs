//! Admin HTTP plane.
//!
//! Request path through the layers: CORS (handles preflight before
//! anything else) → drain guard → rate limit → bearer auth → CSRF →
//! handler. Handlers never run for an unauthenticated or over-rate
//! request, nor once shutdown has begun.

pub mod auth;
pub mod config_api;
pub mod rate_limit;
pub mod response;
pub mod state;

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower::ServiceExt;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use self::state::AppState;
use crate::settings::AdminSettings;

/// Request bodies above this are rejected before deserialization.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn build_router(app_state: AppState, static_dir: Option<PathBuf>, cors: CorsLayer) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/config",
            get(config_api::get_config)
                .put(config_api::replace_config)
                .patch(config_api::merge_config),
        )
        .route("/api/v1/config/servers", get(config_api::get_servers))
        .route("/api/v1/config/validate", post(config_api::validate_config))
        .route("/api/v1/csrf", get(config_api::get_csrf))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_csrf,
        ))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_bearer,
        ))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            rate_limit::limit_by_ip,
        ))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            reject_during_drain,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    let router = Router::new()
        .merge(api)
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz));

    let router = match static_dir {
        Some(dir) => router.fallback(move |method: Method, uri: Uri, req: Request| {
            let dir = dir.clone();
            async move { static_fallback(method, uri, req, dir).await }
        }),
        None => router.fallback(fallback_404),
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Translate the CORS settings into a layer. Wildcard origins require the
/// explicit dev-only opt-in.
pub fn cors_layer(admin: &AdminSettings) -> Result<CorsLayer, String> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::PATCH, Method::POST])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(auth::CSRF_HEADER),
        ]);
    if admin.cors_allow_any {
        return Ok(layer.allow_origin(Any));
    }
    let mut origins = Vec::with_capacity(admin.cors_origins.len());
    for origin in &admin.cors_origins {
        let value = HeaderValue::from_str(origin)
            .map_err(|_| format!("invalid CORS origin '{}'", origin))?;
        origins.push(value);
    }
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Once shutdown begins the graceful-drain window still accepts
/// connections; answer them with 503 rather than dispatching work that
/// would race the stopping scheduler.
async fn reject_during_drain(
    State(app_state): State<AppState>,
    request: Request,
    next: middleware::Next,
) -> Response {
    if app_state.draining.load(Ordering::Relaxed) {
        return response::service_unavailable("shutting down");
    }
    next.run(request).await
}

fn is_reserved_backend_path(path: &str) -> bool {
    let first_segment = path.trim_start_matches('/').split('/').next().unwrap_or("");
    matches!(first_segment, "api" | "healthz" | "readyz")
}

async fn static_fallback(method: Method, uri: Uri, req: Request, static_dir: PathBuf) -> Response {
    if is_reserved_backend_path(uri.path()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let index = static_dir.join("index.html");
    let service = ServeDir::new(static_dir).fallback(ServeFile::new(index));
    match service.oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn fallback_404() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

mod health {
    use axum::response::IntoResponse;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }

    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_prefixes_are_never_served_statically() {
        assert!(is_reserved_backend_path("/api"));
        assert!(is_reserved_backend_path("/api/v1/config"));
        assert!(is_reserved_backend_path("/healthz"));
        assert!(!is_reserved_backend_path("/index.html"));
        assert!(!is_reserved_backend_path("/apiary"));
    }
}
