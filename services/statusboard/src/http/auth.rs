//! Bearer-token and CSRF protection for the admin plane.
//!
//! The bearer token is compared by Sha256-digest equality so the
//! comparison cost does not depend on where the presented value first
//! diverges. The CSRF token is a process-wide value minted at startup:
//! every legitimate client has already authenticated with the bearer
//! token, so the CSRF check only has to prove the request came from a
//! script that could read `/api/v1/csrf`, not identify a session.

use axum::{
    extract::{Request, State},
    http::{Method, header},
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::http::response;
use crate::http::state::AppState;

pub const CSRF_HEADER: &str = "x-csrf-token";

pub struct AdminAuth {
    token_digest: [u8; 32],
    csrf_token: String,
}

impl AdminAuth {
    pub fn new(bearer_token: &str) -> Self {
        let mut csrf_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut csrf_bytes);
        AdminAuth {
            token_digest: Sha256::digest(bearer_token.as_bytes()).into(),
            csrf_token: URL_SAFE_NO_PAD.encode(csrf_bytes),
        }
    }

    pub fn verify_bearer(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        presented == self.token_digest
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn verify_csrf(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        let expected: [u8; 32] = Sha256::digest(self.csrf_token.as_bytes()).into();
        presented == expected
    }
}

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

// ---------------------------------------------------------------------------
// Token strength
// ---------------------------------------------------------------------------

const MIN_TOKEN_LEN: usize = 16;
const PLACEHOLDER_TOKENS: &[&str] = &[
    "changeme",
    "change-me",
    "password",
    "passw0rd",
    "secret",
    "token",
    "admin",
    "test",
    "example",
    "letmein",
    "hunter2",
    "0000000000000000",
    "1234567890123456",
    "xxxxxxxxxxxxxxxx",
    "replace-this-token",
    "do-not-use-in-prod",
];

/// Startup check; a violation aborts the process.
pub fn check_token_strength(token: &str) -> Result<(), String> {
    if token.len() < MIN_TOKEN_LEN {
        return Err(format!(
            "admin bearer token must be at least {} characters",
            MIN_TOKEN_LEN
        ));
    }
    if PLACEHOLDER_TOKENS.contains(&token.to_ascii_lowercase().as_str()) {
        return Err("admin bearer token is a well-known placeholder value".to_owned());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer)
        .is_some_and(|token| state.auth.verify_bearer(token));
    if !authorized {
        return response::unauthorized("missing or invalid bearer token");
    }
    next.run(request).await
}

pub async fn require_csrf(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mutating = matches!(
        *request.method(),
        Method::PUT | Method::PATCH | Method::POST | Method::DELETE
    );
    if mutating {
        let presented = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok());
        if !presented.is_some_and(|token| state.auth.verify_csrf(token)) {
            return response::forbidden("missing or invalid CSRF token");
        }
    }
    next.run(request).await
}
