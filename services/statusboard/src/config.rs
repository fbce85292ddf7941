//! Fleet configuration model, parsing, and validation.
//!
//! JSON is the sole config source; no environment variable overrides for
//! fleet fields. Default config path: `/data/config.json`, then
//! `./config.json` (see `settings`).
//!
//! # Required fields
//! - `server_ip`: non-empty host shared by every upstream
//! - `update_interval`: poll interval in seconds, at least 1
//! - `category_order`: non-empty ordered list of category names
//! - `category_emojis`: one display marker per name in `category_order`
//! - `servers`: list of `{name, port, category}` upstream descriptors
//!
//! # Derived fields
//! Each server's `resolved_host` is populated from `server_ip` during
//! validation, before the configuration is ever published to readers. It is
//! never serialized back to disk.
//!
//! Validation rules are identical at startup and at runtime; only the
//! failure action differs (startup aborts the process, runtime keeps the
//! previous snapshot).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Validated config types
// ---------------------------------------------------------------------------

/// Fully-validated fleet configuration. Immutable once published; replaced
/// wholesale on every reload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetConfig {
    pub server_ip: String,
    pub update_interval: u64,
    pub category_order: Vec<String>,
    pub category_emojis: HashMap<String, String>,
    pub servers: Vec<ServerEntry>,
}

/// One upstream game-server descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEntry {
    pub name: String,
    pub port: u16,
    pub category: String,
    /// Derived from `server_ip`; populated by validation, never persisted.
    #[serde(skip)]
    pub resolved_host: String,
}

// ---------------------------------------------------------------------------
// Raw JSON deserialization types (Option for everything, validated below)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawFleetConfig {
    server_ip: Option<String>,
    update_interval: Option<i64>,
    category_order: Option<Vec<String>>,
    category_emojis: Option<HashMap<String, String>>,
    servers: Option<Vec<RawServerEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawServerEntry {
    name: Option<String>,
    port: Option<i64>,
    category: Option<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config IO: {0}")]
    Io(String),
    #[error("config parse: {0}")]
    Parse(String),
    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: String, reason: String },
    #[error("merge: {0}")]
    Merge(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for validation failures (as opposed to IO failures); the admin
    /// plane maps these to a 400-class response.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ConfigError::Io(_))
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a JSON document and validate it into a [`FleetConfig`].
pub fn parse_and_validate(json: &str) -> Result<FleetConfig, ConfigError> {
    let raw: RawFleetConfig =
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_raw(raw)
}

/// Validate an already-deserialized JSON value (admin replace/merge path).
pub fn validate_value(value: &serde_json::Value) -> Result<FleetConfig, ConfigError> {
    let raw: RawFleetConfig =
        serde_json::from_value(value.clone()).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_raw(raw)
}

fn validate_raw(raw: RawFleetConfig) -> Result<FleetConfig, ConfigError> {
    let server_ip = raw
        .server_ip
        .ok_or_else(|| ConfigError::invalid("server_ip", "missing"))?;
    if server_ip.trim().is_empty() {
        return Err(ConfigError::invalid("server_ip", "must not be empty"));
    }

    let update_interval = raw
        .update_interval
        .ok_or_else(|| ConfigError::invalid("update_interval", "missing"))?;
    if update_interval < 1 {
        return Err(ConfigError::invalid(
            "update_interval",
            format!("must be at least 1 second, got {}", update_interval),
        ));
    }

    let category_order = raw
        .category_order
        .ok_or_else(|| ConfigError::invalid("category_order", "missing"))?;
    if category_order.is_empty() {
        return Err(ConfigError::invalid(
            "category_order",
            "must contain at least one category",
        ));
    }

    let category_emojis = raw
        .category_emojis
        .ok_or_else(|| ConfigError::invalid("category_emojis", "missing"))?;
    for category in &category_order {
        if !category_emojis.contains_key(category) {
            return Err(ConfigError::invalid(
                "category_emojis",
                format!("no emoji for category '{}'", category),
            ));
        }
    }

    let raw_servers = raw
        .servers
        .ok_or_else(|| ConfigError::invalid("servers", "missing"))?;
    let mut servers = Vec::with_capacity(raw_servers.len());
    for (i, s) in raw_servers.into_iter().enumerate() {
        let name = s
            .name
            .ok_or_else(|| ConfigError::invalid(format!("servers[{}].name", i), "missing"))?;
        if name.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("servers[{}].name", i),
                "must not be empty",
            ));
        }
        let port = s
            .port
            .ok_or_else(|| ConfigError::invalid(format!("servers[{}].port", i), "missing"))?;
        if !(1..=65535).contains(&port) {
            return Err(ConfigError::invalid(
                format!("servers[{}].port", i),
                format!("must be in 1..65535, got {}", port),
            ));
        }
        let category = s
            .category
            .ok_or_else(|| ConfigError::invalid(format!("servers[{}].category", i), "missing"))?;
        if !category_order.contains(&category) {
            return Err(ConfigError::invalid(
                format!("servers[{}].category", i),
                format!("'{}' is not in category_order", category),
            ));
        }
        servers.push(ServerEntry {
            name,
            port: port as u16,
            category,
            // Derivation happens here, before the snapshot is visible to
            // any reader.
            resolved_host: server_ip.clone(),
        });
    }

    Ok(FleetConfig {
        server_ip,
        update_interval: update_interval as u64,
        category_order,
        category_emojis,
        servers,
    })
}
