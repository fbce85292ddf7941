//! Process settings from the command line and environment.
//!
//! The fleet configuration itself lives in the JSON config file and is
//! runtime-mutable; everything here is fixed for the lifetime of the
//! process.
//!
//! # Config file location
//! `-c <path>` takes precedence; otherwise `/data/config.json` if it
//! exists, otherwise `./config.json`. No candidate present is a startup
//! error.
//!
//! # Environment
//! - `DISCORD_TOKEN`, `DISCORD_CHANNEL_ID`: required
//! - `ADMIN_API_ENABLED`: truthy to enable the admin plane
//! - `ADMIN_BEARER_TOKEN`: required when enabled; strength-checked
//! - `ADMIN_BIND_ADDR`: default `0.0.0.0:8081`
//! - `ADMIN_CORS_ORIGINS`: comma-separated origin allowlist
//! - `ADMIN_CORS_ALLOW_ANY`: dev-only wildcard opt-in
//! - `ADMIN_TRUSTED_PROXIES`: comma-separated IPs allowed to set
//!   `X-Forwarded-For`
//! - `ADMIN_STATIC_DIR`: optional SPA directory

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::http::auth;

#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub discord_token: String,
    pub channel_id: String,
    pub admin: Option<AdminSettings>,
}

#[derive(Debug, Clone)]
pub struct AdminSettings {
    pub bind_addr: String,
    pub bearer_token: String,
    pub cors_origins: Vec<String>,
    pub cors_allow_any: bool,
    pub trusted_proxies: Vec<IpAddr>,
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },
    #[error("no config file found (tried -c flag, /data/config.json, ./config.json)")]
    ConfigFileMissing,
    #[error("weak admin bearer token: {0}")]
    WeakToken(String),
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        Self::from_sources(std::env::args().skip(1), |key| std::env::var(key).ok())
    }

    /// Injectable variant used by tests.
    pub fn from_sources(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let cli_config_path = parse_config_flag(args);
        let config_path = resolve_config_path(cli_config_path)?;

        let discord_token = env("DISCORD_TOKEN").ok_or(SettingsError::MissingEnv("DISCORD_TOKEN"))?;
        let channel_id =
            env("DISCORD_CHANNEL_ID").ok_or(SettingsError::MissingEnv("DISCORD_CHANNEL_ID"))?;

        let admin = if is_truthy(env("ADMIN_API_ENABLED").as_deref()) {
            let bearer_token =
                env("ADMIN_BEARER_TOKEN").ok_or(SettingsError::MissingEnv("ADMIN_BEARER_TOKEN"))?;
            auth::check_token_strength(&bearer_token).map_err(SettingsError::WeakToken)?;

            let mut trusted_proxies = Vec::new();
            for raw in split_list(env("ADMIN_TRUSTED_PROXIES").as_deref()) {
                let ip = raw
                    .parse::<IpAddr>()
                    .map_err(|_| SettingsError::InvalidEnv {
                        var: "ADMIN_TRUSTED_PROXIES",
                        reason: format!("'{}' is not an IP address", raw),
                    })?;
                trusted_proxies.push(ip);
            }

            Some(AdminSettings {
                bind_addr: env("ADMIN_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_owned()),
                bearer_token,
                cors_origins: split_list(env("ADMIN_CORS_ORIGINS").as_deref()),
                cors_allow_any: is_truthy(env("ADMIN_CORS_ALLOW_ANY").as_deref()),
                trusted_proxies,
                static_dir: env("ADMIN_STATIC_DIR").map(PathBuf::from),
            })
        } else {
            None
        };

        Ok(Settings {
            config_path,
            discord_token,
            channel_id,
            admin,
        })
    }
}

fn parse_config_flag(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

fn resolve_config_path(cli: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
    if let Some(path) = cli {
        // Explicit path; absence surfaces when the store opens it.
        return Ok(path);
    }
    for candidate in ["/data/config.json", "./config.json"] {
        if Path::new(candidate).exists() {
            return Ok(PathBuf::from(candidate));
        }
    }
    Err(SettingsError::ConfigFileMissing)
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true") | Some("yes"))
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn args_of(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn cli_flag_takes_precedence_over_defaults() {
        let env = env_of(&[
            ("DISCORD_TOKEN", "tok"),
            ("DISCORD_CHANNEL_ID", "123"),
        ]);
        let settings =
            Settings::from_sources(args_of(&["-c", "/tmp/fleet.json"]), env).expect("settings");
        assert_eq!(settings.config_path, PathBuf::from("/tmp/fleet.json"));
        assert!(settings.admin.is_none());
    }

    #[test]
    fn missing_discord_token_is_an_error() {
        let env = env_of(&[("DISCORD_CHANNEL_ID", "123")]);
        let err = Settings::from_sources(args_of(&["-c", "/tmp/fleet.json"]), env).unwrap_err();
        assert!(matches!(err, SettingsError::MissingEnv("DISCORD_TOKEN")));
    }

    #[test]
    fn admin_plane_requires_strong_bearer_token() {
        let env = env_of(&[
            ("DISCORD_TOKEN", "tok"),
            ("DISCORD_CHANNEL_ID", "123"),
            ("ADMIN_API_ENABLED", "true"),
            ("ADMIN_BEARER_TOKEN", "changeme"),
        ]);
        let err = Settings::from_sources(args_of(&["-c", "/tmp/fleet.json"]), env).unwrap_err();
        assert!(matches!(err, SettingsError::WeakToken(_)));
    }

    #[test]
    fn admin_settings_parse_lists_and_defaults() {
        let env = env_of(&[
            ("DISCORD_TOKEN", "tok"),
            ("DISCORD_CHANNEL_ID", "123"),
            ("ADMIN_API_ENABLED", "1"),
            ("ADMIN_BEARER_TOKEN", "9f8e2c4b1a7d6350-prod"),
            ("ADMIN_CORS_ORIGINS", "https://a.example, https://b.example"),
            ("ADMIN_TRUSTED_PROXIES", "10.0.0.250"),
        ]);
        let settings =
            Settings::from_sources(args_of(&["-c", "/tmp/fleet.json"]), env).expect("settings");
        let admin = settings.admin.expect("admin enabled");
        assert_eq!(admin.bind_addr, "0.0.0.0:8081");
        assert_eq!(
            admin.cors_origins,
            vec!["https://a.example".to_owned(), "https://b.example".to_owned()]
        );
        assert!(!admin.cors_allow_any);
        assert_eq!(admin.trusted_proxies.len(), 1);
    }

    #[test]
    fn invalid_trusted_proxy_is_rejected() {
        let env = env_of(&[
            ("DISCORD_TOKEN", "tok"),
            ("DISCORD_CHANNEL_ID", "123"),
            ("ADMIN_API_ENABLED", "1"),
            ("ADMIN_BEARER_TOKEN", "9f8e2c4b1a7d6350-prod"),
            ("ADMIN_TRUSTED_PROXIES", "not-an-ip"),
        ]);
        let err = Settings::from_sources(args_of(&["-c", "/tmp/fleet.json"]), env).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidEnv {
                var: "ADMIN_TRUSTED_PROXIES",
                ..
            }
        ));
    }
}
