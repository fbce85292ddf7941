//! Admin-plane integration tests over a bound listener.

use serde_json::json;
use statusboard::http::{self, auth::AdminAuth, rate_limit::RateLimiter, state::AppState};
use statusboard::settings::AdminSettings;
use statusboard::store::ConfigStore;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const TOKEN: &str = "9f8e2c4b1a7d6350-prod";

fn base_config() -> serde_json::Value {
    json!({
        "server_ip": "10.0.0.1",
        "update_interval": 30,
        "category_order": ["Drift"],
        "category_emojis": {"Drift": "🟣"},
        "servers": [
            {"name": "S1", "port": 8081, "category": "Drift"},
            {"name": "S2", "port": 8082, "category": "Drift"}
        ]
    })
}

struct TestPlane {
    addr: SocketAddr,
    store: Arc<ConfigStore>,
    csrf_token: String,
    config_path: PathBuf,
    draining: Arc<AtomicBool>,
    // Kept alive for the duration of the test.
    _dir: tempfile::TempDir,
}

impl TestPlane {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn spawn_plane(limiter: RateLimiter) -> TestPlane {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, base_config().to_string()).expect("write fixture");
    let store = Arc::new(ConfigStore::open(&config_path).expect("open"));

    let auth = AdminAuth::new(TOKEN);
    let csrf_token = auth.csrf_token().to_owned();
    let state = AppState::new(store.clone(), Arc::new(auth), Arc::new(limiter), vec![]);
    let draining = state.draining.clone();

    let admin = AdminSettings {
        bind_addr: "127.0.0.1:0".to_owned(),
        bearer_token: TOKEN.to_owned(),
        cors_origins: vec!["https://admin.example".to_owned()],
        cors_allow_any: false,
        trusted_proxies: vec![],
        static_dir: None,
    };
    let cors = http::cors_layer(&admin).expect("cors layer");
    let router = http::build_router(state, None, cors);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve");
    });

    TestPlane {
        addr,
        store,
        csrf_token,
        config_path,
        draining,
        _dir: dir,
    }
}

fn generous_limiter() -> RateLimiter {
    RateLimiter::new(100, 6000)
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_bearer_token_is_401() {
    let plane = spawn_plane(generous_limiter()).await;
    let response = reqwest::get(plane.url("/api/v1/config"))
        .await
        .expect("request");
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["code"], "AUTH_FAILED");
}

#[tokio::test]
async fn wrong_bearer_token_is_401() {
    let plane = spawn_plane(generous_limiter()).await;
    let response = reqwest::Client::new()
        .get(plane.url("/api/v1/config"))
        .bearer_auth("not-the-token-at-all")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn health_endpoints_need_no_auth() {
    let plane = spawn_plane(generous_limiter()).await;
    let response = reqwest::get(plane.url("/healthz")).await.expect("request");
    assert_eq!(response.status(), 200);
    let response = reqwest::get(plane.url("/readyz")).await.expect("request");
    assert_eq!(response.status(), 200);
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_config_returns_current_snapshot() {
    let plane = spawn_plane(generous_limiter()).await;
    let body: serde_json::Value = reqwest::Client::new()
        .get(plane.url("/api/v1/config"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["server_ip"], "10.0.0.1");
    assert_eq!(body["servers"].as_array().expect("servers").len(), 2);
}

#[tokio::test]
async fn get_servers_returns_subset_only() {
    let plane = spawn_plane(generous_limiter()).await;
    let body: serde_json::Value = reqwest::Client::new()
        .get(plane.url("/api/v1/config/servers"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    let servers = body.as_array().expect("array");
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0]["name"], "S1");
}

#[tokio::test]
async fn csrf_endpoint_returns_the_process_token() {
    let plane = spawn_plane(generous_limiter()).await;
    let body: serde_json::Value = reqwest::Client::new()
        .get(plane.url("/api/v1/csrf"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["csrf_token"], plane.csrf_token.as_str());
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mutating_without_csrf_header_is_403() {
    let plane = spawn_plane(generous_limiter()).await;
    let response = reqwest::Client::new()
        .put(plane.url("/api/v1/config"))
        .bearer_auth(TOKEN)
        .json(&base_config())
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["code"], "CSRF_REQUIRED");
}

#[tokio::test]
async fn replace_updates_snapshot_and_disk() {
    let plane = spawn_plane(generous_limiter()).await;
    let mut candidate = base_config();
    candidate["server_ip"] = json!("10.0.0.9");

    let response = reqwest::Client::new()
        .put(plane.url("/api/v1/config"))
        .bearer_auth(TOKEN)
        .header("x-csrf-token", &plane.csrf_token)
        .json(&candidate)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);

    let snapshot = plane.store.get();
    assert_eq!(snapshot.server_ip, "10.0.0.9");
    assert!(
        snapshot
            .servers
            .iter()
            .all(|s| s.resolved_host == "10.0.0.9")
    );
    let on_disk = fs::read_to_string(&plane.config_path).expect("read");
    assert!(on_disk.contains("10.0.0.9"));
}

#[tokio::test]
async fn merge_applies_partial_update_by_name() {
    let plane = spawn_plane(generous_limiter()).await;
    let response = reqwest::Client::new()
        .patch(plane.url("/api/v1/config"))
        .bearer_auth(TOKEN)
        .header("x-csrf-token", &plane.csrf_token)
        .json(&json!({"servers": [{"name": "S2", "port": 8090}]}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);

    let snapshot = plane.store.get();
    assert_eq!(snapshot.servers[1].port, 8090);
    assert_eq!(snapshot.servers[1].category, "Drift");
    assert_eq!(snapshot.servers[0].port, 8081);
}

#[tokio::test]
async fn invalid_replace_is_400_and_preserves_state() {
    let plane = spawn_plane(generous_limiter()).await;
    let mut candidate = base_config();
    candidate["server_ip"] = json!("");

    let response = reqwest::Client::new()
        .put(plane.url("/api/v1/config"))
        .bearer_auth(TOKEN)
        .header("x-csrf-token", &plane.csrf_token)
        .json(&candidate)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["code"], "CONFIG_INVALID");
    assert_eq!(plane.store.get().server_ip, "10.0.0.1");
}

#[tokio::test]
async fn validate_only_neither_persists_nor_publishes() {
    let plane = spawn_plane(generous_limiter()).await;
    let disk_before = fs::read_to_string(&plane.config_path).expect("read");

    let mut candidate = base_config();
    candidate["server_ip"] = json!("10.0.0.42");
    let response = reqwest::Client::new()
        .post(plane.url("/api/v1/config/validate"))
        .bearer_auth(TOKEN)
        .header("x-csrf-token", &plane.csrf_token)
        .json(&candidate)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["valid"], true);

    assert_eq!(plane.store.get().server_ip, "10.0.0.1");
    assert_eq!(
        fs::read_to_string(&plane.config_path).expect("read"),
        disk_before
    );
}

#[tokio::test]
async fn oversized_body_is_rejected_with_413() {
    let plane = spawn_plane(generous_limiter()).await;
    // One field well past the 1 MiB request cap.
    let mut candidate = base_config();
    candidate["server_ip"] = json!("x".repeat(2 * 1024 * 1024));

    let response = reqwest::Client::new()
        .put(plane.url("/api/v1/config"))
        .bearer_auth(TOKEN)
        .header("x-csrf-token", &plane.csrf_token)
        .json(&candidate)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 413);
    // Nothing was applied.
    assert_eq!(plane.store.get().server_ip, "10.0.0.1");
}

// ---------------------------------------------------------------------------
// Shutdown drain
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_during_shutdown_drain_are_503() {
    let plane = spawn_plane(generous_limiter()).await;
    plane.draining.store(true, Ordering::Relaxed);

    let response = reqwest::Client::new()
        .get(plane.url("/api/v1/config"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["code"], "UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_beyond_the_burst_are_429() {
    // Two requests of burst, zero refill.
    let plane = spawn_plane(RateLimiter::new(2, 0)).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .get(plane.url("/api/v1/config"))
            .bearer_auth(TOKEN)
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), 200);
    }
    let response = client
        .get(plane.url("/api/v1/config"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 429);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["code"], "RATE_LIMITED");
}
