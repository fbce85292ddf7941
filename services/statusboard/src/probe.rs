//! Upstream status prober.
//!
//! One probe is one `GET http://{host}:{port}/info` with a 2 s deadline,
//! expecting `200 OK` and a JSON body of `{clients, maxclients, track}`.
//!
//! Probes never fail: an unreachable upstream, a timeout, a non-200 status
//! or an undecodable body all collapse into the offline sentinel
//! (`player_count = -1`, `map_label = "Offline"`, `players_text = "0/0"`).
//! The publish pipeline carries no special case for a down server.

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ServerEntry;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of probing one upstream. Ephemeral; rebuilt every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub name: String,
    pub category: String,
    pub map_label: String,
    pub players_text: String,
    /// Players online, or `-1` when the upstream is offline.
    pub player_count: i64,
    pub host: String,
    pub port: u16,
}

impl ProbeResult {
    pub fn offline(entry: &ServerEntry) -> Self {
        ProbeResult {
            name: entry.name.clone(),
            category: entry.category.clone(),
            map_label: "Offline".to_owned(),
            players_text: "0/0".to_owned(),
            player_count: -1,
            host: entry.resolved_host.clone(),
            port: entry.port,
        }
    }

    pub fn is_online(&self) -> bool {
        self.player_count >= 0
    }
}

#[derive(Debug, Deserialize)]
struct InfoPayload {
    clients: i64,
    maxclients: i64,
    track: String,
}

pub async fn probe(client: &reqwest::Client, entry: &ServerEntry) -> ProbeResult {
    match probe_inner(client, entry).await {
        Ok(result) => result,
        Err(reason) => {
            debug!(server = %entry.name, %reason, "probe failed; reporting offline");
            ProbeResult::offline(entry)
        }
    }
}

async fn probe_inner(client: &reqwest::Client, entry: &ServerEntry) -> Result<ProbeResult, String> {
    let url = format!("http://{}:{}/info", entry.resolved_host, entry.port);
    let response = client
        .get(&url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(format!("status {}", response.status()));
    }
    let info: InfoPayload = response.json().await.map_err(|e| e.to_string())?;
    Ok(ProbeResult {
        name: entry.name.clone(),
        category: entry.category.clone(),
        map_label: map_label(&info.track),
        players_text: format!("{}/{}", info.clients, info.maxclients),
        player_count: info.clients.max(0),
        host: entry.resolved_host.clone(),
        port: entry.port,
    })
}

/// Base filename of the track path; `"Unknown"` when there is nothing
/// usable to show.
fn map_label(track: &str) -> String {
    let base = track.rsplit(['/', '\\']).next().unwrap_or("");
    if base.trim().is_empty() {
        "Unknown".to_owned()
    } else {
        base.to_owned()
    }
}
