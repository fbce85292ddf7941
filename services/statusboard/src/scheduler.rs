//! Periodic poll/publish driver.
//!
//! Each cycle: ask the watcher to check for external edits (the reload
//! itself completes asynchronously inside the debounce window), read the
//! current snapshot, probe the fleet, publish. The first cycle runs
//! immediately; the delay between cycles is the *current* snapshot's
//! `update_interval`, re-read every tick so an interval change takes
//! effect at the next cycle without re-arming anything.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::fanout;
use crate::publish::{ChatApi, Publisher};
use crate::store::{ConfigStore, watcher::ConfigWatcher};

pub async fn run<C: ChatApi>(
    store: &Arc<ConfigStore>,
    watcher: &ConfigWatcher,
    probe_client: &reqwest::Client,
    publisher: &Publisher<C>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if let Err(e) = watcher.check() {
            warn!(error = %e, "config file check failed");
        }

        let snapshot = store.get();
        let started = Instant::now();
        // Dropping the aggregate future on shutdown aborts the in-flight
        // probe tasks with it.
        let results = tokio::select! {
            results = fanout::aggregate(probe_client, &snapshot) => results,
            _ = shutdown.changed() => break,
        };
        publisher.publish(&snapshot, &results).await;

        let online = results.iter().filter(|r| r.is_online()).count();
        info!(
            online,
            total = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "status cycle published"
        );

        let delay = Duration::from_secs(snapshot.update_interval);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    watcher.close();
    info!("scheduler stopped");
}
