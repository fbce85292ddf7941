//! Debounced detection of external config-file edits.
//!
//! `check()` is cheap and non-blocking: it compares the file's current
//! mtime against the store's recorded one. A differing mtime arms a single
//! debounce timer; when the timer fires, the store re-reads the file after
//! double-checking the mtime (so the store's own writes never trigger a
//! reload). Editors typically write a file several times per save; the
//! debounce window coalesces those into one reload of the final content.
//!
//! A check observing a *fresh* mtime while a timer is pending resets the
//! timer; repeated checks of the same pending state leave it alone, so a
//! caller polling faster than the window cannot postpone the reload
//! forever.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ConfigStore, file_mtime};
use crate::config::ConfigError;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

pub struct ConfigWatcher {
    store: Arc<ConfigStore>,
    window: Duration,
    pending: Mutex<Option<PendingReload>>,
}

struct PendingReload {
    task: JoinHandle<()>,
    armed_for: SystemTime,
}

impl ConfigWatcher {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self::with_window(store, DEFAULT_DEBOUNCE)
    }

    /// Custom debounce window (tests shrink it).
    pub fn with_window(store: Arc<ConfigStore>, window: Duration) -> Self {
        ConfigWatcher {
            store,
            window,
            pending: Mutex::new(None),
        }
    }

    /// Compare mtimes and (re)arm the debounce timer if the file changed.
    /// Returns whether a reload is now pending. Must be called from within
    /// a tokio runtime.
    pub fn check(&self) -> Result<bool, ConfigError> {
        let disk_mtime = file_mtime(self.store.path())?;
        if self.store.recorded_mtime() == Some(disk_mtime) {
            return Ok(false);
        }

        let mut pending = self.pending.lock().expect("watcher lock poisoned");
        if let Some(p) = pending.as_ref() {
            if p.armed_for == disk_mtime && !p.task.is_finished() {
                // Already armed for exactly this file state.
                return Ok(true);
            }
        }
        if let Some(old) = pending.take() {
            old.task.abort();
        }

        let store = Arc::clone(&self.store);
        let window = self.window;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            match store.reload_if_stale().await {
                Ok(true) => {}
                Ok(false) => debug!("debounce fired but file already current"),
                Err(e) => {
                    warn!(error = %e, "external config change rejected; keeping previous snapshot");
                }
            }
        });
        *pending = Some(PendingReload {
            task,
            armed_for: disk_mtime,
        });
        Ok(true)
    }

    /// Abort any pending debounced reload. Safe to call more than once.
    pub fn close(&self) {
        if let Some(p) = self.pending.lock().expect("watcher lock poisoned").take() {
            p.task.abort();
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.close();
    }
}
