//! Hot-swappable configuration store.
//!
//! The current configuration lives behind an [`arc_swap::ArcSwap`]: readers
//! load the snapshot pointer without locking and hold a plain
//! `Arc<FleetConfig>` for as long as they need it. Writers (admin replace or
//! merge, watcher-triggered reload) are serialized by a single mutex that
//! covers validate, backup-rotate, temp-write, rename, touch, and publish,
//! so readers observe either the old or the new snapshot, never anything in
//! between.
//!
//! # Recorded modification time
//! After every successful write or reload the store remembers the backing
//! file's mtime. The watcher compares against this value to decide whether
//! the file was edited externally; recording our own write's mtime is what
//! keeps the store from re-reading itself.
//!
//! # Failure semantics
//! Any validation or IO failure leaves the previously published snapshot
//! current. The file on disk is either the old content (failure before the
//! rename) or a fully-written new file (rename succeeded); see `persist`.

pub mod merge;
pub mod persist;
pub mod watcher;

use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{self, ConfigError, FleetConfig};

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<FleetConfig>,
    /// Serializes writers; never touched by readers.
    writer: Mutex<()>,
    recorded_mtime: std::sync::Mutex<Option<SystemTime>>,
}

impl ConfigStore {
    /// Load and validate the backing file. Used at startup; the caller
    /// aborts the process on error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| {
            ConfigError::Io(format!("reading config file '{}': {}", path.display(), e))
        })?;
        let cfg = config::parse_and_validate(&text)?;
        let mtime = file_mtime(&path).ok();
        Ok(ConfigStore {
            path,
            current: ArcSwap::from_pointee(cfg),
            writer: Mutex::new(()),
            recorded_mtime: std::sync::Mutex::new(mtime),
        })
    }

    /// Current snapshot. Lock-free; the returned `Arc` stays valid across
    /// any number of concurrent replacements.
    pub fn get(&self) -> Arc<FleetConfig> {
        self.current.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recorded_mtime(&self) -> Option<SystemTime> {
        *self.recorded_mtime.lock().expect("mtime lock poisoned")
    }

    /// Validate `candidate`, persist it atomically, and publish it.
    pub async fn replace(&self, candidate: serde_json::Value) -> Result<(), ConfigError> {
        let _writer = self.writer.lock().await;
        let cfg = config::validate_value(&candidate)?;
        self.persist_and_publish(cfg)
    }

    /// Deep-merge `partial` over the current snapshot, then validate,
    /// persist, and publish the result. `servers` entries are merged by
    /// name; see [`merge`].
    pub async fn merge(&self, partial: serde_json::Value) -> Result<(), ConfigError> {
        let _writer = self.writer.lock().await;
        let mut base = serde_json::to_value(self.get().as_ref())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        merge::deep_merge(&mut base, &partial)?;
        let cfg = config::validate_value(&base)?;
        self.persist_and_publish(cfg)
    }

    /// Re-read the backing file unconditionally and publish it if valid.
    pub async fn reload_from_disk(&self) -> Result<(), ConfigError> {
        let _writer = self.writer.lock().await;
        self.reload_locked()
    }

    /// Debounce-timer entry point: re-read only if the file's mtime differs
    /// from the recorded one. Returns whether a reload happened. The
    /// double-check covers the store's own `replace`/`merge` writes landing
    /// between the watcher's observation and the timer firing.
    pub async fn reload_if_stale(&self) -> Result<bool, ConfigError> {
        let _writer = self.writer.lock().await;
        let disk_mtime = file_mtime(&self.path)?;
        if self.recorded_mtime() == Some(disk_mtime) {
            return Ok(false);
        }
        self.reload_locked()?;
        Ok(true)
    }

    fn reload_locked(&self) -> Result<(), ConfigError> {
        let disk_mtime = file_mtime(&self.path)?;
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            ConfigError::Io(format!("reading config file '{}': {}", self.path.display(), e))
        })?;
        match config::parse_and_validate(&text) {
            Ok(cfg) => {
                self.current.store(Arc::new(cfg));
                self.record_mtime(disk_mtime);
                info!(path = %self.path.display(), "configuration reloaded");
                Ok(())
            }
            Err(e) => {
                // Remember the rejected file state so the watcher retries on
                // the next mtime change instead of every check.
                self.record_mtime(disk_mtime);
                Err(e)
            }
        }
    }

    fn persist_and_publish(&self, cfg: FleetConfig) -> Result<(), ConfigError> {
        let mut bytes =
            serde_json::to_vec_pretty(&cfg).map_err(|e| ConfigError::Parse(e.to_string()))?;
        bytes.push(b'\n');
        let mtime = persist::write_atomic(&self.path, &bytes).map_err(|e| {
            ConfigError::Io(format!("writing config file '{}': {}", self.path.display(), e))
        })?;
        // Publish only after the file is durably in place.
        self.current.store(Arc::new(cfg));
        self.record_mtime(mtime);
        Ok(())
    }

    fn record_mtime(&self, mtime: SystemTime) {
        *self.recorded_mtime.lock().expect("mtime lock poisoned") = Some(mtime);
    }
}

pub(crate) fn file_mtime(path: &Path) -> Result<SystemTime, ConfigError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| ConfigError::Io(format!("stat '{}': {}", path.display(), e)))
}
