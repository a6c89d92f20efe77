//! Hot reload of the registry configuration file.
//!
//! Each file event re-reads and validates the file. A config is forwarded
//! only when it differs from the last one forwarded (or the one the registry
//! started with), so editor write bursts and touch-only saves are dropped.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::RegistryConfig;

/// Watches one configuration file on behalf of a running registry.
pub struct ConfigWatcher {
    path: PathBuf,
    current: RegistryConfig,
}

impl ConfigWatcher {
    /// `current` is the configuration the registry is running with.
    pub fn new(path: &Path, current: RegistryConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            current,
        }
    }

    /// Start watching. The returned watcher must be kept alive for updates
    /// to keep arriving on the receiver.
    pub fn start(
        self,
    ) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<RegistryConfig>), notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = self.path.clone();
        let mut last = self.current;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(config) = reload(&path, &mut last) {
                        let _ = tx.send(config);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok((watcher, rx))
    }
}

/// Re-read `path`. Returns the new config if it is valid and differs from `last`.
fn reload(path: &Path, last: &mut RegistryConfig) -> Option<RegistryConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Failed to read config, keeping current configuration");
            return None;
        }
    };
    // Truncate-then-write saves show up as an empty file first.
    if content.trim().is_empty() {
        return None;
    }

    let config = match parse_config(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Failed to reload config, keeping current configuration");
            return None;
        }
    };

    let changed = changed_sections(last, &config);
    if changed.is_empty() {
        tracing::debug!(path = ?path, "Config file touched without changes");
        return None;
    }

    tracing::info!(path = ?path, sections = ?changed, "Config change detected");
    *last = config.clone();
    Some(config)
}

/// Top-level sections that differ between two configs.
pub fn changed_sections(old: &RegistryConfig, new: &RegistryConfig) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.health_check != new.health_check {
        changed.push("health_check");
    }
    if old.circuit_breaker != new.circuit_breaker {
        changed.push("circuit_breaker");
    }
    if old.observability != new.observability {
        changed.push("observability");
    }
    if old.services != new.services {
        changed.push("services");
    }
    changed
}
