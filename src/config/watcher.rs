//! Configuration file watcher for hot reload.
//!
//! # Design Decisions
//! - The parent directory is watched so editors that replace the file
//!   (write to temp, rename) still trigger a reload
//! - Only valid configs are forwarded; an invalid file keeps the running config

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Monitors the configuration file and sends reloaded configs.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if (event.kind.is_modify() || event.kind.is_create()) && touches(&event, &path) {
                        reload(&path, &tx);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

/// Load the file and forward it when valid. Returns whether it was sent.
pub(crate) fn reload(path: &Path, tx: &mpsc::UnboundedSender<ProxyConfig>) -> bool {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "Config file changed, reloading");
            tx.send(config).is_ok()
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to reload config, keeping current");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind};

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("llm-pool-proxy-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reload_forwards_valid_config() {
        let path = temp_file("valid.toml", "[pool]\nrefresh_interval_secs = 42\n");
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(reload(&path, &tx));
        assert_eq!(rx.try_recv().unwrap().pool.refresh_interval_secs, 42);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_reload_keeps_current_on_invalid_config() {
        let path = temp_file("invalid.toml", "[retries]\nmax_retries = 0\n");
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!reload(&path, &tx));
        assert!(rx.try_recv().is_err());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_event_filter_matches_file_name() {
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/etc/proxy/proxy.toml"));
        assert!(touches(&event, Path::new("/etc/proxy/proxy.toml")));
        assert!(!touches(&event, Path::new("/etc/proxy/other.toml")));
    }
}
