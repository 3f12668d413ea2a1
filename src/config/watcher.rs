//! Config hot reload.
//!
//! Editors often report a single save as several notify events. Events are
//! coalesced over a short quiet period, the file is reloaded and validated once,
//! and an update is sent only when the parsed config actually differs from the
//! last one sent.
//!
//! [`reconcile`] decides what a running server may take from a reloaded config.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::DispatchConfig;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// A reloaded config with its restart-only settings pinned to the running values.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub config: DispatchConfig,
    /// Settings that changed on disk but were kept, by config path.
    pub pinned: Vec<&'static str>,
}

impl Reconciled {
    /// Nothing the running server would observe has changed.
    pub fn is_noop(&self, running: &DispatchConfig) -> bool {
        self.config == *running
    }
}

/// Merge `update` into `running`, keeping every setting that only applies at startup.
///
/// Feature toggles and the backend timeout are taken from `update`. Data sources,
/// the data-source cache, the listener, the request timeout and observability are
/// wired once at startup and keep their running values.
pub fn reconcile(running: &DispatchConfig, mut update: DispatchConfig) -> Reconciled {
    let mut pinned = Vec::new();

    if update.datasources != running.datasources {
        pinned.push("datasources");
        update.datasources = running.datasources.clone();
    }
    if update.datasource_cache != running.datasource_cache {
        pinned.push("datasource_cache");
        update.datasource_cache = running.datasource_cache.clone();
    }
    if update.listener != running.listener {
        pinned.push("listener");
        update.listener = running.listener.clone();
    }
    if update.timeouts.request_secs != running.timeouts.request_secs {
        pinned.push("timeouts.request_secs");
        update.timeouts.request_secs = running.timeouts.request_secs;
    }
    if update.observability != running.observability {
        pinned.push("observability");
        update.observability = running.observability.clone();
    }

    Reconciled {
        config: update,
        pinned,
    }
}

/// Watches one config file and sends each distinct, valid reload.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    last: DispatchConfig,
    update_tx: mpsc::UnboundedSender<DispatchConfig>,
}

/// Keeps a started watcher alive. Dropping it stops reloads.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ConfigWatcher {
    /// Watch `path`, whose contents are currently `loaded`.
    pub fn new(path: &Path, loaded: DispatchConfig) -> (Self, mpsc::UnboundedReceiver<DispatchConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
            last: loaded,
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Quiet period that ends a burst of file events.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a tokio runtime.
    pub fn spawn(self) -> Result<WatchHandle, notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Config watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");

        let task = tokio::spawn(self.reload_loop(event_rx));
        Ok(WatchHandle {
            _watcher: watcher,
            task,
        })
    }

    async fn reload_loop(mut self, mut events: mpsc::UnboundedReceiver<()>) {
        while events.recv().await.is_some() {
            loop {
                match tokio::time::timeout(self.debounce, events.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            if let Some(update) = self.reload() {
                if self.update_tx.send(update).is_err() {
                    tracing::debug!("Config update receiver closed; watcher stopping");
                    return;
                }
            }
        }
    }

    /// Load the file once. Returns the config only if it is valid and new.
    fn reload(&mut self) -> Option<DispatchConfig> {
        let loaded = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Config reload rejected; keeping current configuration");
                return None;
            }
        };
        if loaded == self.last {
            tracing::debug!(path = ?self.path, "Config file touched but unchanged");
            return None;
        }

        tracing::info!(path = ?self.path, "Config file changed");
        self.last = loaded.clone();
        Some(loaded)
    }
}
