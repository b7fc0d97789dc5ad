//! Plugin directory watching
//!
//! Loads plugins dropped into a watched directory.

use crate::control::Control;
use crate::error::{ControlError, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Extensions of files that sit next to plugins but are not plugins
const IGNORED_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "md", "txt", "log", "sig", "asc", "tmp", "swp",
];

/// Watches a directory and loads every plugin file created in it
#[derive(Debug)]
pub struct AutoloadWatcher {
    control: Arc<Control>,
    plugin_dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    rx: Option<mpsc::UnboundedReceiver<notify::Result<Event>>>,
    debounce_duration: Duration,
}

impl AutoloadWatcher {
    /// Create a watcher for `plugin_dir`
    pub fn new(control: Arc<Control>, plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            control,
            plugin_dir: plugin_dir.into(),
            watcher: None,
            rx: None,
            debounce_duration: Duration::from_secs(1),
        }
    }

    /// Ignore repeated events for the same file within `duration`
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce_duration = duration;
        self
    }

    /// Directory being watched
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Start watching the directory
    pub fn start(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.rx = Some(rx);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| ControlError::watcher(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(&self.plugin_dir, RecursiveMode::NonRecursive)
            .map_err(|e| ControlError::watcher(format!("Failed to watch directory: {e}")))?;

        self.watcher = Some(watcher);

        info!(plugin_dir = %self.plugin_dir.display(), "Autoload watcher started");
        Ok(())
    }

    /// Stop watching
    pub fn stop(&mut self) {
        self.watcher = None;
        self.rx = None;
        info!(plugin_dir = %self.plugin_dir.display(), "Autoload watcher stopped");
    }

    /// Spawn the event loop; it ends when the watcher is stopped or dropped
    pub fn run(&mut self) -> Result<JoinHandle<()>> {
        let mut rx = self
            .rx
            .take()
            .ok_or_else(|| ControlError::invalid_state("Autoload watcher not started"))?;

        let control = Arc::clone(&self.control);
        let debounce = self.debounce_duration;

        Ok(tokio::spawn(async move {
            let mut debouncer = Debouncer::new(debounce);

            while let Some(res) = rx.recv().await {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "File watcher error");
                        continue;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_)) {
                    continue;
                }

                for path in event.paths.into_iter().filter(|p| is_plugin_candidate(p)) {
                    if !debouncer.admit(&path, Instant::now()) {
                        continue;
                    }

                    debug!(path = %path.display(), "Plugin file created");
                    if let Err(e) = control.load(&path).await {
                        error!(path = %path.display(), error = %e, "Failed to autoload plugin");
                    }
                }
            }
        }))
    }
}

/// Drops repeated events for a path within a time window
///
/// Only paths seen inside the current window are remembered.
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Whether an event for `path` at `now` should be handled
    fn admit(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        self.seen
            .retain(|_, last| now.saturating_duration_since(*last) < window);

        if self.seen.contains_key(path) {
            return false;
        }
        self.seen.insert(path.to_path_buf(), now);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }
}

/// Whether a path may be a plugin binary
///
/// Hidden files and known companion files (configs, docs, signatures,
/// editor swap files) are skipped.
pub fn is_plugin_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') || name.ends_with('~') {
        return false;
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => !IGNORED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}
