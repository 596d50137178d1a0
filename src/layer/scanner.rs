//! Directory scanner that keeps the registry in step with the filesystem.
//!
//! Each cycle lists the watched directory, reloads every layer file whose
//! (modification time, size) fingerprint differs from the registered one, and
//! retracts names whose file disappeared. Change detection is plain polling,
//! which also works on network filesystems without change notification.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::error::ScanError;

use super::handle::Fingerprint;
use super::registry::{LayerRegistry, PublishOutcome};
use super::store::TileStore;

/// File extension of layer files, without the dot.
pub const DEFAULT_EXTENSION: &str = "mbtiles";

/// Time between two scan cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Derive the layer name for `path`: its file name minus `.{extension}`.
///
/// Returns `None` for files with another extension, an empty stem, or a
/// non UTF-8 name.
pub fn layer_name(path: &Path, extension: &str) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_string())
}

// =============================================================================
// ScanReport
// =============================================================================

/// What one scan cycle changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Layer files found in the directory
    pub seen: usize,
    /// Names published for the first time (or replacing an invalid layer)
    pub loaded: Vec<String>,
    /// Names whose valid layer was replaced
    pub updated: Vec<String>,
    /// Names published as invalid because their file failed to load
    pub invalid: Vec<String>,
    /// Names retracted because their file is gone
    pub removed: Vec<String>,
    /// Entries skipped this cycle because they could not be inspected
    pub skipped: usize,
}

impl ScanReport {
    /// Whether the cycle left the registry untouched.
    pub fn is_unchanged(&self) -> bool {
        self.loaded.is_empty()
            && self.updated.is_empty()
            && self.invalid.is_empty()
            && self.removed.is_empty()
    }
}

// =============================================================================
// LayerScanner
// =============================================================================

/// Polls a directory and publishes its layer files into a [`LayerRegistry`].
pub struct LayerScanner<S: TileStore> {
    registry: Arc<LayerRegistry<S>>,
    root: PathBuf,
    extension: String,
    interval: Duration,
}

impl<S: TileStore> LayerScanner<S> {
    /// Create a scanner for `root` with the default extension and interval.
    pub fn new(registry: Arc<LayerRegistry<S>>, root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            root: root.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the layer file extension (without the dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the time between scan cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn registry(&self) -> &Arc<LayerRegistry<S>> {
        &self.registry
    }

    /// Run one reconciliation cycle.
    ///
    /// Fails only when the directory itself cannot be listed; per-file
    /// problems are logged and reflected in the report.
    pub fn scan_once(&self) -> Result<ScanReport, ScanError> {
        let entries = fs::read_dir(&self.root).map_err(|err| ScanError::RootInaccessible {
            path: self.root.clone(),
            reason: err.to_string(),
        })?;

        let mut report = ScanReport::default();
        let mut candidates = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if let Some(name) = layer_name(&path, &self.extension) {
                        candidates.push((name, path));
                    }
                }
                Err(err) => {
                    debug!("Skipping unreadable directory entry: {}", err);
                    report.skipped += 1;
                }
            }
        }
        candidates.sort();

        let mut seen = HashSet::new();
        for (name, path) in candidates {
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    // Listed but not inspectable (dangling symlink, permission
                    // denied): not observed, so a registered layer is retracted.
                    debug!("Skipping \"{}\": {}", path.display(), err);
                    report.skipped += 1;
                    continue;
                }
            };
            if metadata.is_dir() {
                continue;
            }
            let fingerprint = match Fingerprint::from_metadata(&metadata) {
                Ok(fingerprint) => fingerprint,
                Err(err) => {
                    debug!("Skipping \"{}\": {}", path.display(), err);
                    report.skipped += 1;
                    continue;
                }
            };

            report.seen += 1;
            seen.insert(name.clone());

            if self.registry.fingerprint(&name) == Some(fingerprint) {
                continue;
            }

            let layer = self.registry.load(&name, &path, fingerprint);
            let valid = layer.is_valid();
            let outcome = self.registry.publish(layer);

            if !valid {
                report.invalid.push(name);
            } else if outcome == PublishOutcome::Updated {
                report.updated.push(name);
            } else {
                report.loaded.push(name);
            }
        }

        for name in self.registry.names() {
            if !seen.contains(&name) && self.registry.retract(&name) {
                report.removed.push(name);
            }
        }

        Ok(report)
    }

    /// Scan forever, one cycle per interval, until the task is aborted.
    ///
    /// The first cycle runs one interval after the call; run [`scan_once`]
    /// beforehand for an initial load.
    ///
    /// [`scan_once`]: LayerScanner::scan_once
    pub async fn run(self) {
        let scanner = Arc::new(self);
        let mut ticker = interval_at(Instant::now() + scanner.interval, scanner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let cycle = Arc::clone(&scanner);
            match tokio::task::spawn_blocking(move || cycle.scan_once()).await {
                Ok(Ok(report)) => {
                    if !report.is_unchanged() {
                        debug!(
                            loaded = report.loaded.len(),
                            updated = report.updated.len(),
                            invalid = report.invalid.len(),
                            removed = report.removed.len(),
                            "Layer scan applied changes"
                        );
                    }
                }
                Ok(Err(err)) => warn!("Layer scan skipped: {}", err),
                Err(err) => error!("Layer scan task failed: {}", err),
            }
        }
    }

    /// Spawn [`run`](LayerScanner::run) on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

// =============================================================================
// Tests
// =============================================================================
