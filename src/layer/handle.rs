//! Layer handles and their reference-counted lifecycle.
//!
//! A [`Layer`] owns one opened tile source. Its reference count starts at 1,
//! which is the registry's own retaining reference; every in-flight request
//! adds one more through a [`LayerGuard`]. The connection is closed by
//! whichever `release` brings the count to zero, and by nothing else.
//!
//! ```text
//!   load ──► refs=1 (registry)
//!             │  acquire/release (requests, under registry read lock)
//!             ▼
//!   publish/retract drops registry ref ──► ... last guard dropped ──► close
//! ```

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{error, info, warn};

use crate::error::StoreError;

use super::store::TileStore;

// =============================================================================
// Fingerprint
// =============================================================================

/// Cheap change detector for a layer file: modification time plus size.
///
/// Not a content hash. A rewrite that preserves both goes unnoticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: SystemTime,
    pub size: u64,
}

impl Fingerprint {
    pub fn new(modified: SystemTime, size: u64) -> Self {
        Self { modified, size }
    }

    /// Build a fingerprint from file metadata.
    pub fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        Ok(Self {
            modified: metadata.modified()?,
            size: metadata.len(),
        })
    }
}

// =============================================================================
// Layer
// =============================================================================

/// One loaded layer file.
///
/// A layer whose load failed is still a `Layer`: it carries the load error,
/// grants no request references and answers nothing, so lookups against its
/// name fail deterministically instead of falling through to an older file.
pub struct Layer<S: TileStore> {
    name: String,
    path: PathBuf,
    fingerprint: Fingerprint,
    store: Arc<S>,
    /// `None` when the load failed or after disposal
    conn: RwLock<Option<S::Connection>>,
    load_error: Option<StoreError>,
    refs: AtomicUsize,
}

impl<S: TileStore> Layer<S> {
    /// Open `path` through `store`.
    ///
    /// Never fails: a failed open produces an invalid layer holding the error.
    pub fn load(store: Arc<S>, name: &str, path: &Path, fingerprint: Fingerprint) -> Self {
        let (conn, load_error) = match store.open(path) {
            Ok(conn) => (Some(conn), None),
            Err(err) => {
                error!("Error opening mbtiles file \"{}\": {}", path.display(), err);
                (None, Some(err))
            }
        };

        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            fingerprint,
            store,
            conn: RwLock::new(conn),
            load_error,
            refs: AtomicUsize::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Whether the underlying source opened successfully.
    pub fn is_valid(&self) -> bool {
        self.load_error.is_none()
    }

    /// The error that made this layer invalid, if any.
    pub fn load_error(&self) -> Option<&StoreError> {
        self.load_error.as_ref()
    }

    /// Current reference count, the registry's retaining reference included.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.conn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Add a reference.
    ///
    /// Callers hold the registry read lock, so the registry's own reference
    /// keeps the count above zero for the whole call.
    pub(crate) fn acquire(&self) {
        let previous = self.refs.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "acquire on a drained layer");
    }

    /// Drop a reference; the release that reaches zero closes the connection.
    pub(crate) fn release(&self) {
        match self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => self.dispose(),
            Ok(_) => {}
            Err(_) => warn!("Layer \"{}\" released more times than acquired", self.name),
        }
    }

    fn dispose(&self) {
        let conn = self
            .conn
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(conn) = conn {
            match self.store.close(conn) {
                Ok(()) => info!("Layer \"{}\" disposed", self.name),
                Err(err) => warn!("Layer \"{}\" disposed with error: {}", self.name, err),
            }
        }
    }

    /// Run the point query.
    ///
    /// Only reachable through a [`LayerGuard`], which keeps the connection open.
    fn lookup(&self, z: i64, x: i64, y: i64) -> Result<Option<Bytes>, StoreError> {
        let conn = self.conn.read().unwrap_or_else(PoisonError::into_inner);
        match conn.as_ref() {
            Some(conn) => self.store.query(conn, z, x, y),
            None => Err(StoreError::Query(format!("layer \"{}\" is closed", self.name))),
        }
    }
}

impl<S: TileStore> std::fmt::Debug for Layer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("fingerprint", &self.fingerprint)
            .field("valid", &self.is_valid())
            .field("refs", &self.ref_count())
            .finish()
    }
}

// =============================================================================
// LayerGuard
// =============================================================================

/// A request's reference to a layer.
///
/// Dropping the guard releases the reference, so every exit path of a lookup
/// (success, missing tile, query error, task abandonment) gives it back.
pub struct LayerGuard<S: TileStore> {
    layer: Arc<Layer<S>>,
}

impl<S: TileStore> LayerGuard<S> {
    /// Take a new reference on `layer`. Requires the registry read lock.
    pub(crate) fn acquire(layer: &Arc<Layer<S>>) -> Self {
        layer.acquire();
        Self {
            layer: Arc::clone(layer),
        }
    }

    pub fn layer(&self) -> &Layer<S> {
        &self.layer
    }

    /// Fetch the tile at `(z, x, y)`; `Ok(None)` when the layer has no such tile.
    pub fn lookup(&self, z: i64, x: i64, y: i64) -> Result<Option<Bytes>, StoreError> {
        self.layer.lookup(z, x, y)
    }
}

impl<S: TileStore> Drop for LayerGuard<S> {
    fn drop(&mut self) {
        self.layer.release();
    }
}

// =============================================================================
// Tests
// =============================================================================
