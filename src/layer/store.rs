//! Storage backends for layers.
//!
//! A [`TileStore`] knows how to open a file as a tile source, answer point
//! queries against it, and close it again. The registry never looks inside a
//! connection; it only decides when one may be closed.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use bytes::Bytes;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::warn;

use crate::error::StoreError;

/// Point query over the MBTiles `tiles` table (or view).
pub const TILE_QUERY: &str =
    "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3";

// =============================================================================
// TileStore Trait
// =============================================================================

/// Opens tile sources and runs point lookups against them.
///
/// Connections must tolerate concurrent read-only queries from many request
/// threads while they are open. `close` is called exactly once per successful
/// `open`.
pub trait TileStore: Send + Sync + 'static {
    /// An opened source.
    type Connection: Send + Sync + 'static;

    /// Open the file at `path` and prepare the tile query.
    fn open(&self, path: &Path) -> Result<Self::Connection, StoreError>;

    /// Fetch the tile at `(z, x, y)`, or `None` if no row matches.
    fn query(
        &self,
        conn: &Self::Connection,
        z: i64,
        x: i64,
        y: i64,
    ) -> Result<Option<Bytes>, StoreError>;

    /// Release the connection.
    fn close(&self, conn: Self::Connection) -> Result<(), StoreError>;
}

// =============================================================================
// MBTiles (SQLite) Store
// =============================================================================

/// Default number of read connections opened per layer.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// [`TileStore`] reading MBTiles files through SQLite.
///
/// Each opened layer gets a small pool of read-only connections so that
/// concurrent lookups on one layer do not queue behind a single handle.
#[derive(Debug, Clone, Copy)]
pub struct MbtilesStore {
    read_pool_size: usize,
}

impl Default for MbtilesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MbtilesStore {
    pub fn new() -> Self {
        Self {
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }

    /// Set the number of read connections per layer (at least one).
    pub fn with_read_pool_size(mut self, size: usize) -> Self {
        self.read_pool_size = size.max(1);
        self
    }

    pub fn read_pool_size(&self) -> usize {
        self.read_pool_size
    }

    /// Open one read-only connection with the tile statement cached.
    fn open_reader(path: &Path) -> Result<Connection, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|err| StoreError::Open(err.to_string()))?;

        // SQLite opens lazily; preparing the statement is what actually reads
        // the schema and rejects files that are not MBTiles databases.
        let prepared = conn
            .prepare_cached(TILE_QUERY)
            .map(|_| ())
            .map_err(|err| err.to_string());
        if let Err(reason) = prepared {
            close_reader(conn, path);
            return Err(StoreError::Prepare(reason));
        }

        Ok(conn)
    }
}

fn close_reader(conn: Connection, path: &Path) {
    if let Err((_, err)) = conn.close() {
        warn!("Error closing mbtiles file \"{}\": {}", path.display(), err);
    }
}

/// An open MBTiles database: a round-robin pool of read connections.
///
/// The tile statement lives in each connection's statement cache, so every
/// query reuses the statement prepared at open time.
pub struct MbtilesConnection {
    readers: Vec<Mutex<Connection>>,
    cursor: AtomicUsize,
}

impl MbtilesConnection {
    pub fn pool_size(&self) -> usize {
        self.readers.len()
    }

    /// Lock a reader, preferring an idle one starting from the round-robin slot.
    fn reader(&self) -> MutexGuard<'_, Connection> {
        let len = self.readers.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;

        for offset in 0..len {
            match self.readers[(start + offset) % len].try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(poisoned)) => return poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }
        }

        // Every reader is busy: wait on the round-robin slot
        self.readers[start]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl TileStore for MbtilesStore {
    type Connection = MbtilesConnection;

    fn open(&self, path: &Path) -> Result<Self::Connection, StoreError> {
        let mut readers = Vec::with_capacity(self.read_pool_size);
        for _ in 0..self.read_pool_size {
            match Self::open_reader(path) {
                Ok(conn) => readers.push(Mutex::new(conn)),
                Err(err) => {
                    for reader in readers {
                        let reader = reader.into_inner().unwrap_or_else(PoisonError::into_inner);
                        close_reader(reader, path);
                    }
                    return Err(err);
                }
            }
        }

        Ok(MbtilesConnection {
            readers,
            cursor: AtomicUsize::new(0),
        })
    }

    fn query(
        &self,
        conn: &Self::Connection,
        z: i64,
        x: i64,
        y: i64,
    ) -> Result<Option<Bytes>, StoreError> {
        let conn = conn.reader();
        let mut stmt = conn
            .prepare_cached(TILE_QUERY)
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let data: Option<Option<Vec<u8>>> = stmt
            .query_row(params![z, x, y], |row| row.get(0))
            .optional()
            .map_err(|err| StoreError::Query(err.to_string()))?;

        // A NULL tile_data column counts as a missing tile.
        Ok(data.flatten().map(Bytes::from))
    }

    fn close(&self, conn: Self::Connection) -> Result<(), StoreError> {
        let mut first_error = None;
        for reader in conn.readers {
            let reader = reader.into_inner().unwrap_or_else(PoisonError::into_inner);
            if let Err((_, err)) = reader.close() {
                first_error.get_or_insert_with(|| StoreError::Close(err.to_string()));
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
