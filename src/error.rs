use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the tile store backing a layer.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The file could not be opened as a database
    #[error("open failed: {0}")]
    Open(String),

    /// The tile query could not be prepared (missing `tiles` table, not a database, ...)
    #[error("prepare failed: {0}")]
    Prepare(String),

    /// Executing the point query failed
    #[error("query failed: {0}")]
    Query(String),

    /// Closing the connection failed
    #[error("close failed: {0}")]
    Close(String),
}

/// Errors that stop a directory scan from running at all.
///
/// Per-file failures never surface here; they are logged and either skipped
/// or published as invalid layers.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// The watched directory cannot be listed
    #[error("cannot read layer directory {}: {reason}", .path.display())]
    RootInaccessible { path: PathBuf, reason: String },
}

/// Outcome of a tile lookup that did not produce tile bytes.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The request path is not of the shape `/<layer>/<z>/<x>/<y>`
    #[error("Bad request: {reason}")]
    BadRequest { reason: String },

    /// No layer is registered under this name
    #[error("Layer not found: {layer}")]
    LayerNotFound { layer: String },

    /// The layer exists but its file failed to load
    #[error("Layer {layer} is invalid: {reason}")]
    InvalidLayer { layer: String, reason: String },

    /// The layer has no tile at these coordinates
    #[error("Tile not found: {layer} z={z} x={x} y={y}")]
    TileNotFound { layer: String, z: i64, x: i64, y: i64 },

    /// The point query failed while reading
    #[error("Error getting tile from layer {layer} z={z} x={x} y={y}: {message}")]
    Query {
        layer: String,
        z: i64,
        x: i64,
        y: i64,
        message: String,
    },
}

impl TileError {
    /// Whether this outcome should be reported as a server-side failure.
    pub fn is_server_error(&self) -> bool {
        matches!(self, TileError::InvalidLayer { .. } | TileError::Query { .. })
    }
}
