//! Tile Service: the request-facing lookup entry point.
//!
//! Every lookup walks the same short state machine:
//!
//! ```text
//!  parse path ──► acquire layer ──► query ──► Found
//!      │              │                 ├──► TileNotFound (no row)
//!      ▼              ├──► LayerNotFound└──► Query error
//!  BadRequest         └──► InvalidLayer
//! ```
//!
//! The layer reference taken in the second step is a [`LayerGuard`], released
//! when the lookup returns whichever way it ends.

use std::sync::Arc;

use bytes::Bytes;
use tracing::error;

use crate::error::TileError;
use crate::layer::{LayerGuard, LayerRegistry, TileStore};

use super::format::TileFormat;

/// Suffixes accepted after the row coordinate, e.g. `/city/3/1/2.png`.
const TILE_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".pbf", ".mvt"];

// =============================================================================
// Tile Request
// =============================================================================

/// A point lookup: one layer name and a (zoom, column, row) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Layer name (file name without extension)
    pub layer: String,

    /// Zoom level
    pub z: i64,

    /// Tile column
    pub x: i64,

    /// Tile row, as stored in the MBTiles file
    pub y: i64,
}

impl TileRequest {
    pub fn new(layer: impl Into<String>, z: i64, x: i64, y: i64) -> Self {
        Self {
            layer: layer.into(),
            z,
            x,
            y,
        }
    }

    /// Build a request from the raw path segments.
    ///
    /// `y` may carry one of the usual tile suffixes (`.png`, `.pbf`, ...).
    pub fn parse(layer: &str, z: &str, x: &str, y: &str) -> Result<Self, TileError> {
        if layer.is_empty() {
            return Err(TileError::BadRequest {
                reason: "empty layer name".to_string(),
            });
        }

        let y = TILE_SUFFIXES
            .iter()
            .find_map(|suffix| y.strip_suffix(suffix))
            .unwrap_or(y);

        Ok(Self {
            layer: layer.to_string(),
            z: parse_coordinate("z", z)?,
            x: parse_coordinate("x", x)?,
            y: parse_coordinate("y", y)?,
        })
    }

    /// Build a request from a path of the shape `/<layer>/<z>/<x>/<y>`.
    pub fn from_path(path: &str) -> Result<Self, TileError> {
        let fields: Vec<&str> = path.split('/').collect();
        match fields.as_slice() {
            ["", layer, z, x, y] => Self::parse(layer, z, x, y),
            _ => Err(TileError::BadRequest {
                reason: format!("expected /<layer>/<z>/<x>/<y>, got {}", path),
            }),
        }
    }
}

fn parse_coordinate(axis: &str, value: &str) -> Result<i64, TileError> {
    value.parse().map_err(|_| TileError::BadRequest {
        reason: format!("{} coordinate is not an integer: {:?}", axis, value),
    })
}

// =============================================================================
// Tile Response
// =============================================================================

/// A found tile.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Raw tile bytes as stored in the layer
    pub data: Bytes,

    /// Payload format sniffed from the bytes
    pub format: TileFormat,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Resolves tile requests against a [`LayerRegistry`].
///
/// # Example
///
/// ```ignore
/// use mbtiles_server::layer::{LayerRegistry, MbtilesStore};
/// use mbtiles_server::tile::{TileRequest, TileService};
///
/// let service = TileService::new(LayerRegistry::new(MbtilesStore::new()));
/// let response = service.get_tile(TileRequest::new("city", 3, 1, 2)).await?;
/// ```
pub struct TileService<S: TileStore> {
    registry: Arc<LayerRegistry<S>>,
}

impl<S: TileStore> TileService<S> {
    pub fn new(registry: LayerRegistry<S>) -> Self {
        Self::with_shared_registry(Arc::new(registry))
    }

    /// Create a service over a registry shared with a scanner.
    pub fn with_shared_registry(registry: Arc<LayerRegistry<S>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<LayerRegistry<S>> {
        &self.registry
    }

    /// Names of the layers currently served.
    pub fn layer_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Look up a tile on the calling thread.
    ///
    /// The query blocks on storage; async callers use [`get_tile`].
    ///
    /// [`get_tile`]: TileService::get_tile
    pub fn lookup(&self, request: &TileRequest) -> Result<TileResponse, TileError> {
        lookup_tile(&self.registry, request)
    }

    /// Look up a tile on the blocking thread pool.
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let registry = Arc::clone(&self.registry);
        let layer = request.layer.clone();
        let (z, x, y) = (request.z, request.x, request.y);

        tokio::task::spawn_blocking(move || lookup_tile(&registry, &request))
            .await
            .unwrap_or_else(|err| {
                Err(TileError::Query {
                    layer,
                    z,
                    x,
                    y,
                    message: format!("lookup task failed: {}", err),
                })
            })
    }
}

fn lookup_tile<S: TileStore>(
    registry: &LayerRegistry<S>,
    request: &TileRequest,
) -> Result<TileResponse, TileError> {
    let guard: LayerGuard<S> = registry.acquire(&request.layer)?;
    let TileRequest { layer, z, x, y } = request;

    match guard.lookup(*z, *x, *y) {
        Ok(Some(data)) => Ok(TileResponse {
            format: TileFormat::detect(&data),
            data,
        }),
        Ok(None) => Err(TileError::TileNotFound {
            layer: layer.clone(),
            z: *z,
            x: *x,
            y: *y,
        }),
        Err(err) => {
            error!(
                layer = %layer,
                z = *z,
                x = *x,
                y = *y,
                "Error getting tile: {}",
                err
            );
            Err(TileError::Query {
                layer: layer.clone(),
                z: *z,
                x: *x,
                y: *y,
                message: err.to_string(),
            })
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
