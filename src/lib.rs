//! # MBTiles Server
//!
//! A tile server for a directory of MBTiles files.
//!
//! Each `.mbtiles` file in the watched directory is served as a layer named
//! after the file. The directory is polled continuously: new files are
//! loaded, changed files are swapped in, and deleted files are dropped, all
//! without interrupting requests that are already running against the old
//! version of a layer.
//!
//! ## Architecture
//!
//! - [`layer`] - Tile stores, reference-counted layers, the registry and the scanner
//! - [`tile`] - Tile request parsing and the lookup service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mbtiles_server::{create_router, LayerRegistry, LayerScanner, MbtilesStore, RouterConfig, TileService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(LayerRegistry::new(MbtilesStore::new()));
//!     let scanner = LayerScanner::new(Arc::clone(&registry), "/srv/tiles");
//!     scanner.scan_once().expect("tile directory is readable");
//!     let _scan_task = scanner.spawn();
//!
//!     let router = create_router(TileService::with_shared_registry(registry), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod layer;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, ServeConfig};
pub use error::{ScanError, StoreError, TileError};
pub use layer::{
    layer_name, Fingerprint, Layer, LayerGuard, LayerRegistry, LayerScanner, MbtilesConnection,
    MbtilesStore, PublishOutcome, ScanReport, TileStore, DEFAULT_EXTENSION, DEFAULT_POLL_INTERVAL,
    DEFAULT_READ_POOL_SIZE,
};
pub use server::{
    create_router, health_handler, layers_handler, tile_handler, viewer_handler, AppState,
    ErrorResponse, HealthResponse, LayersResponse, RouterConfig, TilePathParams,
};
pub use tile::{TileFormat, TileRequest, TileResponse, TileService};
