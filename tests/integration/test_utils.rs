//! Shared fixtures for integration tests.
//!
//! Layers are real MBTiles files written with rusqlite into a temporary
//! directory, then picked up by a scanner exactly as in production.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use rusqlite::{params, Connection};
use tempfile::TempDir;
use tower::ServiceExt;

use mbtiles_server::{
    create_router, LayerRegistry, LayerScanner, MbtilesStore, RouterConfig, TileService,
};

/// Minimal JPEG-looking tile payload.
pub const JPEG_TILE: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Minimal PNG-looking tile payload.
pub const PNG_TILE: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Write an MBTiles database at `path` containing `tiles`.
pub fn write_mbtiles(path: &Path, tiles: &[(i64, i64, i64, &[u8])]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE metadata (name TEXT, value TEXT);
         CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);
         CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row);",
    )
    .unwrap();
    for (z, x, y, data) in tiles {
        conn.execute(
            "INSERT INTO tiles VALUES (?1, ?2, ?3, ?4)",
            params![z, x, y, data],
        )
        .unwrap();
    }
    conn.close().unwrap();
}

/// Replace the layer file at `path` atomically: write beside it, then rename.
///
/// Connections already open on the old file keep reading the old inode.
pub fn replace_mbtiles(path: &Path, tiles: &[(i64, i64, i64, &[u8])], modified: SystemTime) {
    let staging = path.with_extension("staging");
    write_mbtiles(&staging, tiles);
    set_modified(&staging, modified);
    std::fs::rename(&staging, path).unwrap();
}

/// Set the modification time of `path`.
pub fn set_modified(path: &Path, modified: SystemTime) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(modified).unwrap();
}

/// A fixed point in time plus `secs`.
pub fn time(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
}

/// A temporary layer directory with a registry, scanner and router over it.
pub struct TestServer {
    pub dir: TempDir,
    pub registry: Arc<LayerRegistry<MbtilesStore>>,
    pub scanner: LayerScanner<MbtilesStore>,
    pub router: Router,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::new().with_tracing(false))
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(LayerRegistry::new(MbtilesStore::new()));
        let scanner = LayerScanner::new(Arc::clone(&registry), dir.path());
        let router = create_router(
            TileService::with_shared_registry(Arc::clone(&registry)),
            config,
        );
        Self {
            dir,
            registry,
            scanner,
            router,
        }
    }

    /// Path of the layer file called `name`.
    pub fn layer_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{}.mbtiles", name))
    }

    /// Run one scan cycle, panicking if the directory is unreadable.
    pub fn scan(&self) {
        self.scanner.scan_once().unwrap();
    }

    /// Issue a GET for `uri` against the router.
    pub async fn get(&self, uri: &str) -> Response<Body> {
        get(&self.router, uri).await
    }
}

/// Issue a GET for `uri` against `router`.
pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

/// Collect a response body.
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
