//! HTTP server layer for the MBTiles server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │              GET /{layer}/{z}/{x}/{y}                           │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │   viewer    │  │        routes           │  │
//! │  │ (requests)  │  │ (map page)  │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;
pub mod viewer;

pub use handlers::{
    fallback_handler, health_handler, layers_handler, tile_handler, viewer_handler, AppState,
    ErrorResponse, HealthResponse, LayersResponse, TilePathParams,
};
pub use routes::{create_router, RouterConfig, DEFAULT_CACHE_MAX_AGE};
