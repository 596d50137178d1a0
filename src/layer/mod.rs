//! Layer lifecycle: loading, registration, hot-swapping and retirement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   publish / retract   ┌─────────────────────────┐
//! │  LayerScanner   │ ────────────────────► │      LayerRegistry      │
//! │ (polls the dir) │   (write lock)        │  name ──► Arc<Layer>    │
//! └─────────────────┘                       └────────────┬────────────┘
//!                                                        │ acquire (read lock)
//!                                                        ▼
//!                                           ┌─────────────────────────┐
//!                                           │  LayerGuard (per req.)  │
//!                                           │  lookup ─► TileStore    │
//!                                           └─────────────────────────┘
//! ```
//!
//! The registry lock covers only find-and-bump and swap-and-drop. Queries run
//! against a guarded layer with no registry lock held, so a layer can be
//! replaced while requests against the old file are still in flight; the old
//! connection closes when the last of them finishes.

mod handle;
mod registry;
mod scanner;
mod store;

pub use handle::{Fingerprint, Layer, LayerGuard};
pub use registry::{LayerRegistry, PublishOutcome};
pub use scanner::{layer_name, LayerScanner, ScanReport, DEFAULT_EXTENSION, DEFAULT_POLL_INTERVAL};
pub use store::{
    MbtilesConnection, MbtilesStore, TileStore, DEFAULT_READ_POOL_SIZE, TILE_QUERY,
};
