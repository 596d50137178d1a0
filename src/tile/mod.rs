//! Tile lookup layer.
//!
//! Sits between the HTTP handlers and the layer registry:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │ TileRequest
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │   acquire ─► query ─► release (guard)   │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             LayerRegistry               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Tile bytes are served exactly as stored; nothing is re-encoded or cached
//! in memory.

mod format;
mod service;

pub use format::TileFormat;
pub use service::{TileRequest, TileResponse, TileService};
