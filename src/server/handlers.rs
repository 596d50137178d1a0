//! HTTP request handlers for the MBTiles tile API.
//!
//! # Endpoints
//!
//! - `GET /{layer}/{z}/{x}/{y}` - Serve a tile
//! - `GET /layers` - List the served layers
//! - `GET /health` - Health check endpoint
//! - `GET /` - Map viewer

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::TileError;
use crate::layer::TileStore;
use crate::tile::{TileRequest, TileService};

use super::routes::DEFAULT_CACHE_MAX_AGE;
use super::viewer::generate_viewer_html;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
pub struct AppState<S: TileStore> {
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService<S>>,

    /// Cache-Control max-age for tile responses, in seconds
    pub cache_max_age: u32,
}

impl<S: TileStore> AppState<S> {
    pub fn new(tile_service: TileService<S>) -> Self {
        Self::with_cache_max_age(tile_service, DEFAULT_CACHE_MAX_AGE)
    }

    pub fn with_cache_max_age(tile_service: TileService<S>, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

impl<S: TileStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Raw path segments of a tile request: `/{layer}/{z}/{x}/{y}`.
///
/// Kept as strings so that malformed coordinates produce the API's own
/// `bad_request` error body.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub layer: String,
    pub z: String,
    pub x: String,
    /// Row, optionally with a suffix such as `.png`
    pub y: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_layer")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the layers list endpoint.
#[derive(Debug, Serialize)]
pub struct LayersResponse {
    /// Registered layer names, sorted
    pub layers: Vec<String>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// 5xx outcomes are logged at ERROR, 404s at DEBUG, other client errors at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            TileError::LayerNotFound { .. } => (StatusCode::NOT_FOUND, "layer_not_found"),
            TileError::TileNotFound { .. } => (StatusCode::NOT_FOUND, "tile_not_found"),
            TileError::InvalidLayer { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "invalid_layer"),
            TileError::Query { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "query_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /{layer}/{z}/{x}/{y}`
///
/// # Response
///
/// - `200 OK`: the stored tile bytes, `Content-Type` from the payload
/// - `400 Bad Request`: non-integer coordinate
/// - `404 Not Found`: unknown layer or no tile at these coordinates
/// - `500 Internal Server Error`: layer failed to load, or the query failed
pub async fn tile_handler<S: TileStore>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, TileError> {
    let request = TileRequest::parse(&params.layer, &params.z, &params.x, &params.y)?;

    let tile = state.tile_service.get_tile(request).await?;

    let mut response = (
        [
            (header::CONTENT_TYPE, tile.format.content_type().to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            ),
        ],
        tile.data,
    )
        .into_response();

    if let Some(encoding) = tile.format.content_encoding() {
        response
            .headers_mut()
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding));
    }

    Ok(response)
}

/// Handle layer list requests.
///
/// `GET /layers` returns `{ "layers": ["city", "roads"] }`.
pub async fn layers_handler<S: TileStore>(
    State(state): State<AppState<S>>,
) -> Json<LayersResponse> {
    Json(LayersResponse {
        layers: state.tile_service.layer_names(),
    })
}

/// Handle health check requests.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Serve the map viewer page.
pub async fn viewer_handler<S: TileStore>(State(state): State<AppState<S>>) -> Html<String> {
    Html(generate_viewer_html(&state.tile_service.layer_names()))
}

/// Reject any path that is not a known endpoint or a `/<layer>/<z>/<x>/<y>` tile.
pub async fn fallback_handler(uri: Uri) -> TileError {
    TileError::BadRequest {
        reason: format!("expected /<layer>/<z>/<x>/<y>, got {}", uri.path()),
    }
}

// =============================================================================
// Tests
// =============================================================================
