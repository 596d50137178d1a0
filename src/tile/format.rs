//! Tile payload detection.
//!
//! MBTiles stores tiles as opaque blobs; the HTTP response type is derived
//! from the payload's magic bytes rather than trusting the file metadata.

/// Detected tile payload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    /// Gzip-compressed vector tile (the usual MBTiles encoding for `pbf`)
    GzipPbf,
    Unknown,
}

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF";
const GIF_MAGIC: &[u8] = b"GIF8";
const GZIP_MAGIC: &[u8] = b"\x1F\x8B";

impl TileFormat {
    /// Classify a tile payload by its leading bytes.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(PNG_MAGIC) {
            TileFormat::Png
        } else if data.starts_with(JPEG_MAGIC) {
            TileFormat::Jpeg
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            TileFormat::Webp
        } else if data.starts_with(GIF_MAGIC) {
            TileFormat::Gif
        } else if data.starts_with(GZIP_MAGIC) {
            TileFormat::GzipPbf
        } else {
            TileFormat::Unknown
        }
    }

    /// Value for the `Content-Type` header.
    pub const fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Webp => "image/webp",
            TileFormat::Gif => "image/gif",
            TileFormat::GzipPbf => "application/x-protobuf",
            TileFormat::Unknown => "application/octet-stream",
        }
    }

    /// Value for the `Content-Encoding` header, if the payload is pre-compressed.
    pub const fn content_encoding(&self) -> Option<&'static str> {
        match self {
            TileFormat::GzipPbf => Some("gzip"),
            _ => None,
        }
    }
}
