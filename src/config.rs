//! Configuration management for the MBTiles server.
//!
//! This module provides the command-line interface:
//! - Command-line arguments via clap
//! - Environment variables with `MBT_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `MBT_DATA_DIR` - Directory of `.mbtiles` files to serve (required)
//! - `MBT_HOST` - Server bind address (default: 0.0.0.0)
//! - `MBT_PORT` - Server port (default: 8080)
//! - `MBT_POLL_INTERVAL_MS` - Directory scan interval (default: 1000)
//! - `MBT_EXTENSION` - Layer file extension (default: mbtiles)
//! - `MBT_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `MBT_CORS_ORIGINS` - Allowed CORS origins, comma separated (default: any)
//! - `MBT_READ_POOL_SIZE` - SQLite read connections per layer (default: 4)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::layer::{DEFAULT_EXTENSION, DEFAULT_READ_POOL_SIZE};
use crate::server::DEFAULT_CACHE_MAX_AGE;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default scan interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Longest accepted scan interval (1 hour).
const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;

/// Upper bound on read connections per layer.
const MAX_READ_POOL_SIZE: usize = 64;

// =============================================================================
// CLI Arguments
// =============================================================================

/// MBTiles Server - serves a directory of MBTiles files over HTTP.
///
/// Layers are picked up, reloaded and dropped as files appear, change or
/// disappear in the watched directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "mbtiles-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles from a directory of MBTiles files
    Serve(ServeConfig),

    /// Load every layer once and report which ones are valid
    Check(CheckConfig),
}

/// Options for `serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Directory containing the layer files.
    #[arg(long, env = "MBT_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MBT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MBT_PORT")]
    pub port: u16,

    /// Milliseconds between two scans of the data directory.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS, env = "MBT_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Extension of layer files, without the dot.
    #[arg(long, default_value = DEFAULT_EXTENSION, env = "MBT_EXTENSION")]
    pub extension: String,

    /// HTTP Cache-Control max-age in seconds for tiles.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "MBT_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin if unset.
    #[arg(long, env = "MBT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Read-only SQLite connections opened per layer.
    #[arg(long, default_value_t = DEFAULT_READ_POOL_SIZE, env = "MBT_READ_POOL_SIZE")]
    pub read_pool_size: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("Data directory is required. Set --data-dir or MBT_DATA_DIR".to_string());
        }

        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }
        if self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err("poll_interval_ms must be at most 3600000 (1 hour)".to_string());
        }

        if self.read_pool_size == 0 || self.read_pool_size > MAX_READ_POOL_SIZE {
            return Err(format!(
                "read_pool_size must be between 1 and {}",
                MAX_READ_POOL_SIZE
            ));
        }

        validate_extension(&self.extension)
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Options for `check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Directory containing the layer files.
    #[arg(long, env = "MBT_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Extension of layer files, without the dot.
    #[arg(long, default_value = DEFAULT_EXTENSION, env = "MBT_EXTENSION")]
    pub extension: String,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_extension(&self.extension)
    }
}

fn validate_extension(extension: &str) -> Result<(), String> {
    if extension.is_empty() {
        return Err("extension must not be empty".to_string());
    }
    if extension.contains('.') || extension.contains('/') {
        return Err(format!(
            "extension must be a bare suffix like \"mbtiles\", got {:?}",
            extension
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
