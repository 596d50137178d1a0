//! MBTiles Server - serves a directory of MBTiles files over HTTP.
//!
//! This binary wires the registry, the directory scanner and the HTTP router
//! together.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mbtiles_server::{
    config::{CheckConfig, Cli, Command, ServeConfig},
    layer::{LayerRegistry, LayerScanner, MbtilesStore},
    server::{create_router, RouterConfig},
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("MBTiles Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Data directory: {}", config.data_dir.display());
    info!("  Layer extension: .{}", config.extension);
    info!("  Poll interval: {}ms", config.poll_interval_ms);
    info!("  Cache max-age: {}s", config.cache_max_age);
    info!("  Read connections per layer: {}", config.read_pool_size);

    let store = MbtilesStore::new().with_read_pool_size(config.read_pool_size);
    let registry = Arc::new(LayerRegistry::new(store));
    let scanner = LayerScanner::new(Arc::clone(&registry), &config.data_dir)
        .with_extension(config.extension.clone())
        .with_interval(config.poll_interval());

    // The first scan opens every layer; keep it off the async workers
    let initial = tokio::task::spawn_blocking(move || {
        let report = scanner.scan_once();
        (scanner, report)
    })
    .await;
    let (scanner, report) = match initial {
        Ok(scanned) => scanned,
        Err(e) => {
            error!("Initial layer scan failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Nothing to serve if the directory cannot be read at all
    match report {
        Ok(report) => {
            info!(
                "  Found {} layer(s), {} invalid",
                report.seen,
                report.invalid.len()
            );
        }
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    let scan_task = scanner.spawn();

    let router_config = build_router_config(&config);
    let router = create_router(
        TileService::with_shared_registry(Arc::clone(&registry)),
        router_config,
    );

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            scan_task.abort();
            return ExitCode::FAILURE;
        }
    };

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/layers", addr);
    info!("    curl http://{}/<layer>/<z>/<x>/<y>", addr);
    info!("    open http://{}/", addr);
    info!("");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scan_task.abort();
    let released = registry.clear();
    info!("Released {} layer(s)", released);

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mbtiles_server=debug,tower_http=debug"
    } else {
        "mbtiles_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

/// Resolve when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("MBTiles Server Layer Check");
    println!("══════════════════════════");
    println!();

    if let Err(e) = config.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let registry = Arc::new(LayerRegistry::new(MbtilesStore::new()));
    let scanner = LayerScanner::new(Arc::clone(&registry), &config.data_dir)
        .with_extension(config.extension.clone());

    let report = match scanner.scan_once() {
        Ok(report) => {
            println!("✓ Directory: {}", config.data_dir.display());
            report
        }
        Err(e) => {
            println!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!();

    let layers = registry.layers();
    if layers.is_empty() {
        println!("  (no .{} files found)", config.extension);
    }
    for layer in &layers {
        match layer.load_error() {
            None => println!("  ✓ {}  ({} bytes)", layer.name(), layer.fingerprint().size),
            Some(e) => println!("  ✗ {}  {}", layer.name(), e),
        }
    }
    if report.skipped > 0 {
        println!();
        println!("  {} directory entries could not be inspected", report.skipped);
    }

    drop(layers);
    registry.clear();

    println!();
    println!("══════════════════════════");
    if report.invalid.is_empty() {
        println!("✓ {} layer(s) OK", report.seen);
        ExitCode::SUCCESS
    } else {
        println!("✗ {} of {} layer(s) invalid", report.invalid.len(), report.seen);
        ExitCode::FAILURE
    }
}
