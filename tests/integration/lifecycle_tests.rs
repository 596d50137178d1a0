//! Layer lifecycle tests: files appearing, changing and disappearing while
//! requests are being served.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use mbtiles_server::LayerScanner;

use super::test_utils::*;

const OLD_TILE: &[u8] = b"\x89PNG\r\n\x1a\nold";
const NEW_TILE: &[u8] = b"\x89PNG\r\n\x1a\nnew";

#[tokio::test]
async fn test_delete_and_restore_layer() {
    let server = TestServer::new();
    let path = server.layer_path("city");
    write_mbtiles(&path, &[(3, 1, 2, OLD_TILE)]);
    set_modified(&path, time(0));

    let report = server.scanner.scan_once().unwrap();
    assert_eq!(report.loaded, vec!["city"]);
    let response = server.get("/city/3/1/2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.as_ref(), OLD_TILE);

    // A request still in flight against the first version
    let old_layer = server.registry.layers().pop().unwrap();
    let in_flight = server.registry.acquire("city").unwrap();
    assert_eq!(old_layer.ref_count(), 2);

    std::fs::remove_file(&path).unwrap();
    let report = server.scanner.scan_once().unwrap();
    assert_eq!(report.removed, vec!["city"]);

    let response = server.get("/city/3/1/2").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "layer_not_found");

    // Retracted, but not closed while the request holds it
    assert!(old_layer.is_open());
    assert_eq!(old_layer.ref_count(), 1);
    assert_eq!(
        in_flight.lookup(3, 1, 2).unwrap().as_deref(),
        Some(OLD_TILE)
    );

    write_mbtiles(&path, &[(3, 1, 2, NEW_TILE)]);
    set_modified(&path, time(60));
    let report = server.scanner.scan_once().unwrap();
    assert_eq!(report.loaded, vec!["city"]);

    let response = server.get("/city/3/1/2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.as_ref(), NEW_TILE);

    drop(in_flight);
    assert!(!old_layer.is_open());
    assert_eq!(old_layer.ref_count(), 0);
}

#[tokio::test]
async fn test_update_swaps_layer_in_place() {
    let server = TestServer::new();
    let path = server.layer_path("city");
    write_mbtiles(&path, &[(0, 0, 0, OLD_TILE)]);
    set_modified(&path, time(0));
    server.scan();

    let in_flight = server.registry.acquire("city").unwrap();

    replace_mbtiles(&path, &[(0, 0, 0, NEW_TILE)], time(60));
    let report = server.scanner.scan_once().unwrap();
    assert_eq!(report.updated, vec!["city"]);
    assert!(report.loaded.is_empty());

    let response = server.get("/city/0/0/0").await;
    assert_eq!(body_bytes(response).await.as_ref(), NEW_TILE);

    // The earlier request keeps reading the version it started with
    assert_eq!(
        in_flight.lookup(0, 0, 0).unwrap().as_deref(),
        Some(OLD_TILE)
    );
    assert!(in_flight.layer().is_open());
}

#[cfg(unix)]
#[tokio::test]
async fn test_dangling_symlink_retracts_layer() {
    let server = TestServer::new();
    let path = server.layer_path("city");
    write_mbtiles(&path, &[(3, 1, 2, OLD_TILE)]);
    server.scan();
    let response = server.get("/city/3/1/2").await;
    assert_eq!(response.status(), StatusCode::OK);
    let old_layer = server.registry.layers().pop().unwrap();

    std::fs::remove_file(&path).unwrap();
    std::os::unix::fs::symlink(server.dir.path().join("gone.mbtiles.tmp"), &path).unwrap();
    let report = server.scanner.scan_once().unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.removed, vec!["city"]);

    let response = server.get("/city/3/1/2").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "layer_not_found");
    assert!(server.registry.names().is_empty());
    assert!(!old_layer.is_open());
}

#[test]
fn test_unchanged_files_are_not_reloaded() {
    let server = TestServer::new();
    let path = server.layer_path("city");
    write_mbtiles(&path, &[(0, 0, 0, OLD_TILE)]);
    set_modified(&path, time(0));
    server.scan();
    let first = server.registry.layers().pop().unwrap();

    for _ in 0..3 {
        let report = server.scanner.scan_once().unwrap();
        assert!(report.is_unchanged());
        assert_eq!(report.seen, 1);
    }
    let current = server.registry.layers().pop().unwrap();
    assert!(Arc::ptr_eq(&first, &current));

    // Only a fingerprint change triggers a reload
    set_modified(&path, time(1));
    let report = server.scanner.scan_once().unwrap();
    assert_eq!(report.updated, vec!["city"]);
    let reloaded = server.registry.layers().pop().unwrap();
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert!(!first.is_open());
}

#[tokio::test]
async fn test_invalid_layer_recovers_after_fix() {
    let server = TestServer::new();
    let path = server.layer_path("city");
    std::fs::write(&path, vec![0x42u8; 4096]).unwrap();
    set_modified(&path, time(0));

    let report = server.scanner.scan_once().unwrap();
    assert_eq!(report.invalid, vec!["city"]);
    let broken = server.registry.layers().pop().unwrap();
    assert!(!broken.is_valid());

    // Not retried while the file is unchanged
    let report = server.scanner.scan_once().unwrap();
    assert!(report.is_unchanged());
    assert!(Arc::ptr_eq(
        &broken,
        &server.registry.layers().pop().unwrap()
    ));
    let response = server.get("/city/0/0/0").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    replace_mbtiles(&path, &[(0, 0, 0, NEW_TILE)], time(60));
    let report = server.scanner.scan_once().unwrap();
    assert_eq!(report.loaded, vec!["city"]);
    assert!(report.invalid.is_empty());

    let response = server.get("/city/0/0/0").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.as_ref(), NEW_TILE);
}

#[test]
fn test_other_extensions_are_ignored() {
    let server = TestServer::new();
    write_mbtiles(&server.layer_path("city"), &[]);
    write_mbtiles(&server.dir.path().join("roads.sqlite"), &[]);
    write_mbtiles(&server.dir.path().join(".mbtiles"), &[]);
    std::fs::create_dir(server.dir.path().join("archive.mbtiles")).unwrap();

    let report = server.scanner.scan_once().unwrap();

    assert_eq!(report.seen, 1);
    assert_eq!(server.registry.names(), vec!["city"]);
}

#[test]
fn test_unreadable_root_is_reported() {
    let server = TestServer::new();
    let missing = server.dir.path().join("missing");
    let scanner = LayerScanner::new(Arc::clone(&server.registry), missing);

    assert!(scanner.scan_once().is_err());
    assert!(server.registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requests_succeed_during_swaps() {
    let server = TestServer::new();
    let path = server.layer_path("city");
    write_mbtiles(&path, &[(0, 0, 0, OLD_TILE)]);
    set_modified(&path, time(0));
    server.scan();

    let mut retired = vec![server.registry.layers().pop().unwrap()];

    let clients: Vec<_> = (0..4)
        .map(|_| {
            let router = server.router.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let response = get(&router, "/city/0/0/0").await;
                    assert_eq!(response.status(), StatusCode::OK);
                    let body = body_bytes(response).await;
                    assert!(body.as_ref() == OLD_TILE || body.as_ref() == NEW_TILE);
                }
            })
        })
        .collect();

    for round in 1..=20u64 {
        let tile = if round % 2 == 0 { OLD_TILE } else { NEW_TILE };
        replace_mbtiles(&path, &[(0, 0, 0, tile)], time(round));
        let report = server.scanner.scan_once().unwrap();
        assert_eq!(report.updated, vec!["city"]);
        retired.push(server.registry.layers().pop().unwrap());
        tokio::task::yield_now().await;
    }

    for client in clients {
        client.await.unwrap();
    }

    let live = retired.pop().unwrap();
    assert!(live.is_open());
    assert_eq!(live.ref_count(), 1);
    for layer in &retired {
        assert!(!layer.is_open());
        assert_eq!(layer.ref_count(), 0);
    }
}

#[tokio::test]
async fn test_background_scanner_picks_up_new_files() {
    let server = TestServer::new();
    let handle = LayerScanner::new(Arc::clone(&server.registry), server.dir.path())
        .with_interval(Duration::from_millis(20))
        .spawn();

    replace_mbtiles(&server.layer_path("city"), &[(0, 0, 0, NEW_TILE)], time(0));

    let mut status = StatusCode::NOT_FOUND;
    for _ in 0..100 {
        status = server.get("/city/0/0/0").await.status();
        if status == StatusCode::OK {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();

    assert_eq!(status, StatusCode::OK);
}
