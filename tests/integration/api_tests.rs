//! HTTP API tests against real MBTiles files.

use axum::http::{header, StatusCode};

use mbtiles_server::RouterConfig;

use super::test_utils::*;

fn city_server() -> TestServer {
    let server = TestServer::new();
    write_mbtiles(
        &server.layer_path("city"),
        &[(3, 1, 2, JPEG_TILE), (0, 0, 0, PNG_TILE)],
    );
    server.scan();
    server
}

#[tokio::test]
async fn test_get_tile_success() {
    let server = city_server();

    let response = server.get("/city/3/1/2").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=3600"
    );
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    assert_eq!(body_bytes(response).await.as_ref(), JPEG_TILE);
}

#[tokio::test]
async fn test_get_tile_with_suffix() {
    let server = city_server();

    let response = server.get("/city/0/0/0.png").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    assert_eq!(body_bytes(response).await.as_ref(), PNG_TILE);
}

#[tokio::test]
async fn test_tile_not_found() {
    let server = city_server();

    let response = server.get("/city/3/1/3").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "tile_not_found");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_layer_not_found() {
    let server = city_server();

    let response = server.get("/roads/3/1/2").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "layer_not_found");
    assert!(json["message"].as_str().unwrap().contains("roads"));
}

#[tokio::test]
async fn test_invalid_layer_returns_server_error() {
    let server = city_server();
    std::fs::write(server.layer_path("broken"), vec![0x42u8; 4096]).unwrap();
    server.scan();

    // Still listed, but every request fails the same way
    assert!(server.registry.contains("broken"));
    for _ in 0..2 {
        let response = server.get("/broken/0/0/0").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_layer");
    }

    // A broken layer does not affect its neighbours
    let response = server.get("/city/3/1/2").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_non_integer_coordinate() {
    let server = city_server();

    for uri in ["/city/3/abc/2", "/city/z/1/2", "/city/3/1/2.5", "/city/3/1/"] {
        let response = server.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let json = body_json(response).await;
        assert_eq!(json["error"], "bad_request");
    }
}

#[tokio::test]
async fn test_wrong_segment_count() {
    let server = city_server();

    for uri in ["/city/3/1", "/city/3/1/2/4", "/city"] {
        let response = server.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_negative_coordinates_are_looked_up() {
    let server = city_server();

    let response = server.get("/city/3/-1/2").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "tile_not_found");
}

#[tokio::test]
async fn test_layers_endpoint() {
    let server = city_server();
    write_mbtiles(&server.layer_path("roads"), &[]);
    std::fs::write(server.dir.path().join("notes.txt"), b"ignored").unwrap();
    server.scan();

    let response = server.get("/layers").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["layers"], serde_json::json!(["city", "roads"]));
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::new();

    let response = server.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_viewer_lists_layers() {
    let server = city_server();

    let response = server.get("/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(html.contains("leaflet"));
    assert!(html.contains("city"));
}

#[tokio::test]
async fn test_gzip_vector_tile_headers() {
    let server = TestServer::new();
    let pbf: &[u8] = &[0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00];
    write_mbtiles(&server.layer_path("streets"), &[(14, 8190, 10000, pbf)]);
    server.scan();

    let response = server.get("/streets/14/8190/10000.pbf").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-protobuf"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_ENCODING).unwrap(),
        "gzip"
    );
    assert_eq!(body_bytes(response).await.as_ref(), pbf);
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let server = TestServer::with_config(
        RouterConfig::new()
            .with_cache_max_age(60)
            .with_tracing(false),
    );
    write_mbtiles(&server.layer_path("city"), &[(3, 1, 2, JPEG_TILE)]);
    server.scan();

    let response = server.get("/city/3/1/2").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=60"
    );
}

#[tokio::test]
async fn test_cors_header_present() {
    let server = city_server();

    let request = axum::http::Request::builder()
        .uri("/city/3/1/2")
        .header(header::ORIGIN, "https://maps.example.com")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(server.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}
