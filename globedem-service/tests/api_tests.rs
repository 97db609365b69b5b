//! Integration tests for the HTTP API.

use axum::http::StatusCode;
use axum_test::TestServer;
use globedem::{DatasetLayout, DatasetReader, TileShape};
use globedem_service::{app, AppState};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn tile_shape() -> TileShape {
    TileShape::new(8, 8).unwrap()
}

fn sample_value(slot: usize, row: usize, col: usize) -> u16 {
    (slot * 100 + row * 10 + col) as u16
}

/// Write a dataset holding `codes` of the global layout at 8x8 samples.
fn create_dataset(codes: &[&str]) -> (NamedTempFile, DatasetReader) {
    let layout = DatasetLayout::viewfinder_15().with_shape(tile_shape());
    let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();

    let mut file = NamedTempFile::new().unwrap();
    for code in &codes {
        let slot = layout.slot_of(code).unwrap();
        for row in 0..tile_shape().height() {
            for col in 0..tile_shape().width() {
                file.write_all(&sample_value(slot, row, col).to_be_bytes())
                    .unwrap();
            }
        }
    }
    file.flush().unwrap();

    let reader = DatasetReader::open_with_chunks(file.path(), layout, &codes).unwrap();
    (file, reader)
}

fn create_test_server(dataset: DatasetReader) -> TestServer {
    TestServer::new(app(Arc::new(AppState { dataset }))).unwrap()
}

fn all_chunks() -> Vec<&'static str> {
    vec![
        "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q",
        "R", "S", "T", "U", "V", "W", "X",
    ]
}

#[tokio::test]
async fn test_point_lookup() {
    let (_file, dataset) = create_dataset(&all_chunks());
    let expected = dataset.query(52.0, 0.0).unwrap();
    let server = create_test_server(dataset);

    let response = server.get("/52,0").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!({ "elevation": expected }));
}

#[tokio::test]
async fn test_point_lookup_bad_requests() {
    let (_file, dataset) = create_dataset(&all_chunks());
    let server = create_test_server(dataset);

    for path in ["/a,b", "/52", "/-100,0", "/100,0", "/52,374"] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["error"].is_string(), "{path}: {body}");
    }
}

#[tokio::test]
async fn test_point_lookup_no_data() {
    let (_file, dataset) = create_dataset(&["D"]);
    let server = create_test_server(dataset);

    server.get("/60,10").await.assert_status_ok();

    let response = server.get("/-60,100").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("No data"));
}

#[tokio::test]
async fn test_elevation_query() {
    let (_file, dataset) = create_dataset(&all_chunks());
    let expected = dataset.query(-33.5, 151.25).unwrap();
    let server = create_test_server(dataset);

    let response = server
        .get("/elevation")
        .add_query_param("lat", -33.5)
        .add_query_param("lon", 151.25)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["elevation"], json!(expected));
    assert_eq!(body["lat"], json!(-33.5));
    assert_eq!(body["lon"], json!(151.25));
    assert!(body.get("interpolated").is_none());
}

#[tokio::test]
async fn test_elevation_query_interpolated() {
    let (_file, dataset) = create_dataset(&all_chunks());
    let server = create_test_server(dataset);

    let response = server
        .get("/elevation")
        .add_query_param("lat", 80.0)
        .add_query_param("lon", -170.0)
        .add_query_param("interpolate", true)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["interpolated"], json!(true));
    assert!(body["elevation"].is_f64());
}

#[tokio::test]
async fn test_elevation_query_out_of_range() {
    let (_file, dataset) = create_dataset(&all_chunks());
    let server = create_test_server(dataset);

    server
        .get("/elevation")
        .add_query_param("lat", 91.0)
        .add_query_param("lon", 0.0)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dataset_summary() {
    let (_file, dataset) = create_dataset(&["X", "A"]);
    let server = create_test_server(dataset);

    let response = server.get("/dataset").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["chunks"], json!(["X", "A"]));
    assert_eq!(body["missing"].as_array().unwrap().len(), 22);
    assert_eq!(body["size_bytes"], json!(256));
    assert_eq!(body["tile_shape"], json!("8x8"));
    assert_eq!(body["void_value"], Value::Null);
}

#[tokio::test]
async fn test_health_check() {
    let (_file, dataset) = create_dataset(&["A"]);
    let server = create_test_server(dataset);

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}
