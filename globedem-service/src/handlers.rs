//! HTTP request handlers for the elevation service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use globedem::DemError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Query parameters for the elevation endpoint.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 360).
    pub lon: f64,
    /// Whether to use bilinear interpolation for sub-sample accuracy.
    /// When true, returns a floating-point elevation value.
    /// Default is false (nearest-sample lookup).
    #[serde(default)]
    pub interpolate: bool,
}

/// Response of the `/{lat},{lon}` endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct PointResponse {
    /// Elevation in meters.
    pub elevation: u16,
}

/// Successful elevation response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ElevationResponse {
    /// Elevation in meters (nearest sample).
    pub elevation: u16,
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
}

/// Successful interpolated elevation response.
#[derive(Debug, Serialize, ToSchema)]
pub struct InterpolatedElevationResponse {
    /// Elevation in meters (bilinear interpolation).
    pub elevation: f64,
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
    /// Whether interpolation was used.
    pub interpolated: bool,
}

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Dataset summary response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DatasetResponse {
    /// Dataset file.
    pub path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Per-chunk resolution as `WxH`.
    pub tile_shape: String,
    /// Chunks present in the file, in file order.
    pub chunks: Vec<String>,
    /// Layout chunks absent from the file.
    pub missing: Vec<String>,
    /// Sample value treated as "no data", if any.
    pub void_value: Option<u16>,
}

/// Get elevation for a `lat,lon` path segment.
///
/// # Returns
///
/// - `200 OK` with `{"elevation": N}`
/// - `400 Bad Request` if the segment is malformed or out of range
/// - `404 Not Found` if no data backs the coordinate
#[utoipa::path(
    get,
    path = "/{coordinates}",
    tag = "elevation",
    params(("coordinates" = String, Path, description = "Latitude and longitude as `lat,lon`", example = "52,0")),
    responses(
        (status = 200, description = "Elevation found", body = PointResponse),
        (status = 400, description = "Malformed or out-of-range coordinates", body = ErrorResponse),
        (status = 404, description = "No data at the coordinates", body = ErrorResponse)
    )
)]
pub async fn get_point(
    State(state): State<Arc<AppState>>,
    Path(coordinates): Path<String>,
) -> Response {
    let Some((lat, lon)) = parse_coordinates(&coordinates) else {
        tracing::debug!(coordinates = %coordinates, "Malformed coordinates");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Malformed coordinates '{}', expected lat,lon", coordinates),
            }),
        )
            .into_response();
    };

    match state.dataset.query(lat, lon) {
        Ok(elevation) => (StatusCode::OK, Json(PointResponse { elevation })).into_response(),
        Err(e) => error_response(e),
    }
}

/// Split `lat,lon` into two numbers.
fn parse_coordinates(segment: &str) -> Option<(f64, f64)> {
    let (lat, lon) = segment.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

/// Get elevation for given coordinates.
///
/// # Query Parameters
///
/// - `lat`: Latitude in decimal degrees (-90 to 90)
/// - `lon`: Longitude in decimal degrees (-180 to 360)
/// - `interpolate`: Optional boolean to enable bilinear interpolation (default: false)
///
/// # Returns
///
/// - `200 OK` with elevation data on success
/// - `400 Bad Request` if coordinates are invalid
/// - `404 Not Found` if no data backs the coordinates
#[utoipa::path(
    get,
    path = "/elevation",
    tag = "elevation",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Elevation found", body = ElevationResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 404, description = "No data at the coordinates", body = ErrorResponse)
    )
)]
#[axum::debug_handler]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Response {
    tracing::debug!(
        lat = query.lat,
        lon = query.lon,
        interpolate = query.interpolate,
        "Elevation query"
    );

    if !query.interpolate {
        return match state.dataset.query(query.lat, query.lon) {
            Ok(elevation) => {
                tracing::info!(
                    lat = query.lat,
                    lon = query.lon,
                    elevation = elevation,
                    "Elevation found"
                );
                (
                    StatusCode::OK,
                    Json(ElevationResponse {
                        elevation,
                        lat: query.lat,
                        lon: query.lon,
                    }),
                )
                    .into_response()
            }
            Err(e) => error_response(e),
        };
    }

    let (elevation, interpolated) = match state.dataset.query_interpolated(query.lat, query.lon) {
        Ok(elevation) => (elevation, true),
        // A void among the four neighbours: fall back to the nearest sample
        Err(e) if e.is_no_data() => match state.dataset.query(query.lat, query.lon) {
            Ok(elevation) => (f64::from(elevation), false),
            Err(e) => return error_response(e),
        },
        Err(e) => return error_response(e),
    };

    tracing::info!(
        lat = query.lat,
        lon = query.lon,
        elevation = elevation,
        interpolated = interpolated,
        "Elevation found"
    );
    (
        StatusCode::OK,
        Json(InterpolatedElevationResponse {
            elevation,
            lat: query.lat,
            lon: query.lon,
            interpolated,
        }),
    )
        .into_response()
}

/// Summary of the served dataset.
#[utoipa::path(
    get,
    path = "/dataset",
    tag = "system",
    responses((status = 200, description = "Dataset summary", body = DatasetResponse))
)]
pub async fn get_dataset(State(state): State<Arc<AppState>>) -> Json<DatasetResponse> {
    let info = state.dataset.info();

    Json(DatasetResponse {
        path: info.path.display().to_string(),
        size_bytes: info.size_bytes,
        tile_shape: info.shape.to_string(),
        chunks: info.chunks,
        missing: info.missing,
        void_value: info.void_value,
    })
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Map a query error to a status code and JSON body.
fn error_response(e: DemError) -> Response {
    let status = match &e {
        DemError::InvalidCoordinate { .. } => StatusCode::BAD_REQUEST,
        DemError::NoData { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "Elevation query failed");
    } else {
        tracing::warn!(error = %e, "Elevation query failed");
    }

    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinates() {
        assert_eq!(parse_coordinates("52,0"), Some((52.0, 0.0)));
        assert_eq!(parse_coordinates("-33.5, 151.25"), Some((-33.5, 151.25)));
        assert_eq!(parse_coordinates("a,b"), None);
        assert_eq!(parse_coordinates("52"), None);
        assert_eq!(parse_coordinates("52,0,1"), None);
    }

    #[test]
    fn test_elevation_query_deserialize() {
        let json = r#"{"lat": 35.5, "lon": 138.7}"#;
        let query: ElevationQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.lat, 35.5);
        assert_eq!(query.lon, 138.7);
        assert!(!query.interpolate);
    }

    #[test]
    fn test_point_response_serialize() {
        let json = serde_json::to_string(&PointResponse { elevation: 1234 }).unwrap();
        assert_eq!(json, r#"{"elevation":1234}"#);
    }

    #[test]
    fn test_health_response_serialize() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("0.1.0"));
    }
}
