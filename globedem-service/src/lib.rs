//! globedem Service Library
//!
//! HTTP handlers, router and OpenAPI document for the elevation service.
//! This library is used by both the globedem-service binary and integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use globedem::DatasetReader;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Dataset answering elevation queries.
    pub dataset: DatasetReader,
}

/// OpenAPI documentation for the globedem service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "globedem Elevation Service",
        version = "0.1.0",
        description = "REST API for point elevation queries against a global elevation raster.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::get_point,
        handlers::get_elevation,
        handlers::get_dataset,
        handlers::health_check,
    ),
    components(
        schemas(
            handlers::ElevationQuery,
            handlers::PointResponse,
            handlers::ElevationResponse,
            handlers::InterpolatedElevationResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::DatasetResponse,
        )
    ),
    tags(
        (name = "elevation", description = "Elevation query endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the service router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/elevation", get(handlers::get_elevation))
        .route("/dataset", get(handlers::get_dataset))
        .route("/health", get(handlers::health_check))
        .route("/:coordinates", get(handlers::get_point))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

// Re-export commonly used types for convenience
pub use handlers::{
    DatasetResponse, ElevationQuery, ElevationResponse, ErrorResponse, HealthResponse,
    InterpolatedElevationResponse, PointResponse,
};
