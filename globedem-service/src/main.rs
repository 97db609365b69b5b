//! globedem Service - HTTP microservice for global elevation queries.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `GLOBEDEM_DATASET` | Assembled dataset file | `/srv/globedem/dataset` |
//! | `GLOBEDEM_TILE_SHAPE` | Per-chunk resolution `WxH` | `14401x10801` |
//! | `GLOBEDEM_CHUNKS` | Comma-separated chunk list of a subset dataset | all chunks |
//! | `GLOBEDEM_VOID_VALUE` | Sample value meaning "no data" | None |
//! | `GLOBEDEM_PORT` | HTTP server port | 8080 |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /{lat},{lon}` - Elevation at coordinates as `{"elevation": N}`
//! - `GET /elevation?lat=X&lon=Y` - Get elevation at coordinates
//! - `GET /dataset` - Dataset summary
//! - `GET /health` - Health check
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use globedem::ReaderBuilder;
use globedem_service::{app, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "globedem_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load port from environment (service-specific config)
    let port: u16 = std::env::var("GLOBEDEM_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The library handles GLOBEDEM_DATASET, GLOBEDEM_TILE_SHAPE,
    // GLOBEDEM_CHUNKS and GLOBEDEM_VOID_VALUE
    let builder = ReaderBuilder::from_env()?;
    let dataset = builder.clone().open().map_err(|e| {
        tracing::error!(
            path = %builder.dataset_path().display(),
            error = %e,
            "Dataset failed to open"
        );
        e
    })?;

    let info = dataset.info();
    tracing::info!(
        path = %info.path.display(),
        size_bytes = info.size_bytes,
        tile_shape = %info.shape,
        chunks = info.chunks.len(),
        missing = info.missing.len(),
        port = port,
        "Starting globedem service"
    );

    let state = Arc::new(AppState { dataset });

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
