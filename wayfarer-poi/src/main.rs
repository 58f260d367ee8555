//! wayfarer-poi - POI Aggregation Microservice
//!
//! Aggregates points-of-interest from the local database and external
//! providers (OpenTripMap, Geoapify) into a single deduplicated,
//! priority-ordered result set, with rate limiting and circuit breaking
//! around every provider call.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use wayfarer_common::config::TomlConfig;
use wayfarer_poi::config::ServiceSettings;
use wayfarer_poi::{build_aggregator, build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting wayfarer-poi (POI Aggregation) microservice");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration: ENV over TOML over defaults
    let toml_config = TomlConfig::load(None)?;
    let settings = ServiceSettings::from_config(&toml_config)?;
    tracing::info!("Environment: {}", settings.environment);

    // Open or create the local POI database
    tracing::info!("Database: {}", settings.database_path.display());
    let db_pool = wayfarer_poi::db::init_database_pool(&settings.database_path).await?;
    tracing::info!("Database connection established");

    // Assemble the aggregation pipeline and start the cache sweeper
    let aggregator = build_aggregator(&settings, db_pool.clone())?;
    let _sweeper = aggregator
        .result_cache()
        .spawn_sweeper(settings.sweep_interval);

    let state = AppState::new(db_pool, aggregator);
    let app = build_router(state);

    let listener =
        tokio::net::TcpListener::bind(("127.0.0.1", settings.port)).await?;
    tracing::info!("Listening on http://127.0.0.1:{}", settings.port);
    tracing::info!("Health check: http://127.0.0.1:{}/health", settings.port);

    axum::serve(listener, app).await?;

    Ok(())
}
