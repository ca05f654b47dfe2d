#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the crash map application.
//!
//! Serves crashes, hotspots, daily timeseries, and area summaries for one
//! configured city from a local `DuckDB` cache. The cache is refreshed
//! from the city's Socrata endpoint on demand or once it is older than the
//! configured maximum age.

pub mod engine;
mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, Scope, middleware, web};
use crash_map_database::CacheStore;
use crash_map_ingest::{
    DEFAULT_FETCH_LIMIT, DEFAULT_MAX_CACHE_AGE_HOURS, DEFAULT_WINDOW_DAYS, cache_path,
    find_source,
};

use crate::engine::{EngineConfig, QueryEngine};

/// Shared application state.
pub struct AppState {
    /// Query engine for the served city.
    pub engine: QueryEngine,
}

/// Routes mounted under `/api`.
#[must_use]
pub fn api_scope() -> Scope {
    web::scope("/api")
        .route("/health", web::get().to(handlers::health))
        .route("/crashes", web::get().to(handlers::crashes))
        .route("/hotspots", web::get().to(handlers::hotspots))
        .route("/timeseries", web::get().to(handlers::timeseries))
        .route("/summary", web::get().to(handlers::summary))
        .route("/sources", web::get().to(handlers::sources))
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn engine_config_from_env() -> EngineConfig {
    EngineConfig {
        window_days: env_or("CRASH_MAP_WINDOW_DAYS", DEFAULT_WINDOW_DAYS),
        fetch_limit: env_or("CRASH_MAP_FETCH_LIMIT", DEFAULT_FETCH_LIMIT),
        max_cache_age: chrono::Duration::hours(env_or(
            "CRASH_MAP_MAX_CACHE_AGE_HOURS",
            DEFAULT_MAX_CACHE_AGE_HOURS,
        )),
    }
}

/// Starts the crash map API server.
///
/// Resolves the city from `CRASH_MAP_CITY` (default `nyc`), opens its
/// cache, and starts the Actix-Web HTTP server. The cache is not fetched
/// at startup; the first query refreshes it if needed.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the city is unknown, the cache
/// cannot be opened, or the HTTP server fails to bind or encounters a
/// runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let city = std::env::var("CRASH_MAP_CITY").unwrap_or_else(|_| "nyc".to_string());
    let source = find_source(&city).map_err(std::io::Error::other)?;

    let store = CacheStore::open(&cache_path(&source.id)).map_err(std::io::Error::other)?;

    let config = engine_config_from_env();
    log::info!(
        "Serving {} ({}): {} day window, max cache age {}h",
        source.name,
        source.id,
        config.window_days,
        config.max_cache_age.num_hours()
    );

    let state = web::Data::new(AppState {
        engine: QueryEngine::new(store, Arc::new(source), config),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env_or("PORT", 8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(handlers::query_config())
            .service(api_scope())
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
