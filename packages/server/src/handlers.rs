//! HTTP handler functions for the crash map API.

use actix_web::{HttpResponse, web};
use crash_map_ingest::all_sources;
use crash_map_server_models::{
    ApiHealth, ApiSource, AreaQueryParams, CrashQueryParams, HotspotQueryParams,
    clusters_to_feature_collection, crashes_to_feature_collection,
};
use serde::Serialize;

use crate::AppState;
use crate::engine::{QueryError, QueryResult};

/// Response header set when a refresh failed and older data was served.
pub const CACHE_STALE_HEADER: &str = "X-Cache-Stale";

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/crashes`
///
/// Returns cached crashes inside the city as a GeoJSON `FeatureCollection`.
pub async fn crashes(
    state: web::Data<AppState>,
    params: web::Query<CrashQueryParams>,
) -> HttpResponse {
    let result = state.engine.crashes(&params).await;
    respond(
        "crashes",
        result.map(|r| r.map(|records| crashes_to_feature_collection(&records))),
    )
}

/// `GET /api/hotspots`
///
/// Returns k-means cluster centers as a GeoJSON `FeatureCollection`,
/// largest cluster first.
pub async fn hotspots(
    state: web::Data<AppState>,
    params: web::Query<HotspotQueryParams>,
) -> HttpResponse {
    let result = state.engine.hotspots(&params).await;
    respond(
        "hotspots",
        result.map(|r| r.map(|clusters| clusters_to_feature_collection(&clusters))),
    )
}

/// `GET /api/timeseries`
///
/// Returns daily crash counts inside a bbox or radius over the trailing
/// window.
pub async fn timeseries(
    state: web::Data<AppState>,
    params: web::Query<AreaQueryParams>,
) -> HttpResponse {
    respond("timeseries", state.engine.timeseries(&params).await)
}

/// `GET /api/summary`
///
/// Returns the severity histogram and date range inside a bbox or radius.
pub async fn summary(
    state: web::Data<AppState>,
    params: web::Query<AreaQueryParams>,
) -> HttpResponse {
    respond("summary", state.engine.summary(&params).await)
}

/// `GET /api/sources`
///
/// Lists all configured cities.
pub async fn sources() -> HttpResponse {
    let sources: Vec<ApiSource> = all_sources()
        .into_iter()
        .map(|s| ApiSource {
            id: s.id,
            name: s.name,
            city: s.city,
            state: s.state,
            bounds: s.bounds,
        })
        .collect();

    HttpResponse::Ok().json(sources)
}

/// Rejects undecodable query strings with the same JSON error body as
/// validation failures.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(serde_json::json!({
            "error": err.to_string()
        }));
        actix_web::error::InternalError::from_response(err, response).into()
    })
}

fn respond<T: Serialize>(
    endpoint: &str,
    result: Result<QueryResult<T>, QueryError>,
) -> HttpResponse {
    match result {
        Ok(QueryResult { value, stale }) => {
            let mut response = HttpResponse::Ok();
            if stale {
                response.insert_header((CACHE_STALE_HEADER, "true"));
            }
            response.json(value)
        }
        Err(QueryError::Validation(message)) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
        }
        Err(e @ QueryError::Ingestion(_)) => {
            log::error!("Failed to query {endpoint}: {e}");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
        Err(e) => {
            log::error!("Failed to query {endpoint}: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to query {endpoint}")
            }))
        }
    }
}
