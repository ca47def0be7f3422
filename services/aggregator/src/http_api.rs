//! Read-only HTTP API: thin accessors over module snapshots.
//!
//! Routes:
//!   GET /api/earthquake_info        - earthquake log + arbitrated EEW
//!   GET /api/shake_level            - shake-level snapshot
//!   GET /api/tsunami_info           - tsunami totals
//!   GET /api/global_earthquake_info - global seismicity list
//!   GET /api/dmdata_status          - streaming client heartbeat
//!   GET /api/time_sync              - server clock + difference
//!   GET /api/raw_data               - last raw telegram body
//!
//! Every module answers `404 Not Ready` until its first snapshot exists.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use qm_model::feeds::GlobalEarthquake;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::state::Registry;

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/api/earthquake_info", get(earthquake_info))
        .route("/api/shake_level", get(shake_level))
        .route("/api/tsunami_info", get(tsunami_info))
        .route("/api/global_earthquake_info", get(global_earthquake_info))
        .route("/api/dmdata_status", get(dmdata_status))
        .route("/api/time_sync", get(time_sync))
        .route("/api/raw_data", get(raw_data))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

#[derive(Serialize)]
struct NotReady {
    code: u16,
    message: &'static str,
}

fn not_ready() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotReady {
            code: 404,
            message: "Module not ready",
        }),
    )
}

#[derive(Serialize)]
struct EarthquakeInfoResponse {
    info: Vec<qm_model::EarthquakeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    eew: Option<qm_model::EewView>,
}

async fn earthquake_info(State(registry): State<Arc<Registry>>) -> axum::response::Response {
    let Some(snapshot) = registry.p2p.snapshot().await else {
        return not_ready().into_response();
    };
    Json(EarthquakeInfoResponse {
        info: snapshot.earthquake,
        eew: registry.eew.current().await,
    })
    .into_response()
}

async fn shake_level(State(registry): State<Arc<Registry>>) -> axum::response::Response {
    match registry.shake_level.snapshot().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => not_ready().into_response(),
    }
}

async fn tsunami_info(State(registry): State<Arc<Registry>>) -> axum::response::Response {
    match registry.tsunami.totals().await {
        Some(totals) => Json(totals).into_response(),
        None => not_ready().into_response(),
    }
}

#[derive(Serialize)]
struct GlobalEarthquakeResponse {
    status: i64,
    data: Vec<GlobalEarthquake>,
}

async fn global_earthquake_info(
    State(registry): State<Arc<Registry>>,
) -> axum::response::Response {
    match registry.global_quake.snapshot().await {
        Some(data) => Json(GlobalEarthquakeResponse { status: 0, data }).into_response(),
        None => not_ready().into_response(),
    }
}

async fn dmdata_status(State(registry): State<Arc<Registry>>) -> axum::response::Response {
    match &registry.dmdata {
        Some(client) => Json(client.status().await).into_response(),
        None => not_ready().into_response(),
    }
}

#[derive(Deserialize)]
struct TimeSyncQuery {
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Serialize)]
struct TimeSyncResponse {
    server_timestamp: i64,
    difference: i64,
}

async fn time_sync(Query(query): Query<TimeSyncQuery>) -> Json<TimeSyncResponse> {
    let server_timestamp = chrono::Utc::now().timestamp();
    Json(TimeSyncResponse {
        server_timestamp,
        difference: query
            .timestamp
            .map_or(0, |client| server_timestamp - client),
    })
}

async fn raw_data(State(registry): State<Arc<Registry>>) -> axum::response::Response {
    match &registry.dmdata {
        Some(client) => match client.last_raw_body().await {
            Some(body) => body.into_response(),
            None => not_ready().into_response(),
        },
        None => not_ready().into_response(),
    }
}
