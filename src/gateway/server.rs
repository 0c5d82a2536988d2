//! HTTP API over [`GatewayState`].
//!
//! Every endpoint answers 200 with JSON; failures carry a non-null `error`
//! field instead of an HTTP status so thin dashboard clients only need one
//! code path.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};

use super::SharedState;
use crate::now_ts;

#[derive(Deserialize)]
struct SinceParams {
    #[serde(default)]
    since: f64,
}

fn reply(result: Result<Value, String>) -> Json<Value> {
    match result {
        Ok(value) => Json(value),
        Err(msg) => Json(json!({"error": msg})),
    }
}

async fn get_sensors(State(state): State<SharedState>) -> Json<Value> {
    Json(state.lock().await.sensors_info())
}

async fn get_sensor_data(
    State(state): State<SharedState>,
    Query(params): Query<SinceParams>,
) -> Json<Value> {
    reply(state.lock().await.sensor_data(params.since))
}

async fn get_valves(State(state): State<SharedState>) -> Json<Value> {
    Json(state.lock().await.get_valves())
}

async fn set_valves(State(state): State<SharedState>, body: Json<Value>) -> Json<Value> {
    reply(state.lock().await.set_valves(&body, now_ts()))
}

async fn start_collector(State(state): State<SharedState>) -> Json<Value> {
    reply(state.lock().await.start_collector(now_ts()))
}

async fn cancel_collector(State(state): State<SharedState>) -> Json<Value> {
    reply(state.lock().await.cancel_collector())
}

async fn get_collector(State(state): State<SharedState>) -> Json<Value> {
    Json(state.lock().await.collector_status(now_ts()))
}

async fn start_replay(
    State(state): State<SharedState>,
    Query(params): Query<SinceParams>,
) -> Json<Value> {
    reply(state.lock().await.start_replay(params.since))
}

async fn cancel_replay(State(state): State<SharedState>) -> Json<Value> {
    reply(state.lock().await.cancel_replay())
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/sensors", get(get_sensors))
        .route("/api/sensor_data", get(get_sensor_data))
        .route("/api/get_valves", get(get_valves))
        .route("/api/set_valves", post(set_valves))
        .route("/api/start_collector", post(start_collector))
        .route("/api/cancel_collector", post(cancel_collector))
        .route("/api/get_collector", get(get_collector))
        .route("/api/replay", post(start_replay))
        .route("/api/cancel_replay", post(cancel_replay))
        .with_state(state)
}

pub async fn serve(state: SharedState, port: u16) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("gateway API listening on port {}", port);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
