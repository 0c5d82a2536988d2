//! Standalone stand-in for the gateway.
//!
//! Serves the same sensors and sensor_data endpoints from an in-memory
//! history instead of the hardware and databases, so a dashboard can be
//! developed and demoed against a single binary. Only the passthrough line
//! is served; control endpoints do not exist here.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use waternet_monitor::logging::logger;
use waternet_monitor::sensor::{default_sensors, Sensor};
use waternet_monitor::{now_ts, CONFIG};

struct FixtureState {
    sensors: Vec<(String, Box<dyn Sensor>)>,
    rows: VecDeque<Value>,
    history: usize,
    next_id: u64,
}

type Shared = Arc<Mutex<FixtureState>>;

impl FixtureState {
    fn new(history: usize) -> Self {
        FixtureState {
            sensors: default_sensors(),
            rows: VecDeque::new(),
            history,
            next_id: 0,
        }
    }

    fn tick(&mut self, now: f64) {
        let mut sensors = Map::new();
        for (name, sensor) in &mut self.sensors {
            sensors.insert(name.clone(), json!({"value": sensor.read()}));
        }

        self.rows.push_back(json!({
            "id": self.next_id,
            "timestamp": now,
            "sensors": sensors,
        }));
        self.next_id += 1;

        while self.rows.len() > self.history {
            self.rows.pop_front();
        }
    }

    fn sensors_info(&self) -> Value {
        let sensors: Vec<Value> = self
            .sensors
            .iter()
            .map(|(name, sensor)| json!({"name": name, "unit": sensor.unit()}))
            .collect();
        json!({"sensors": sensors, "predictors": ["actual"]})
    }

    /// Same cursor contract as the gateway: the newest row at or before
    /// `since` leads the response, consumers filter it out themselves.
    fn sensor_data(&self, since: f64) -> Value {
        let row_ts = |row: &Value| row["timestamp"].as_f64().unwrap_or(0.0);
        let start = self
            .rows
            .iter()
            .rposition(|row| row_ts(row) <= since)
            .unwrap_or(0);

        let rows: Vec<Value> = self.rows.iter().skip(start).cloned().collect();
        json!({"values": {"actual": rows}, "replay": null})
    }
}

async fn get_sensors(State(state): State<Shared>) -> Json<Value> {
    Json(state.lock().await.sensors_info())
}

#[derive(Deserialize)]
struct SinceParams {
    #[serde(default)]
    since: f64,
}

async fn get_sensor_data(
    State(state): State<Shared>,
    Query(params): Query<SinceParams>,
) -> Json<Value> {
    Json(state.lock().await.sensor_data(params.since))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_logging()?;

    let cfg = &CONFIG.fixture;
    let state: Shared = Arc::new(Mutex::new(FixtureState::new(cfg.history)));

    let ticker_state = state.clone();
    let interval = cfg.sample_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            ticker_state.lock().await.tick(now_ts());
        }
    });

    let app = Router::new()
        .route("/api/sensors", get(get_sensors))
        .route("/api/sensor_data", get(get_sensor_data))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.listen_port)).await?;
    info!("fixture server listening on port {}", cfg.listen_port);
    axum::serve(listener, app).await?;
    Ok(())
}
