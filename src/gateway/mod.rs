//! The gateway process: owns the hardware, samples it on a fixed tick and
//! records every predictor's view of the stream into its own database. All
//! mutation funnels through [`GatewayState`] behind one async mutex; the HTTP
//! layer in [`server`] and the tick loop in [`sampler`] share it.

pub mod sampler;
pub mod server;

use std::sync::Arc;

use log::{info, warn};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::collector::Collector;
use crate::config::Gateway;
use crate::predictor::{Predictor, PredictorKind};
use crate::replay::ReplaySession;
use crate::sensor::valve::{default_valves, Valve, ValveState};
use crate::sensor::{default_sensors, Sensor};
use crate::store::CsvDatabase;

pub type SharedState = Arc<Mutex<GatewayState>>;

pub struct GatewayState {
    sensors: Vec<(String, Box<dyn Sensor>)>,
    valves: Vec<(String, Box<dyn Valve>)>,
    predictors: Vec<Predictor>,
    predict_dbs: Vec<CsvDatabase>,
    pub collector: Collector,
    replay: Option<ReplaySession>,
    valve_change: f64,
}

impl GatewayState {
    /// One database per predictor, named after the start time and line.
    pub fn new(cfg: &Gateway) -> crate::Result<Self> {
        let timestr = chrono::Local::now().format("%Y-%m-%d_%H:%M:%S").to_string();

        let mut predictors = Vec::new();
        let mut predict_dbs = Vec::new();
        for kind in PredictorKind::ALL {
            let path = cfg
                .predict_db
                .replace('%', &format!("{}_{}", timestr, kind.name()));
            predict_dbs.push(CsvDatabase::open(&path)?);
            predictors.push(Predictor::new(kind));
        }

        Ok(GatewayState {
            sensors: default_sensors(),
            valves: default_valves(),
            predictors,
            predict_dbs,
            collector: Collector::new(cfg.collector_interval, &cfg.collect_db),
            replay: None,
            valve_change: 0.0,
        })
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// One sampler tick. Serves a replay row when a session is active,
    /// otherwise reads the hardware; either way every predictor gets the row
    /// and writes its prediction at `now`.
    pub fn sample_tick(&mut self, now: f64) -> crate::Result<()> {
        for (name, state) in self.collector.pop(now) {
            self.apply_valve(&name, state, now);
        }

        let row = match self.replay_row(now)? {
            Some(row) => row,
            None => self.live_row(now),
        };

        for (predictor, db) in self.predictors.iter_mut().zip(&mut self.predict_dbs) {
            let predicted = predictor.predict(&row);
            db.insert_at(&predicted, now)?;
        }

        if self.collector.active() {
            if let Some(db) = &mut self.collector.db {
                db.insert_at(&row, now)?;
            }
        }

        Ok(())
    }

    /// Pull the next recorded row if a session is active, re-applying its
    /// valve states. A drained session ends itself and live sampling resumes.
    fn replay_row(&mut self, now: f64) -> crate::Result<Option<Value>> {
        let session = match self.replay.as_mut() {
            Some(session) => session,
            None => return Ok(None),
        };

        match session.next_row()? {
            Some(mut row) => {
                if let Some(states) = row.get("valves").and_then(Value::as_object).cloned() {
                    for (name, entry) in &states {
                        if let Some(value) = entry.get("value").and_then(Value::as_f64) {
                            self.apply_valve(name, ValveState::from_value(value), now);
                        }
                    }
                }
                if let Some(obj) = row.as_object_mut() {
                    obj.remove("id");
                    obj.remove("timestamp");
                }
                Ok(Some(row))
            }
            None => {
                info!("replay finished");
                self.replay = None;
                Ok(None)
            }
        }
    }

    fn live_row(&mut self, now: f64) -> Value {
        // units stay out of rows; they are static and served by sensors_info
        let mut sensors = Map::new();
        for (name, sensor) in &mut self.sensors {
            sensors.insert(name.clone(), json!({"value": sensor.read()}));
        }

        let mut valves = Map::new();
        for (name, valve) in &self.valves {
            valves.insert(name.clone(), json!({"value": valve.state().value()}));
        }

        // seconds since the valves last moved; models key on this
        if self.valve_change == 0.0 {
            self.valve_change = now;
        }
        valves.insert("change_time".to_string(), Value::from(now - self.valve_change));

        json!({"sensors": sensors, "valves": valves})
    }

    fn apply_valve(&mut self, name: &str, state: ValveState, now: f64) {
        for (vname, valve) in &mut self.valves {
            if vname == name {
                if valve.state() != state {
                    self.valve_change = now;
                }
                valve.set_state(state);
                return;
            }
        }
        warn!("ignoring state for unknown valve {}", name);
    }

    // API surface. Errors are plain strings the HTTP layer wraps verbatim.

    /// A list, not a map: clients index their visibility prefs by position,
    /// so the gateway's ordering is the contract.
    pub fn sensors_info(&self) -> Value {
        let sensors: Vec<Value> = self
            .sensors
            .iter()
            .map(|(name, sensor)| json!({"name": name, "unit": sensor.unit()}))
            .collect();
        let predictors: Vec<&str> = PredictorKind::ALL.iter().map(|k| k.name()).collect();
        json!({"sensors": sensors, "predictors": predictors})
    }

    /// Everything recorded after `since`, per predictor, plus replay status.
    /// The first returned row may sit at or before `since`; consumers filter
    /// on their own cursor.
    pub fn sensor_data(&self, since: f64) -> Result<Value, String> {
        let mut values = Map::new();
        for (predictor, db) in self.predictors.iter().zip(&self.predict_dbs) {
            let rows = db
                .cursor_since(since)
                .and_then(|mut cursor| cursor.read_all())
                .map_err(|e| e.to_string())?;
            values.insert(predictor.kind().name().to_string(), Value::from(rows));
        }

        let replay = match &self.replay {
            Some(session) => json!({
                "progress": session.progress(),
                "timestamp": session.timestamp(),
            }),
            None => Value::Null,
        };

        Ok(json!({"values": values, "replay": replay}))
    }

    pub fn get_valves(&self) -> Value {
        let mut valves = Map::new();
        for (name, valve) in &self.valves {
            valves.insert(
                name.clone(),
                json!({"state": valve.state().name(), "wants": valve.wants().name()}),
            );
        }
        Value::from(valves)
    }

    /// Apply a `{valve: <name>, state: "open"|"close"}` command. Refused
    /// wholesale while a calibration run owns the valves; validated before
    /// the valve moves.
    pub fn set_valves(&mut self, params: &Value, now: f64) -> Result<Value, String> {
        if self.collector.active() {
            return Err("collector active".to_string());
        }

        let params = params.as_object().ok_or("invalid request")?;
        let (valve, word) = match (params.get("valve"), params.get("state")) {
            (Some(valve), Some(word)) => (valve, word),
            _ => return Err("missing parameters".to_string()),
        };

        let name = valve.as_str().unwrap_or_default();
        if !self.valves.iter().any(|(vname, _)| vname == name) {
            return Err("unknown valve".to_string());
        }
        let state = word
            .as_str()
            .and_then(ValveState::from_command)
            .ok_or("unknown state")?;

        self.apply_valve(name, state, now);
        Ok(json!({}))
    }

    pub fn start_collector(&mut self, now: f64) -> Result<Value, String> {
        if self.collector.active() {
            return Err("collector active".to_string());
        }
        let names: Vec<String> = self.valves.iter().map(|(name, _)| name.clone()).collect();
        self.collector.start(&names, now).map_err(|e| e.to_string())?;
        let dbname = self.collector.db.as_ref().map(|db| db.filename());
        Ok(json!({"active": true, "dbname": dbname}))
    }

    pub fn cancel_collector(&mut self) -> Result<Value, String> {
        if !self.collector.active() {
            return Err("collector inactive".to_string());
        }
        self.collector.cancel();
        Ok(json!({}))
    }

    pub fn collector_status(&self, now: f64) -> Value {
        let dbname = self.collector.db.as_ref().map(|db| db.filename());
        json!({
            "active": self.collector.active(),
            "dbname": dbname,
            "progress": self.collector.progress(now),
            "time": self.collector.timeleft(now),
        })
    }

    /// Replay the passthrough line's own recording from `since` onwards.
    pub fn start_replay(&mut self, since: f64) -> Result<Value, String> {
        if self.collector.active() {
            return Err("collector active".to_string());
        }
        let actual = PredictorKind::ALL
            .iter()
            .position(|k| *k == PredictorKind::Actual)
            .ok_or("no passthrough line")?;
        let session =
            ReplaySession::start(&self.predict_dbs[actual], since).map_err(|e| e.to_string())?;
        self.replay = Some(session);
        Ok(json!({}))
    }

    pub fn cancel_replay(&mut self) -> Result<Value, String> {
        if self.replay.take().is_none() {
            return Err("replay inactive".to_string());
        }
        info!("replay cancelled");
        Ok(json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    static SEQ: AtomicU32 = AtomicU32::new(0);

    fn test_config() -> Gateway {
        let seq = SEQ.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir();
        Gateway {
            listen_port: 0,
            sample_interval: Duration::from_millis(250),
            collector_interval: 2.0,
            collect_db: dir
                .join(format!("gw-collect-{}-{}-%.csv", std::process::id(), seq))
                .display()
                .to_string(),
            predict_db: dir
                .join(format!("gw-predict-{}-{}-%.csv", std::process::id(), seq))
                .display()
                .to_string(),
        }
    }

    fn cleanup(state: &GatewayState) {
        for db in &state.predict_dbs {
            std::fs::remove_file(db.filename()).ok();
        }
        if let Some(db) = &state.collector.db {
            std::fs::remove_file(db.filename()).ok();
        }
    }

    #[test]
    fn test_tick_records_every_predictor() {
        let mut state = GatewayState::new(&test_config()).unwrap();
        state.sample_tick(100.0).unwrap();
        state.sample_tick(100.25).unwrap();

        let data = state.sensor_data(0.0).unwrap();
        for kind in PredictorKind::ALL {
            let rows = data["values"][kind.name()].as_array().unwrap();
            assert_eq!(rows.len(), 2);
            assert!(rows[0]["sensors"]["flow0"]["value"].is_f64());
        }
        assert!(data["replay"].is_null());
        cleanup(&state);
    }

    #[test]
    fn test_sensors_info_is_an_ordered_list() {
        let state = GatewayState::new(&test_config()).unwrap();
        let info = state.sensors_info();

        let sensors = info["sensors"].as_array().unwrap();
        assert_eq!(sensors.len(), 11);
        assert_eq!(sensors[0], json!({"name": "flow0", "unit": "L/min"}));
        assert_eq!(sensors[5], json!({"name": "pressure0", "unit": "bar"}));
        assert_eq!(info["predictors"][0], "actual");
        cleanup(&state);
    }

    #[test]
    fn test_set_valves_validates_before_moving() {
        let mut state = GatewayState::new(&test_config()).unwrap();

        let err = state
            .set_valves(&json!({"valve": "valve9", "state": "open"}), 1.0)
            .unwrap_err();
        assert_eq!(err, "unknown valve");
        let err = state
            .set_valves(&json!({"valve": "valve0", "state": "ajar"}), 1.0)
            .unwrap_err();
        assert_eq!(err, "unknown state");
        assert_eq!(
            state.set_valves(&json!({"valve": "valve0"}), 1.0).unwrap_err(),
            "missing parameters"
        );
        assert_eq!(state.set_valves(&json!("nope"), 1.0).unwrap_err(), "invalid request");

        state.set_valves(&json!({"valve": "valve0", "state": "close"}), 5.0).unwrap();
        assert_eq!(state.get_valves()["valve0"]["state"], "closed");
        assert_eq!(state.valve_change, 5.0);
        cleanup(&state);
    }

    #[test]
    fn test_collector_locks_out_manual_control() {
        let mut state = GatewayState::new(&test_config()).unwrap();
        let started = state.start_collector(100.0).unwrap();
        assert_eq!(started["active"], true);
        assert!(started["dbname"].is_string());

        assert_eq!(state.start_collector(100.0).unwrap_err(), "collector active");
        let err = state
            .set_valves(&json!({"valve": "valve0", "state": "open"}), 101.0)
            .unwrap_err();
        assert_eq!(err, "collector active");
        assert_eq!(state.start_replay(0.0).unwrap_err(), "collector active");

        let status = state.collector_status(100.0);
        assert_eq!(status["active"], true);

        cleanup(&state);
        state.cancel_collector().unwrap();
        assert_eq!(state.cancel_collector().unwrap_err(), "collector inactive");
    }

    #[test]
    fn test_replay_round_trip() {
        let mut state = GatewayState::new(&test_config()).unwrap();
        state.set_valves(&json!({"valve": "valve0", "state": "close"}), 99.0).unwrap();
        for i in 0..3 {
            state.sample_tick(100.0 + i as f64 * 0.25).unwrap();
        }
        state.set_valves(&json!({"valve": "valve0", "state": "open"}), 101.0).unwrap();

        state.start_replay(0.0).unwrap();
        assert_eq!(state.cancel_replay().unwrap(), json!({}));
        state.start_replay(0.0).unwrap();

        // replay ticks re-apply the recorded valve states
        state.sample_tick(102.0).unwrap();
        assert_eq!(state.get_valves()["valve0"]["state"], "closed");

        let data = state.sensor_data(101.9).unwrap();
        assert!(!data["replay"].is_null());

        // drain the recording; the session ends by itself
        state.sample_tick(102.25).unwrap();
        state.sample_tick(102.5).unwrap();
        state.sample_tick(102.75).unwrap();
        assert!(state.sensor_data(103.0).unwrap()["replay"].is_null());

        cleanup(&state);
    }
}
