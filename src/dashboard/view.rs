//! Terminal dashboard view.
//!
//! Owns one [`SeriesSync`] per predictor line so every chart overlay stays
//! index-aligned, and polls the gateway on a fixed cadence. The view is the
//! explicit owner of all series state; dropping it drops every series with
//! it.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::time::MissedTickBehavior;

use super::ApiClient;
use crate::predictor::PredictorKind;
use crate::series::{Record, RetentionPolicy, SeriesSync};
use crate::Result;

/// Per-sensor visibility, persisted between runs. Keyed by sensor index so
/// renames on the gateway side do not invalidate saved preferences.
#[derive(Debug, Default)]
pub struct ViewPrefs {
    hidden: HashMap<String, bool>,
}

impl ViewPrefs {
    /// Missing or unreadable preference files mean everything visible.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let hidden = std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        ViewPrefs { hidden }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = serde_json::to_string(&self.hidden)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn visible(&self, index: usize) -> bool {
        !self.hidden.get(&index.to_string()).copied().unwrap_or(false)
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) {
        if visible {
            self.hidden.remove(&index.to_string());
        } else {
            self.hidden.insert(index.to_string(), true);
        }
    }
}

pub struct DashboardView {
    client: ApiClient,
    sensors: Vec<(String, String)>,
    predictors: Vec<(PredictorKind, SeriesSync)>,
    prefs: ViewPrefs,
    policy: RetentionPolicy,
    replay: Option<f64>,
}

impl DashboardView {
    pub fn new(client: ApiClient, policy: RetentionPolicy, prefs: ViewPrefs) -> Self {
        DashboardView {
            client,
            sensors: Vec::new(),
            predictors: Vec::new(),
            prefs,
            policy,
            replay: None,
        }
    }

    pub fn sensors(&self) -> &[(String, String)] {
        &self.sensors
    }

    pub fn series(&self, kind: PredictorKind) -> Option<&SeriesSync> {
        self.predictors
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, sync)| sync)
    }

    /// Discover sensors and predictor lines, then seed every series from one
    /// bulk fetch. Fails with `Error::NoData` until the gateway has sampled
    /// at least once; callers retry.
    pub async fn initialize(&mut self, now: f64) -> Result<()> {
        let info = self.client.sensors().await?;

        self.sensors = Self::sensor_list(&info);
        let keys: Vec<String> = self.sensors.iter().map(|(name, _)| name.clone()).collect();

        self.predictors.clear();
        if let Some(names) = info.get("predictors").and_then(Value::as_array) {
            for name in names.iter().filter_map(Value::as_str) {
                match PredictorKind::from_name(name) {
                    Some(kind) => self
                        .predictors
                        .push((kind, SeriesSync::new(keys.clone(), self.policy))),
                    None => warn!("skipping unknown predictor line {}", name),
                }
            }
        }

        let since = match self.policy {
            RetentionPolicy::Window(window) => now - window.as_secs_f64(),
            RetentionPolicy::Count(_) => 0.0,
        };
        let data = self.client.sensor_data(since).await?;

        for (kind, sync) in &mut self.predictors {
            let records = Self::records_from(&data, *kind);
            sync.initialize(&records, now)?;
        }

        info!(
            "tracking {} sensors across {} predictor lines",
            self.sensors.len(),
            self.predictors.len()
        );
        Ok(())
    }

    /// One poll: fetch everything after the cursor and merge it into every
    /// line. The fetch cursor is the slowest line's so no line misses rows.
    pub async fn poll_once(&mut self, now: f64) -> Result<usize> {
        let since = self
            .predictors
            .iter()
            .filter_map(|(_, sync)| sync.cursor())
            .fold(f64::INFINITY, f64::min);
        if !since.is_finite() {
            return Err(crate::Error::Uninitialized);
        }

        let data = self.client.sensor_data(since).await?;

        let mut merged = 0;
        for (kind, sync) in &mut self.predictors {
            let records = Self::records_from(&data, *kind);
            merged += sync.merge(&records, now)?;
        }

        self.replay = data
            .get("replay")
            .and_then(|r| r.get("progress"))
            .and_then(Value::as_f64);

        if merged > 0 {
            self.log_latest();
        }
        Ok(merged)
    }

    /// `(name, unit)` pairs out of a `sensors` payload, in the gateway's
    /// order. Position is what the visibility prefs key on, so the list is
    /// taken as-is and never re-sorted.
    fn sensor_list(info: &Value) -> Vec<(String, String)> {
        let entries = match info.get("sensors").and_then(Value::as_array) {
            Some(entries) => entries,
            None => return Vec::new(),
        };

        entries
            .iter()
            .filter_map(|entry| {
                let name = entry.get("name").and_then(Value::as_str)?;
                let unit = entry.get("unit").and_then(Value::as_str).unwrap_or("");
                Some((name.to_string(), unit.to_string()))
            })
            .collect()
    }

    /// Rows for one predictor line out of a `sensor_data` payload. Rows that
    /// do not parse are dropped with a warning rather than failing the poll.
    fn records_from(data: &Value, kind: PredictorKind) -> Vec<Record> {
        let rows = match data["values"][kind.name()].as_array() {
            Some(rows) => rows,
            None => return Vec::new(),
        };

        rows.iter()
            .filter_map(|row| match Record::from_row(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("dropping row: {}", e);
                    None
                }
            })
            .collect()
    }

    fn log_latest(&self) {
        let actual = match self.series(PredictorKind::Actual) {
            Some(sync) => sync,
            None => return,
        };

        for (index, (name, unit)) in self.sensors.iter().enumerate() {
            if !self.prefs.visible(index) {
                continue;
            }
            let latest = actual
                .series(name)
                .and_then(|s| s.latest())
                .and_then(|p| p.value);
            match latest {
                Some(value) => info!("{}: {:.3} {}", name, value, unit),
                None => info!("{}: N/A", name),
            }
        }
        if let Some(progress) = self.replay {
            info!("replay {:.0}% done", progress * 100.0);
        }
    }

    /// Refresh valve and collector status. Control state is advisory on the
    /// dashboard, so failures only get logged.
    pub async fn refresh_controls(&self) {
        match self.client.valves().await {
            Ok(valves) => debug!("valves: {}", valves),
            Err(e) => debug!("valve status unavailable: {}", e),
        }
        match self.client.collector().await {
            Ok(status) => {
                if status.get("active").and_then(Value::as_bool).unwrap_or(false) {
                    info!(
                        "collector {:.0}% done, {:.0}s left",
                        status["progress"].as_f64().unwrap_or(0.0) * 100.0,
                        status["time"].as_f64().unwrap_or(0.0),
                    );
                }
            }
            Err(e) => debug!("collector status unavailable: {}", e),
        }
    }

    /// Poll until the task is cancelled. A failed poll is logged and retried
    /// on the next tick; the gateway coming back is enough to recover.
    pub async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once(crate::now_ts()).await {
                warn!("poll failed: {}", e);
                continue;
            }
            self.refresh_controls().await;
        }
    }
}
