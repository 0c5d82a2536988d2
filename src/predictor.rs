//! Predictor overlays for the sensor stream.
//!
//! Every sampled row runs through each predictor; the results land in
//! per-predictor databases and are rendered as parallel chart lines. The set
//! of predictors is a fixed enumeration resolved at startup, never a dynamic
//! name lookup.

use std::collections::HashMap;

use serde_json::Value;

use crate::util::RollingMean;
use crate::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredictorKind {
    /// Passthrough; the measured values themselves.
    Actual,
    /// Rolling mean over the last few samples.
    MovingAvg,
    /// Exponentially weighted moving average.
    Ewma,
}

impl PredictorKind {
    pub const ALL: [PredictorKind; 3] =
        [PredictorKind::Actual, PredictorKind::MovingAvg, PredictorKind::Ewma];

    pub fn name(&self) -> &'static str {
        match self {
            PredictorKind::Actual => "actual",
            PredictorKind::MovingAvg => "moving_avg",
            PredictorKind::Ewma => "ewma",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            // "none" is the historical name for the passthrough line
            "actual" | "none" => Some(PredictorKind::Actual),
            "moving_avg" => Some(PredictorKind::MovingAvg),
            "ewma" => Some(PredictorKind::Ewma),
            _ => None,
        }
    }
}

enum Model {
    Passthrough,
    MovingAvg { window: usize, means: HashMap<String, RollingMean<f64>> },
    Ewma { alpha: f64, smoothed: HashMap<String, f64> },
}

/// Stateful predictor mapping a sampled row to a predicted row.
///
/// Only the `sensors.*` fields are predicted; id, timestamp and valve fields
/// pass through untouched. Predictions are clamped to >= 0 so flows and
/// pressures never go negative.
pub struct Predictor {
    kind: PredictorKind,
    model: Model,
}

impl Predictor {
    pub fn new(kind: PredictorKind) -> Self {
        let model = match kind {
            PredictorKind::Actual => Model::Passthrough,
            PredictorKind::MovingAvg => Model::MovingAvg {
                window: Settings::MOVING_AVG_WINDOW,
                means: HashMap::new(),
            },
            PredictorKind::Ewma => Model::Ewma {
                alpha: Settings::EWMA_ALPHA,
                smoothed: HashMap::new(),
            },
        };
        Predictor { kind, model }
    }

    pub fn kind(&self) -> PredictorKind {
        self.kind
    }

    pub fn predict(&mut self, row: &Value) -> Value {
        let mut result = row.clone();

        let sensors = match result.get_mut("sensors").and_then(Value::as_object_mut) {
            Some(sensors) => sensors,
            None => return result,
        };

        for (name, entry) in sensors.iter_mut() {
            let measured = match entry.get("value").and_then(Value::as_f64) {
                Some(v) => v,
                None => continue,
            };

            let predicted = match &mut self.model {
                Model::Passthrough => continue,
                Model::MovingAvg { window, means } => {
                    let mean = means
                        .entry(name.clone())
                        .or_insert_with(|| RollingMean::new(*window));
                    mean.push(measured)
                }
                Model::Ewma { alpha, smoothed } => {
                    let s = smoothed.entry(name.clone()).or_insert(measured);
                    *s = *alpha * measured + (1.0 - *alpha) * *s;
                    *s
                }
            };

            if let Some(obj) = entry.as_object_mut() {
                obj.insert("value".to_string(), Value::from(predicted.max(0.0)));
            }
        }

        result
    }
}
