use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};

/// A timestamped observation, immutable once received.
///
/// `fields` maps a series key (sensor name) to its value; `None` marks a
/// reading that was missing or non-numeric in the payload. Missing fields are
/// kept as gaps rather than dropped so overlay datasets stay index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Unix timestamp in seconds.
    pub timestamp: f64,
    pub fields: HashMap<String, Option<f64>>,
}

impl Record {
    pub fn new(timestamp: f64) -> Self {
        Record { timestamp, fields: HashMap::new() }
    }

    pub fn with_field(mut self, key: &str, value: Option<f64>) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Build a record from a wire row
    /// (`{id, timestamp, sensors: {name: {value}}, ...}`).
    ///
    /// A row without a numeric timestamp is unusable. Individual sensor
    /// entries degrade to `None` instead of failing the row.
    pub fn from_row(row: &Value) -> Result<Self> {
        let timestamp = row
            .get("timestamp")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::MalformedPayload("row is missing a timestamp".into()))?;

        let mut fields = HashMap::new();
        if let Some(sensors) = row.get("sensors").and_then(Value::as_object) {
            for (name, entry) in sensors {
                fields.insert(name.clone(), entry.get("value").and_then(Value::as_f64));
            }
        }

        Ok(Record { timestamp, fields })
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied().flatten()
    }
}
