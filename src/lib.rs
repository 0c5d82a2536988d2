pub mod collector;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod predictor;
pub mod replay;
pub mod sensor;
pub mod series;
pub mod store;
pub mod util;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use series::{RetentionPolicy, SeriesSync};

use lazy_static::lazy_static;

lazy_static! {
    pub static ref CONFIG: AppConfig = config::load_config();
}

pub struct Settings {}

impl Settings {
    pub const FLOW_UNIT: &'static str = "L/min";
    pub const PRESSURE_UNIT: &'static str = "bar";
    pub const SENSOR_MIN: f64 = 0.0;
    pub const SENSOR_MAX: f64 = 5.0;
    // Samples per rolling mean. At a 0.25s tick this smooths over 2 seconds.
    pub const MOVING_AVG_WINDOW: usize = 8;
    pub const EWMA_ALPHA: f64 = 0.3;
}

/// Current unix time in seconds, millisecond resolution.
pub fn now_ts() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
