use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::{path::Path, time::Duration};

#[derive(Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: Gateway,
    #[serde(default)]
    pub dashboard: Dashboard,
    #[serde(default)]
    pub fixture: Fixture,
}

#[derive(Deserialize, Debug)]
pub struct Gateway {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(
        default = "default_sample_interval",
        deserialize_with = "duration_deserialize"
    )]
    pub sample_interval: Duration,
    #[serde(default = "default_collector_interval")]
    pub collector_interval: f64,
    #[serde(default = "default_collect_db")]
    pub collect_db: String,
    #[serde(default = "default_predict_db")]
    pub predict_db: String,
}

#[derive(Deserialize, Debug)]
pub struct Dashboard {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "duration_deserialize"
    )]
    pub poll_interval: Duration,
    #[serde(default = "default_retention")]
    pub retention: String,
    #[serde(
        default = "default_window",
        deserialize_with = "duration_deserialize"
    )]
    pub window: Duration,
    #[serde(default = "default_points")]
    pub points: usize,
    #[serde(default = "default_prefs_path")]
    pub prefs_path: String,
}

#[derive(Deserialize, Debug)]
pub struct Fixture {
    #[serde(default = "default_fixture_port")]
    pub listen_port: u16,
    #[serde(
        default = "default_fixture_interval",
        deserialize_with = "duration_deserialize"
    )]
    pub sample_interval: Duration,
    #[serde(default = "default_fixture_history")]
    pub history: usize,
}

fn default_listen_port() -> u16 {
    5000
}
fn default_sample_interval() -> Duration {
    Duration::from_millis(250)
}
fn default_collector_interval() -> f64 {
    2.0
}
fn default_collect_db() -> String {
    String::from("collect-%.csv")
}
fn default_predict_db() -> String {
    String::from("predict-%.csv")
}
fn default_endpoint() -> String {
    String::from("http://127.0.0.1:5000")
}
fn default_poll_interval() -> Duration {
    Duration::from_millis(1500)
}
fn default_retention() -> String {
    String::from("window")
}
fn default_window() -> Duration {
    Duration::from_secs(60)
}
fn default_points() -> usize {
    240
}
fn default_prefs_path() -> String {
    String::from("dashboard-prefs.json")
}
fn default_fixture_port() -> u16 {
    3000
}
fn default_fixture_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_fixture_history() -> usize {
    3600
}

fn duration_deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = f64::deserialize(deserializer)?;
    if !s.is_finite() || s < 0.0 {
        return Err(serde::de::Error::custom("Invalid duration"));
    }
    Ok(Duration::from_secs_f64(s))
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            gateway: Gateway::default(),
            dashboard: Dashboard::default(),
            fixture: Fixture::default(),
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Gateway {
            listen_port: default_listen_port(),
            sample_interval: default_sample_interval(),
            collector_interval: default_collector_interval(),
            collect_db: default_collect_db(),
            predict_db: default_predict_db(),
        }
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Dashboard {
            endpoint: default_endpoint(),
            poll_interval: default_poll_interval(),
            retention: default_retention(),
            window: default_window(),
            points: default_points(),
            prefs_path: default_prefs_path(),
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Fixture {
            listen_port: default_fixture_port(),
            sample_interval: default_fixture_interval(),
            history: default_fixture_history(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,

    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

pub fn load_config() -> AppConfig {
    let cli_args = CliArgs::parse();
    let mut config = AppConfig::default();

    if Path::new(&cli_args.config).exists() {
        let contents = fs::read_to_string(&cli_args.config).expect("Failed to read config file");
        let file_config = toml::from_str(&contents).expect("Failed to parse config file");
        config = file_config;
    }

    if let Some(endpoint) = cli_args.endpoint {
        config.dashboard.endpoint = endpoint;
    }

    if let Some(port) = cli_args.port {
        config.gateway.listen_port = port;
    }

    config
}
