use std::time::Duration;

use log::{info, warn};
use waternet_monitor::dashboard::view::ViewPrefs;
use waternet_monitor::dashboard::{ApiClient, DashboardView};
use waternet_monitor::logging::logger;
use waternet_monitor::{now_ts, RetentionPolicy, CONFIG};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_logging()?;

    let cfg = &CONFIG.dashboard;
    let policy = match cfg.retention.as_str() {
        "count" => RetentionPolicy::Count(cfg.points),
        _ => RetentionPolicy::Window(cfg.window),
    };

    let client = ApiClient::new(&cfg.endpoint);
    let prefs = ViewPrefs::load(&cfg.prefs_path);
    let mut view = DashboardView::new(client, policy, prefs);

    info!("connecting to gateway at {}", cfg.endpoint);
    loop {
        match view.initialize(now_ts()).await {
            Ok(()) => break,
            Err(e) => {
                warn!("initialize failed, retrying: {}", e);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }

    view.run(cfg.poll_interval).await;
    Ok(())
}
