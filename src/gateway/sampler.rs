use std::time::Duration;

use log::error;
use tokio::time::MissedTickBehavior;

use super::SharedState;
use crate::now_ts;

/// Drive [`GatewayState::sample_tick`] forever. A failed tick is logged and
/// the next one runs anyway; one bad disk write must not stop the stream.
pub async fn run(state: SharedState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = state.lock().await.sample_tick(now_ts()) {
            error!("sample tick failed: {}", e);
        }
    }
}
