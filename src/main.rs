use log::info;
use waternet_monitor::gateway::{sampler, server, GatewayState};
use waternet_monitor::logging::logger;
use waternet_monitor::CONFIG;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_logging()?;

    let cfg = &CONFIG.gateway;
    let state = GatewayState::new(cfg)?.shared();

    info!("starting sensor gateway");
    let sampler_h = tokio::spawn(sampler::run(state.clone(), cfg.sample_interval));

    let result = server::serve(state, cfg.listen_port).await;
    sampler_h.abort();
    result?;
    Ok(())
}
