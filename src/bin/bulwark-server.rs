//! Headless dedicated server: hosts one match and prints its id so that
//! viewers can join with it.

use bulwark::config::load_setup;
use bulwark::game::{SimEvent, Simulation};
use bulwark::net::{ServerState, run_server_internal};
use n0_error::{Result, StdResultExt};
use std::path::PathBuf;

/// `bulwark-server [config.json] [catalog.json]`
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1).map(PathBuf::from);
    let config_path = args.next();
    let catalog_path = args.next();
    let (catalog, config) = load_setup(config_path.as_deref(), catalog_path.as_deref()).anyerr()?;

    let mut state = ServerState::new(Simulation::with_defaults(catalog, config));
    state.subscribe(|event: &SimEvent| match event {
        SimEvent::EnemyLeaked { id } => log::info!("Enemy {id:?} leaked"),
        SimEvent::WaveStarted { number } => log::info!("Wave {number} started"),
        _ => {}
    });

    let router = run_server_internal(state).await?;
    log::info!("Join with: {}", router.endpoint().id());

    tokio::signal::ctrl_c().await.anyerr()?;
    log::info!("Shutting down");
    router.shutdown().await.anyerr()?;
    Ok(())
}
