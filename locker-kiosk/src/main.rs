use locker_kiosk::core::{AppState, BackgroundTasks, Config};
use locker_kiosk::setup_environment;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Environment (dotenv, working directory, logging)
    dotenv::dotenv().ok();
    let config = Config::from_env();
    setup_environment(&config)?;

    tracing::info!(
        environment = %config.environment,
        backend = %config.backend_base_url,
        mirror = %config.mirror_base_url,
        "Locker kiosk starting..."
    );

    // 2. Wire the pipeline
    let state = AppState::initialize(&config)?;

    // 3. Background workers (mirror sync, expiry sweep, reconcile)
    let mut tasks = BackgroundTasks::new();
    state.spawn_workers(&mut tasks);
    tracing::info!(count = tasks.len(), "Background tasks running");

    // 4. Park until shutdown
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    tasks.shutdown().await;

    Ok(())
}
