use scast::config::AppConfig;
use scast::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scast::logging::init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    let orchestrator = Orchestrator::new(config)?;

    tracing::info!("scast initialized successfully");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    orchestrator.shutdown().await;

    Ok(())
}
