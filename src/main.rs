use hubmanager::app_config::AppConfig;
use hubmanager::{registry, web};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    tracing_subscriber::fmt().with_max_level(config.server().log_level()?).init();

    info!("🪵 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("✅  Loaded configuration");

    let registry = registry::from_config(&config)?;

    info!("🔥 {} is up and running", env!("CARGO_PKG_NAME"));
    web::serve(&config, registry).await?;

    Ok(())
}
