use std::error::Error;

use school_dashboard::config::AppConfig;
use school_dashboard::server;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // RUST_LOG takes precedence, fallback to info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    server::run(config).await?;

    Ok(())
}
