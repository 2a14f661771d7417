use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use translation_resolver::{config::Config, resolver::Resolver, server};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_resolver=info".parse()?),
        )
        .init();

    info!("Starting translation resolver");

    // Load configuration from environment
    let config = Config::from_env()?;
    info!(
        "Cache at {}, overrides at {}, race tier of {}",
        config.cache_dir, config.overrides_file, config.race_size
    );

    let resolver = Arc::new(Resolver::from_config(&config)?);
    server::serve(&config, Arc::clone(&resolver)).await?;

    info!("{}", resolver.metrics().report().format_log());
    Ok(())
}
