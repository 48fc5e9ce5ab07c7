use anyhow::Result;
use medserve::{config, server};
use tracing::{error, info};

/// Validates that a log level string is valid
fn validate_log_level(level: &str) -> Result<()> {
    level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: error, warn, info, debug, trace",
                level
            )
        })?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (before logging setup)
    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG holds a full filter directive; the config only names a level.
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            if let Err(e) = validate_log_level(&config.server.logs.level) {
                eprintln!("{}", e);
                std::process::exit(1);
            }
            tracing_subscriber::EnvFilter::new(&config.server.logs.level)
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    info!("Starting medserve (configured log level: {})", config.server.logs.level);
    info!("Configuration loaded successfully");

    if let Err(e) = server::run(config).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
