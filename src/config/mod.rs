mod types;

pub use types::*;

use crate::{Error, Result};
use std::env;
use std::path::PathBuf;
use tracing::debug;

pub async fn load() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

    debug!("Loading configuration from: {}", config_path);

    let config_str = tokio::fs::read_to_string(&config_path).await?;
    let mut config = parse(&config_str)?;

    if let Ok(cache_dir) = env::var("MODEL_CACHE_DIR") {
        config.cache_dir = PathBuf::from(cache_dir);
    }

    Ok(config)
}

/// Parses and checks a YAML configuration document.
pub fn parse(config_str: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(config_str)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.qa.is_none() && config.summarization.is_none() {
        return Err(Error::config(
            "at least one of `qa` or `summarization` must be configured",
        ));
    }

    if let Some(qa) = &config.qa {
        if qa.source.model_id.trim().is_empty() {
            return Err(Error::config("qa.model_id must not be empty"));
        }
        if qa.max_answer_len == 0 {
            return Err(Error::config("qa.max_answer_len must be at least 1"));
        }
    }

    if let Some(summarization) = &config.summarization {
        if summarization.source.model_id.trim().is_empty() {
            return Err(Error::config("summarization.model_id must not be empty"));
        }
        if summarization.default_max_length < summarization.default_min_length {
            return Err(Error::config(
                "summarization.default_max_length must not be below default_min_length",
            ));
        }
        if summarization.default_max_length > summarization.max_output_len {
            return Err(Error::config(
                "summarization.default_max_length must not exceed max_output_len",
            ));
        }
    }

    Ok(())
}
