use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub qa: Option<QaConfig>,
    #[serde(default)]
    pub summarization: Option<SummarizationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Where a checkpoint comes from: a hub repository, or a directory already on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSource {
    pub model_id: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    #[serde(flatten)]
    pub source: ModelSource,
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    #[serde(default = "default_max_answer_len")]
    pub max_answer_len: usize,
    #[serde(default)]
    pub do_lower_case: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    #[serde(flatten)]
    pub source: ModelSource,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_max_input_len")]
    pub max_input_len: usize,
    #[serde(default = "default_max_length")]
    pub default_max_length: usize,
    #[serde(default = "default_min_length")]
    pub default_min_length: usize,
    /// Upper bound on a request's `max_length`.
    #[serde(default = "default_max_output_len")]
    pub max_output_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            logs: LogsConfig::default(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ModelSource {
    pub fn hub(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            revision: default_revision(),
            local_dir: None,
        }
    }
}

impl QaConfig {
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            max_seq_len: default_max_seq_len(),
            max_answer_len: default_max_answer_len(),
            do_lower_case: false,
        }
    }
}

impl SummarizationConfig {
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            prefix: default_prefix(),
            max_input_len: default_max_input_len(),
            default_max_length: default_max_length(),
            default_min_length: default_min_length(),
            max_output_len: default_max_output_len(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".model-cache")
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_max_seq_len() -> usize {
    384
}

fn default_max_answer_len() -> usize {
    15
}

fn default_prefix() -> String {
    "summarize: ".to_string()
}

fn default_max_input_len() -> usize {
    512
}

fn default_max_length() -> usize {
    150
}

fn default_min_length() -> usize {
    50
}

fn default_max_output_len() -> usize {
    512
}
