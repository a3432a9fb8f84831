use serde::Deserialize;
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConfig {
    #[serde(default)]
    pub series_ids: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_lookback")]
    pub lookback_days: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            series_ids: Vec::new(),
            symbols: Vec::new(),
            exchange: default_exchange(),
            interval_seconds: default_interval(),
            lookback_days: default_lookback(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub fred_api_key: String,
    #[serde(default)]
    pub eod_api_key: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_database_path() -> String {
    "data.db".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_exchange() -> String {
    "US".to_string()
}

fn default_interval() -> u64 {
    86_400
}

fn default_lookback() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(serde_json::from_str(content)?)
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
