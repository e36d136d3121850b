use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::replay::CapPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid simulation setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data_api: DataApiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Participant addresses to analyze.
    #[serde(default = "default_traders")]
    pub traders: Vec<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataApiConfig {
    /// Data API base URL
    #[serde(default = "default_data_url")]
    pub url: String,
    /// Activity type filter passed as `type=`
    #[serde(default = "default_activity_type")]
    pub activity_type: String,
    /// Max trades fetched per participant
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Bankroll in USDC. Informational only.
    #[serde(default = "default_wallet_size")]
    pub wallet_size: f64,
    /// Fixed notional per simulated trade.
    #[serde(default = "default_per_trade")]
    pub per_trade: f64,
    /// Daily volume ceiling checked before each admission.
    #[serde(default = "default_max_daily_volume")]
    pub max_daily_volume: f64,
    /// Max USDC per position. Informational only.
    #[serde(default = "default_max_position")]
    pub max_position: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_data_url() -> String {
    "https://data-api.polymarket.com".to_string()
}
fn default_activity_type() -> String {
    "TRADE".to_string()
}
fn default_limit() -> usize {
    100
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_wallet_size() -> f64 {
    50.0
}
fn default_per_trade() -> f64 {
    2.0
}
fn default_max_daily_volume() -> f64 {
    20.0
}
fn default_max_position() -> f64 {
    10.0
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_traders() -> Vec<String> {
    vec![
        "0xc2e7800b5af46e6093872b177b7a5e7f0563be51".to_string(),
        "0xbddf61af533ff524d27154e589d2d7a81510c684".to_string(),
        "0x1f1dd8cf3d2c653edbdf319b81079bd753409a6f".to_string(),
    ]
}

impl Default for DataApiConfig {
    fn default() -> Self {
        Self {
            url: default_data_url(),
            activity_type: default_activity_type(),
            limit: default_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            wallet_size: default_wallet_size(),
            per_trade: default_per_trade(),
            max_daily_volume: default_max_daily_volume(),
            max_position: default_max_position(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SimulationConfig {
    /// Convert the float settings into the decimal policy the replay engine
    /// runs against. Per-trade notional must be positive and the remaining
    /// amounts non-negative.
    pub fn cap_policy(&self) -> Result<CapPolicy, ConfigError> {
        let per_trade = to_decimal("per_trade", self.per_trade)?;
        if per_trade <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "per_trade",
                reason: format!("must be positive, got {}", self.per_trade),
            });
        }

        Ok(CapPolicy {
            wallet_size: non_negative("wallet_size", self.wallet_size)?,
            per_trade,
            max_daily_volume: non_negative("max_daily_volume", self.max_daily_volume)?,
            max_position: non_negative("max_position", self.max_position)?,
        })
    }
}

fn to_decimal(field: &'static str, value: f64) -> Result<Decimal, ConfigError> {
    Decimal::from_str(&value.to_string()).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{} ({})", e, value),
    })
}

fn non_negative(field: &'static str, value: f64) -> Result<Decimal, ConfigError> {
    let d = to_decimal(field, value)?;
    if d < Decimal::ZERO {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("must not be negative, got {}", value),
        });
    }
    Ok(d)
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;

        if let Ok(url) = std::env::var("POLY_DATA_URL") {
            config.data_api.url = url;
        }

        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Built-in defaults with env overrides (no file needed).
    pub fn from_env() -> Self {
        Config {
            data_api: DataApiConfig {
                url: std::env::var("POLY_DATA_URL").unwrap_or_else(|_| default_data_url()),
                ..DataApiConfig::default()
            },
            simulation: SimulationConfig::default(),
            traders: default_traders(),
            logging: LoggingConfig::default(),
        }
    }
}
