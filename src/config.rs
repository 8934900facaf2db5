//! Application configuration loaded from environment variables.

use rust_decimal::Decimal;

use crate::errors::{Result, SettleError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Disbursement gateway endpoint; settlement runs fail without it
    pub payout_endpoint: Option<String>,
    /// How often (in seconds) the background scheduler runs a settlement batch
    pub settle_interval_secs: u64,
    /// Timeout (in seconds) applied to each disbursement call
    pub gateway_timeout_secs: u64,
    /// Platform fee percent used when a contribution carries none of its own
    pub default_fee_percent: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./settlement.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| SettleError::Config("Invalid API_PORT".to_string()))?,
            payout_endpoint: env_var("PAYOUT_ENDPOINT").ok(),
            settle_interval_secs: env_var("SETTLE_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| SettleError::Config("Invalid SETTLE_INTERVAL_SECS".to_string()))?,
            gateway_timeout_secs: env_var("GATEWAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| SettleError::Config("Invalid GATEWAY_TIMEOUT_SECS".to_string()))?,
            default_fee_percent: env_var("DEFAULT_FEE_PERCENT")
                .unwrap_or_else(|_| "2.5".to_string())
                .parse()
                .map_err(|_| SettleError::Config("Invalid DEFAULT_FEE_PERCENT".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| SettleError::Config(format!("Missing env var: {key}")))
}
