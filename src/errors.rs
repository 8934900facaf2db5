//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettleError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown fee category: {0}")]
    UnknownCategory(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A multi-step write partially succeeded (e.g. a contribution was
    /// claimed but its payout row could not be created). Must never be
    /// folded into a plain gateway or database failure.
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("Malformed stored value: {0}")]
    Data(String),
}

pub type Result<T> = std::result::Result<T, SettleError>;
