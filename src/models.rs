//! Domain types for the settlement engine.
//!
//! Amounts are stored as TEXT in SQLite and parsed into [`Decimal`] at the
//! row boundary; timestamps are stored as RFC 3339 TEXT so that lexicographic
//! comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettleError};

/// Format a timestamp for storage. All writes go through this helper so
/// stored values share one precision and stay lexicographically ordered.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SettleError::Data(format!("bad timestamp {raw:?}: {e}")))
}

pub fn parse_amount(raw: &str) -> Result<Decimal> {
    raw.parse()
        .map_err(|_| SettleError::Data(format!("bad amount {raw:?}")))
}

// ─────────────────────────────────────────────────────────
// Fee categories
// ─────────────────────────────────────────────────────────

/// Money-movement categories that carry a withdrawal fee policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeCategory {
    Marketplace,
    Crypto,
    Creator,
    Freelance,
}

impl FeeCategory {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "marketplace" => Ok(Self::Marketplace),
            "crypto" => Ok(Self::Crypto),
            "creator" => Ok(Self::Creator),
            "freelance" => Ok(Self::Freelance),
            other => Err(SettleError::UnknownCategory(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Marketplace => "marketplace",
            Self::Crypto => "crypto",
            Self::Creator => "creator",
            Self::Freelance => "freelance",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Contributions
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionStatus {
    Active,
    PayoutPending,
    Completed,
    Failed,
}

impl ContributionStatus {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "active" => Ok(Self::Active),
            "payout_pending" => Ok(Self::PayoutPending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(SettleError::Data(format!("bad contribution status {other:?}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PayoutPending => "payout_pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A contribution row as stored in / read from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContributionRow {
    pub id: String,
    pub title: String,
    pub total_contributed: String,
    pub currency: String,
    pub platform_fee_percent: Option<String>,
    pub end_date: String,
    pub status: String,
}

/// A pooled fund with a closing deadline.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub id: String,
    pub title: String,
    pub total_contributed: Decimal,
    pub currency: String,
    /// Per-contribution override of the platform fee percent.
    pub platform_fee_percent: Option<Decimal>,
    pub end_date: DateTime<Utc>,
    pub status: ContributionStatus,
}

impl TryFrom<ContributionRow> for Contribution {
    type Error = SettleError;

    fn try_from(row: ContributionRow) -> Result<Self> {
        Ok(Contribution {
            total_contributed: parse_amount(&row.total_contributed)?,
            platform_fee_percent: row
                .platform_fee_percent
                .as_deref()
                .map(parse_amount)
                .transpose()?,
            end_date: parse_ts(&row.end_date)?,
            status: ContributionStatus::parse(&row.status)?,
            id: row.id,
            title: row.title,
            currency: row.currency,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Payouts
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(SettleError::Data(format!("bad payout status {other:?}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PayoutRow {
    pub id: i64,
    pub contribution_id: String,
    pub total_amount: String,
    pub platform_fee: String,
    pub net_amount: String,
    pub status: String,
    pub metadata: Option<String>,
    pub processed_at: Option<String>,
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────
// Fee configuration
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeeConfigRow {
    pub category: String,
    pub fee_percentage: String,
    pub min_fee: String,
    pub max_fee: String,
    pub description: String,
}

/// Per-category fee policy: a percentage clamped into `[min_fee, max_fee]`.
#[derive(Debug, Clone, Serialize)]
pub struct FeeConfig {
    pub category: FeeCategory,
    pub fee_percentage: Decimal,
    pub min_fee: Decimal,
    pub max_fee: Decimal,
    pub description: String,
}

impl TryFrom<FeeConfigRow> for FeeConfig {
    type Error = SettleError;

    fn try_from(row: FeeConfigRow) -> Result<Self> {
        let config = FeeConfig {
            category: FeeCategory::parse(&row.category)?,
            fee_percentage: parse_amount(&row.fee_percentage)?,
            min_fee: parse_amount(&row.min_fee)?,
            max_fee: parse_amount(&row.max_fee)?,
            description: row.description,
        };
        // A corrupted row must fail here, not panic inside the clamp.
        if config.fee_percentage < Decimal::ZERO || config.fee_percentage > Decimal::ONE_HUNDRED {
            return Err(SettleError::Data(format!(
                "fee_percentage for {} out of [0, 100]: {}",
                config.category.as_str(),
                config.fee_percentage
            )));
        }
        if config.min_fee < Decimal::ZERO || config.min_fee > config.max_fee {
            return Err(SettleError::Data(format!(
                "fee band for {} is invalid: [{}, {}]",
                config.category.as_str(),
                config.min_fee,
                config.max_fee
            )));
        }
        Ok(config)
    }
}
