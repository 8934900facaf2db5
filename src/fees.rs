//! Fee engine — percentage fees clamped into a per-category `[min, max]`
//! band, shared by every money-movement surface of the platform.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::db;
use crate::errors::{Result, SettleError};
use crate::models::{FeeCategory, FeeConfig};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// The outcome of one fee computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub gross_amount: Decimal,
    pub fee_percentage: Decimal,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub category: FeeCategory,
}

impl FeeBreakdown {
    /// Tag this split with an origin and timestamp for the revenue ledger.
    pub fn into_line(self, source: String, applied_at: DateTime<Utc>) -> FeeLine {
        FeeLine {
            category: self.category,
            source,
            gross_amount: self.gross_amount,
            fee_percentage: self.fee_percentage,
            fee_amount: self.fee_amount,
            net_amount: self.net_amount,
            applied_at,
        }
    }
}

/// One entry of a multi-source fee computation, tagged with its origin.
#[derive(Debug, Clone, Serialize)]
pub struct FeeLine {
    pub category: FeeCategory,
    pub source: String,
    pub gross_amount: Decimal,
    pub fee_percentage: Decimal,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub applied_at: DateTime<Utc>,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Pure clamp computation: `fee = clamp(amount * pct/100, min, max)`,
/// `net = amount - fee`, both rounded half-up to 2 decimal places.
/// Deterministic and I/O-free.
pub fn apply_fee(amount: Decimal, config: &FeeConfig) -> FeeBreakdown {
    let raw = amount * config.fee_percentage / HUNDRED;
    let fee_amount = round_money(raw.clamp(config.min_fee, config.max_fee));
    FeeBreakdown {
        gross_amount: amount,
        fee_percentage: config.fee_percentage,
        fee_amount,
        net_amount: round_money(amount - fee_amount),
        category: config.category,
    }
}

/// Fee-policy lookups with a per-instance cache over the `fee_configs`
/// table. The table is read-mostly; admin updates invalidate the cache.
pub struct FeeEngine {
    pool: SqlitePool,
    default_percent: Decimal,
    cache: RwLock<HashMap<FeeCategory, FeeConfig>>,
}

impl FeeEngine {
    pub fn new(pool: SqlitePool, default_percent: Decimal) -> Self {
        Self {
            pool,
            default_percent,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn config_for(&self, category: FeeCategory) -> Result<FeeConfig> {
        if let Some(config) = self.cache.read().await.get(&category) {
            return Ok(config.clone());
        }
        let config = db::get_fee_config(&self.pool, category)
            .await?
            .ok_or_else(|| SettleError::UnknownCategory(category.as_str().to_string()))?;
        self.cache
            .write()
            .await
            .insert(category, config.clone());
        Ok(config)
    }

    /// Calculate the fee split for one amount under a category's policy.
    pub async fn calculate_fee(&self, amount: Decimal, category: FeeCategory) -> Result<FeeBreakdown> {
        let config = self.config_for(category).await?;
        Ok(apply_fee(amount, &config))
    }

    /// Independent fee computation per `(amount, category, source)` tuple;
    /// no element's outcome depends on another.
    pub async fn calculate_multiple_fees(
        &self,
        items: &[(Decimal, FeeCategory, String)],
        now: DateTime<Utc>,
    ) -> Result<Vec<FeeLine>> {
        let mut lines = Vec::with_capacity(items.len());
        for (amount, category, source) in items {
            let split = self.calculate_fee(*amount, *category).await?;
            lines.push(FeeLine {
                category: *category,
                source: source.clone(),
                gross_amount: split.gross_amount,
                fee_percentage: split.fee_percentage,
                fee_amount: split.fee_amount,
                net_amount: split.net_amount,
                applied_at: now,
            });
        }
        Ok(lines)
    }

    /// Fee split for a pooled-contribution payout. The contribution's own
    /// fee percent (or the configured default) is applied under the creator
    /// fund category's clamp band.
    ///
    /// A pool smaller than the fee floor never disburses a negative net:
    /// the fee is capped at the pooled total and the net is zero.
    pub async fn calculate_contribution_fee(
        &self,
        amount: Decimal,
        percent_override: Option<Decimal>,
    ) -> Result<FeeBreakdown> {
        let mut config = self.config_for(FeeCategory::Creator).await?;
        config.fee_percentage = percent_override.unwrap_or(self.default_percent);
        let mut split = apply_fee(amount, &config);
        if split.fee_amount > amount {
            split.fee_amount = round_money(amount);
            split.net_amount = round_money(amount - split.fee_amount);
        }
        Ok(split)
    }

    /// Admin update of a category's fee policy. Rejects out-of-band values
    /// and invalidates the cache so the next lookup sees the new policy.
    pub async fn update_config(
        &self,
        category: FeeCategory,
        fee_percentage: Decimal,
        min_fee: Decimal,
        max_fee: Decimal,
    ) -> Result<bool> {
        if fee_percentage < Decimal::ZERO || fee_percentage > HUNDRED {
            return Err(SettleError::Config(format!(
                "fee_percentage must be within [0, 100], got {fee_percentage}"
            )));
        }
        if min_fee < Decimal::ZERO || min_fee > max_fee {
            return Err(SettleError::Config(format!(
                "fee bounds must satisfy 0 <= min <= max, got [{min_fee}, {max_fee}]"
            )));
        }

        let updated = db::update_fee_config(
            &self.pool,
            category,
            &fee_percentage.to_string(),
            &min_fee.to_string(),
            &max_fee.to_string(),
        )
        .await?;

        if updated {
            self.cache.write().await.remove(&category);
        }
        Ok(updated)
    }
}
