//! Database layer — migrations, the settlement scanner, the contribution
//! claim, and payout / fee-config queries.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::Result;
use crate::models::{
    fmt_ts, ContributionRow, ContributionStatus, FeeCategory, FeeConfig, FeeConfigRow, PayoutRow,
    PayoutStatus,
};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Settlement scanner
// ─────────────────────────────────────────────────────────

/// Contributions whose collection window has closed and that are still open.
///
/// Read-only; returns an empty list when nothing is due. Result ordering is
/// unspecified and callers must not depend on it. Rows are returned raw so
/// that one malformed record fails only its own batch item, not the scan.
pub async fn find_eligible_contributions(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<ContributionRow>> {
    let rows = sqlx::query_as::<_, ContributionRow>(
        r#"
        SELECT id, title, total_contributed, currency, platform_fee_percent,
               end_date, status
        FROM   contributions
        WHERE  status = 'active' AND end_date <= ?1
        "#,
    )
    .bind(fmt_ts(now))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Claim a contribution for settlement with a conditional update.
///
/// The `WHERE status = 'active'` guard makes the claim atomic: of any number
/// of concurrent settlement runs, exactly one sees an affected row and may
/// proceed to create a payout. Returns `false` when another run won.
pub async fn claim_contribution(
    pool: &SqlitePool,
    contribution_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = sqlx::query(
        r#"
        UPDATE contributions
        SET    status = 'payout_pending', updated_at = ?2
        WHERE  id = ?1 AND status = 'active'
        "#,
    )
    .bind(contribution_id)
    .bind(fmt_ts(now))
    .execute(pool)
    .await?
    .rows_affected();

    Ok(affected == 1)
}

pub async fn get_contribution_status(
    pool: &SqlitePool,
    contribution_id: &str,
) -> Result<Option<ContributionStatus>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM contributions WHERE id = ?1")
        .bind(contribution_id)
        .fetch_optional(pool)
        .await?;
    row.map(|(s,)| ContributionStatus::parse(&s)).transpose()
}

// ─────────────────────────────────────────────────────────
// Payouts
// ─────────────────────────────────────────────────────────

pub struct NewPayout<'a> {
    pub contribution_id: &'a str,
    pub total_amount: String,
    pub platform_fee: String,
    pub net_amount: String,
}

/// Insert a payout in `processing` state and return its id.
pub async fn insert_payout(
    pool: &SqlitePool,
    payout: NewPayout<'_>,
    now: DateTime<Utc>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO payouts
            (contribution_id, total_amount, platform_fee, net_amount, status, created_at)
        VALUES (?1, ?2, ?3, ?4, 'processing', ?5)
        RETURNING id
        "#,
    )
    .bind(payout.contribution_id)
    .bind(&payout.total_amount)
    .bind(&payout.platform_fee)
    .bind(&payout.net_amount)
    .bind(fmt_ts(now))
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Move a payout to a terminal state. The `status = 'processing'` guard keeps
/// terminal states immutable: a second transition affects zero rows.
pub async fn finish_payout(
    pool: &SqlitePool,
    payout_id: i64,
    status: PayoutStatus,
    metadata: Option<&str>,
    processed_at: Option<DateTime<Utc>>,
) -> Result<bool> {
    let affected = sqlx::query(
        r#"
        UPDATE payouts
        SET    status = ?2, metadata = ?3, processed_at = ?4
        WHERE  id = ?1 AND status = 'processing'
        "#,
    )
    .bind(payout_id)
    .bind(status.as_str())
    .bind(metadata)
    .bind(processed_at.map(fmt_ts))
    .execute(pool)
    .await?
    .rows_affected();

    Ok(affected == 1)
}

pub async fn get_payout(pool: &SqlitePool, payout_id: i64) -> Result<Option<PayoutRow>> {
    let row = sqlx::query_as::<_, PayoutRow>(
        r#"
        SELECT id, contribution_id, total_amount, platform_fee, net_amount,
               status, metadata, processed_at, created_at
        FROM   payouts
        WHERE  id = ?1
        "#,
    )
    .bind(payout_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The most recent payout attempt for a contribution, if any.
pub async fn latest_payout_for_contribution(
    pool: &SqlitePool,
    contribution_id: &str,
) -> Result<Option<PayoutRow>> {
    let row = sqlx::query_as::<_, PayoutRow>(
        r#"
        SELECT id, contribution_id, total_amount, platform_fee, net_amount,
               status, metadata, processed_at, created_at
        FROM   payouts
        WHERE  contribution_id = ?1
        ORDER  BY id DESC
        LIMIT  1
        "#,
    )
    .bind(contribution_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Fee configuration
// ─────────────────────────────────────────────────────────

pub async fn get_fee_config(
    pool: &SqlitePool,
    category: FeeCategory,
) -> Result<Option<FeeConfig>> {
    let row = sqlx::query_as::<_, FeeConfigRow>(
        r#"
        SELECT category, fee_percentage, min_fee, max_fee, description
        FROM   fee_configs
        WHERE  category = ?1
        "#,
    )
    .bind(category.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(FeeConfig::try_from).transpose()
}

pub async fn list_fee_configs(pool: &SqlitePool) -> Result<Vec<FeeConfig>> {
    let rows = sqlx::query_as::<_, FeeConfigRow>(
        r#"
        SELECT category, fee_percentage, min_fee, max_fee, description
        FROM   fee_configs
        ORDER  BY category ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(FeeConfig::try_from).collect()
}

/// Persist a new fee policy for a category. Returns `false` when the
/// category has no seeded row.
pub async fn update_fee_config(
    pool: &SqlitePool,
    category: FeeCategory,
    fee_percentage: &str,
    min_fee: &str,
    max_fee: &str,
) -> Result<bool> {
    let affected = sqlx::query(
        r#"
        UPDATE fee_configs
        SET    fee_percentage = ?2, min_fee = ?3, max_fee = ?4
        WHERE  category = ?1
        "#,
    )
    .bind(category.as_str())
    .bind(fee_percentage)
    .bind(min_fee)
    .bind(max_fee)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(affected == 1)
}
