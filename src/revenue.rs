//! Revenue ledger — append-only record of every collected fee, with
//! read-side aggregation for reporting. No write ever touches a prior row.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::errors::Result;
use crate::fees::FeeLine;
use crate::models::{fmt_ts, parse_amount, parse_ts};

/// Append one fee event to the ledger.
pub async fn record(pool: &SqlitePool, line: &FeeLine) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO revenue_records
            (category, source, gross_amount, fee_percentage, fee_amount, net_amount, recorded_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(line.category.as_str())
    .bind(&line.source)
    .bind(line.gross_amount.to_string())
    .bind(line.fee_percentage.to_string())
    .bind(line.fee_amount.to_string())
    .bind(line.net_amount.to_string())
    .bind(fmt_ts(line.applied_at))
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LedgerRow {
    category: String,
    fee_amount: String,
    gross_amount: String,
    recorded_at: String,
}

async fn fetch_range(
    pool: &SqlitePool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<LedgerRow>> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT category, fee_amount, gross_amount, recorded_at
        FROM   revenue_records
        WHERE  (?1 IS NULL OR recorded_at >= ?1)
          AND  (?2 IS NULL OR recorded_at <= ?2)
        "#,
    )
    .bind(start.map(fmt_ts))
    .bind(end.map(fmt_ts))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// One aggregated reporting bucket: a category on a calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueSummaryRow {
    pub category: String,
    pub date: String,
    pub fee_amount: Decimal,
    pub gross_amount: Decimal,
    pub count: u64,
}

/// Fees grouped by category and calendar day over an optional range.
pub async fn summary_by_category(
    pool: &SqlitePool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<RevenueSummaryRow>> {
    let rows = fetch_range(pool, start, end).await?;

    let mut grouped: HashMap<(String, String), RevenueSummaryRow> = HashMap::new();
    for row in rows {
        let date = parse_ts(&row.recorded_at)?.date_naive().to_string();
        let bucket = grouped
            .entry((row.category.clone(), date.clone()))
            .or_insert_with(|| RevenueSummaryRow {
                category: row.category.clone(),
                date,
                fee_amount: Decimal::ZERO,
                gross_amount: Decimal::ZERO,
                count: 0,
            });
        bucket.fee_amount += parse_amount(&row.fee_amount)?;
        bucket.gross_amount += parse_amount(&row.gross_amount)?;
        bucket.count += 1;
    }

    let mut summary: Vec<RevenueSummaryRow> = grouped.into_values().collect();
    summary.sort_by(|a, b| (&a.category, &a.date).cmp(&(&b.category, &b.date)));
    Ok(summary)
}

/// Total fee revenue over an optional range.
pub async fn total_revenue(
    pool: &SqlitePool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Decimal> {
    let rows = fetch_range(pool, start, end).await?;
    let mut total = Decimal::ZERO;
    for row in rows {
        total += parse_amount(&row.fee_amount)?;
    }
    Ok(total)
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueStats {
    pub total_revenue: Decimal,
    pub transaction_count: u64,
    pub average_fee_amount: Decimal,
    pub category_breakdown: HashMap<String, Decimal>,
}

/// Whole-ledger statistics for the admin dashboard.
pub async fn revenue_stats(pool: &SqlitePool) -> Result<RevenueStats> {
    let rows = fetch_range(pool, None, None).await?;

    let mut total = Decimal::ZERO;
    let mut breakdown: HashMap<String, Decimal> = HashMap::new();
    for row in &rows {
        let fee = parse_amount(&row.fee_amount)?;
        total += fee;
        *breakdown.entry(row.category.clone()).or_default() += fee;
    }

    let count = rows.len() as u64;
    let average = if count > 0 {
        (total / Decimal::from(count))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    } else {
        Decimal::ZERO
    };

    Ok(RevenueStats {
        total_revenue: total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        transaction_count: count,
        average_fee_amount: average,
        category_breakdown: breakdown,
    })
}
