//! Batch orchestrator — one settlement run per trigger, plus the periodic
//! scheduler loop that drives it in the background.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::db;
use crate::dispatch;
use crate::errors::{Result, SettleError};
use crate::fees::FeeEngine;
use crate::gateway::GatewayClient;
use crate::models::Contribution;

/// Shared collaborators for settlement runs.
pub struct SettlementCtx {
    pub pool: SqlitePool,
    pub fees: Arc<FeeEngine>,
    /// Absent when `PAYOUT_ENDPOINT` is not configured; every run then
    /// fails up front instead of claiming contributions it cannot disburse.
    pub gateway: Option<Arc<GatewayClient>>,
}

/// One item of a batch's result array.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one settlement run. `tasks` holds the in-flight disbursement
/// handles; the run returns before they complete.
#[derive(Debug)]
pub struct SettlementReport {
    pub results: Vec<ItemResult>,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Run one settlement batch over everything due at `now`.
///
/// Fails as a whole only when the gateway endpoint is missing; every other
/// failure is folded into its own item of the result array and never stops
/// sibling contributions from being processed.
pub async fn run_settlement(ctx: &SettlementCtx, now: DateTime<Utc>) -> Result<SettlementReport> {
    let gateway = ctx
        .gateway
        .clone()
        .ok_or_else(|| SettleError::Config("PAYOUT_ENDPOINT is not configured".to_string()))?;

    let rows = db::find_eligible_contributions(&ctx.pool, now).await?;
    if !rows.is_empty() {
        info!("Settlement scan found {} due contribution(s)", rows.len());
    }

    let mut results = Vec::with_capacity(rows.len());
    let mut tasks = Vec::new();

    for row in rows {
        let id = row.id.clone();
        let contribution = match Contribution::try_from(row) {
            Ok(c) => c,
            Err(e) => {
                error!("Skipping malformed contribution {id}: {e}");
                results.push(ItemResult {
                    id,
                    ok: false,
                    payout_id: None,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let outcome = dispatch::dispatch(&ctx.pool, &ctx.fees, &gateway, &contribution, now).await;
        if let Some(task) = outcome.task {
            tasks.push(task);
        }
        results.push(ItemResult {
            id: outcome.contribution_id,
            ok: outcome.ok,
            payout_id: outcome.payout_id,
            error: outcome.error,
        });
    }

    Ok(SettlementReport { results, tasks })
}

/// Periodic scheduler: settle everything due, sleep, repeat. Run errors are
/// logged and the loop continues — the next tick re-scans from scratch.
pub async fn run(ctx: Arc<SettlementCtx>, interval_secs: u64) {
    info!("Settlement scheduler starting — interval {interval_secs}s");

    loop {
        match run_settlement(&ctx, Utc::now()).await {
            Ok(report) => {
                let failed = report.results.iter().filter(|r| !r.ok).count();
                if !report.results.is_empty() {
                    info!(
                        "Settlement batch dispatched {} contribution(s), {} failed",
                        report.results.len() - failed,
                        failed
                    );
                }
                // Disbursement tasks run to completion on their own; their
                // terminal outcomes are persisted on the payout rows.
                drop(report.tasks);
            }
            Err(e) => {
                error!("Settlement run error: {e}");
            }
        }

        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
    }
}
