//! Payout dispatcher — the per-contribution settlement state machine.
//!
//! One contribution moves through four strictly ordered steps: fee
//! computation, the conditional claim, payout creation, and the spawned
//! disbursement call. Each step's success is a precondition for the next,
//! and every failure is folded into this item's outcome alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db;
use crate::errors::SettleError;
use crate::fees::{FeeEngine, FeeLine};
use crate::gateway::{DisburseRequest, GatewayClient};
use crate::models::{Contribution, PayoutStatus};
use crate::revenue;

/// Outcome of dispatching one contribution.
pub struct ItemOutcome {
    pub contribution_id: String,
    pub ok: bool,
    pub payout_id: Option<i64>,
    pub error: Option<String>,
    /// Handle of the in-flight disbursement task. The batch returns without
    /// awaiting it; its terminal outcome lands on the payout row.
    pub task: Option<JoinHandle<()>>,
}

impl ItemOutcome {
    fn failure(contribution_id: &str, error: String) -> Self {
        Self {
            contribution_id: contribution_id.to_string(),
            ok: false,
            payout_id: None,
            error: Some(error),
            task: None,
        }
    }
}

/// Settle one contribution: split its total, claim it, persist the payout,
/// and spawn the disbursement call.
pub async fn dispatch(
    pool: &SqlitePool,
    fees: &FeeEngine,
    gateway: &Arc<GatewayClient>,
    contribution: &Contribution,
    now: DateTime<Utc>,
) -> ItemOutcome {
    // Step 1: fee split. An unknown category or malformed policy stops this
    // item before any row is written.
    let split = match fees
        .calculate_contribution_fee(
            contribution.total_contributed,
            contribution.platform_fee_percent,
        )
        .await
    {
        Ok(split) => split,
        Err(e) => return ItemOutcome::failure(&contribution.id, e.to_string()),
    };

    // Step 2: conditional claim. Losing the claim means another settlement
    // run got here first; nothing was written on our side.
    match db::claim_contribution(pool, &contribution.id, now).await {
        Ok(true) => {}
        Ok(false) => {
            info!(
                "Contribution {} was claimed by a concurrent settlement run",
                contribution.id
            );
            return ItemOutcome::failure(
                &contribution.id,
                "contribution was claimed by a concurrent settlement run".to_string(),
            );
        }
        Err(e) => return ItemOutcome::failure(&contribution.id, e.to_string()),
    }

    // Step 3: payout row. The contribution is already payout_pending, so a
    // failure here leaves it claimed with no live payout — an inconsistency
    // that must be surfaced as such, not as a generic write error.
    let payout_id = match db::insert_payout(
        pool,
        db::NewPayout {
            contribution_id: &contribution.id,
            total_amount: split.gross_amount.to_string(),
            platform_fee: split.fee_amount.to_string(),
            net_amount: split.net_amount.to_string(),
        },
        now,
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            let err = SettleError::InconsistentState(format!(
                "contribution {} is payout_pending but its payout row could not be created: {e}",
                contribution.id
            ));
            error!("{err}");
            return ItemOutcome::failure(&contribution.id, err.to_string());
        }
    };

    // Step 4: disbursement, spawned so the batch does not block on the
    // gateway. The handle is handed back for callers that need to await
    // terminal outcomes (tests, drain-on-shutdown).
    let task = spawn_disbursement(
        pool.clone(),
        Arc::clone(gateway),
        payout_id,
        contribution.id.clone(),
        contribution.currency.clone(),
        split.into_line(format!("contribution:{}", contribution.id), now),
    );

    ItemOutcome {
        contribution_id: contribution.id.clone(),
        ok: true,
        payout_id: Some(payout_id),
        error: None,
        task: Some(task),
    }
}

fn spawn_disbursement(
    pool: SqlitePool,
    gateway: Arc<GatewayClient>,
    payout_id: i64,
    contribution_id: String,
    currency: String,
    line: FeeLine,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let request = DisburseRequest {
            payout_id,
            amount: line.net_amount,
            contribution_id,
            currency,
        };

        match gateway.disburse(&request).await {
            Ok(()) => {
                let done_at = Utc::now();
                match db::finish_payout(
                    &pool,
                    payout_id,
                    PayoutStatus::Completed,
                    None,
                    Some(done_at),
                )
                .await
                {
                    Ok(true) => {
                        if let Err(e) = revenue::record(&pool, &line).await {
                            error!("Failed to record revenue for payout {payout_id}: {e}");
                        }
                    }
                    Ok(false) => {
                        warn!("Payout {payout_id} already reached a terminal state");
                    }
                    Err(e) => error!("Failed to complete payout {payout_id}: {e}"),
                }
            }
            Err(e) => {
                let metadata =
                    serde_json::json!({ "error": e.to_string() }).to_string();
                match db::finish_payout(
                    &pool,
                    payout_id,
                    PayoutStatus::Failed,
                    Some(&metadata),
                    None,
                )
                .await
                {
                    Ok(true) => warn!("Payout {payout_id} failed: {e}"),
                    Ok(false) => {
                        warn!("Payout {payout_id} already reached a terminal state");
                    }
                    Err(update_err) => {
                        error!("Failed to mark payout {payout_id} failed: {update_err}");
                    }
                }
            }
        }
    })
}
