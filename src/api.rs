//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::errors::SettleError;
use crate::models::{parse_ts, FeeCategory, PayoutRow};
use crate::revenue;
use crate::settlement::{self, ItemResult, SettlementCtx};

#[derive(Clone)]
pub struct ApiState {
    pub ctx: Arc<SettlementCtx>,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SettlementResponse {
    pub results: Vec<ItemResult>,
}

#[derive(Serialize)]
pub struct PayoutResponse {
    pub payout: PayoutRow,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct RangeParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RangeParams {
    fn parse(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), SettleError> {
        let start = self.start.as_deref().map(parse_ts).transpose()?;
        let end = self.end.as_deref().map(parse_ts).transpose()?;
        Ok((start, end))
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /settlement/run`
///
/// Triggers one settlement batch at the current time and returns the
/// itemized result array. Disbursement calls may still be in flight when
/// the response is sent; their outcomes land on the payout rows.
pub async fn run_settlement(State(state): State<ApiState>) -> impl IntoResponse {
    match settlement::run_settlement(&state.ctx, Utc::now()).await {
        Ok(report) => (
            StatusCode::OK,
            Json(SettlementResponse {
                results: report.results,
            }),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /contributions/:id/payout`
///
/// The most recent settlement attempt for a contribution.
pub async fn get_contribution_payout(
    State(state): State<ApiState>,
    Path(contribution_id): Path<String>,
) -> impl IntoResponse {
    match db::latest_payout_for_contribution(&state.ctx.pool, &contribution_id).await {
        Ok(Some(payout)) => (StatusCode::OK, Json(PayoutResponse { payout })).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no payout for contribution {contribution_id}"),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /revenue/summary?start&end`
pub async fn revenue_summary(
    State(state): State<ApiState>,
    Query(params): Query<RangeParams>,
) -> impl IntoResponse {
    let (start, end) = match params.parse() {
        Ok(range) => range,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match revenue::summary_by_category(&state.ctx.pool, start, end).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({ "summary": summary })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /revenue/total?start&end`
pub async fn revenue_total(
    State(state): State<ApiState>,
    Query(params): Query<RangeParams>,
) -> impl IntoResponse {
    let (start, end) = match params.parse() {
        Ok(range) => range,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match revenue::total_revenue(&state.ctx.pool, start, end).await {
        Ok(total) => (
            StatusCode::OK,
            Json(serde_json::json!({ "total_revenue": total })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /revenue/stats`
pub async fn revenue_stats(State(state): State<ApiState>) -> impl IntoResponse {
    match revenue::revenue_stats(&state.ctx.pool).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /fees`
pub async fn list_fees(State(state): State<ApiState>) -> impl IntoResponse {
    match db::list_fee_configs(&state.ctx.pool).await {
        Ok(configs) => (
            StatusCode::OK,
            Json(serde_json::json!({ "fees": configs })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /fees/:category`
pub async fn get_fee(
    State(state): State<ApiState>,
    Path(category): Path<String>,
) -> impl IntoResponse {
    let category = match FeeCategory::parse(&category) {
        Ok(category) => category,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e),
    };
    match db::get_fee_config(&state.ctx.pool, category).await {
        Ok(Some(config)) => (StatusCode::OK, Json(config)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no fee policy for {}", category.as_str()),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Deserialize)]
pub struct UpdateFeeBody {
    pub fee_percentage: Decimal,
    pub min_fee: Decimal,
    pub max_fee: Decimal,
}

/// `PUT /fees/:category`
///
/// Admin update of a category's fee policy; takes effect on the next fee
/// computation without a restart.
pub async fn update_fee(
    State(state): State<ApiState>,
    Path(category): Path<String>,
    Json(body): Json<UpdateFeeBody>,
) -> impl IntoResponse {
    let category = match FeeCategory::parse(&category) {
        Ok(category) => category,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e),
    };

    match state
        .ctx
        .fees
        .update_config(category, body.fee_percentage, body.min_fee, body.max_fee)
        .await
    {
        Ok(true) => match db::get_fee_config(&state.ctx.pool, category).await {
            Ok(Some(config)) => (StatusCode::OK, Json(config)).into_response(),
            Ok(None) => error_response(
                StatusCode::NOT_FOUND,
                format!("no fee policy for {}", category.as_str()),
            ),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
        },
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            format!("no fee policy for {}", category.as_str()),
        ),
        Err(e @ SettleError::Config(_)) => error_response(StatusCode::BAD_REQUEST, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
