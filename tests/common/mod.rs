//! Shared fixtures: an in-memory database, contribution seeding, and a
//! throwaway local disbursement gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::{routing::post, Router};
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use settlement::db;
use settlement::fees::FeeEngine;
use settlement::gateway::GatewayClient;
use settlement::models::fmt_ts;
use settlement::settlement::SettlementCtx;

/// One pooled in-memory database with migrations applied. A single
/// connection keeps the in-memory database alive for the whole test.
pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

pub fn make_ctx(pool: SqlitePool, endpoint: Option<String>) -> Arc<SettlementCtx> {
    make_ctx_with_timeout(pool, endpoint, Duration::from_secs(5))
}

pub fn make_ctx_with_timeout(
    pool: SqlitePool,
    endpoint: Option<String>,
    gateway_timeout: Duration,
) -> Arc<SettlementCtx> {
    let client = reqwest::Client::builder()
        .timeout(gateway_timeout)
        .build()
        .expect("build reqwest client");
    let gateway = endpoint.map(|endpoint| Arc::new(GatewayClient::new(client, endpoint)));
    Arc::new(SettlementCtx {
        pool: pool.clone(),
        fees: Arc::new(FeeEngine::new(pool, dec!(2.5))),
        gateway,
    })
}

pub async fn seed_contribution(
    pool: &SqlitePool,
    id: &str,
    total_contributed: &str,
    platform_fee_percent: Option<&str>,
    end_date: DateTime<Utc>,
    status: &str,
) {
    sqlx::query(
        r#"
        INSERT INTO contributions
            (id, title, total_contributed, currency, platform_fee_percent,
             end_date, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, 'USD', ?4, ?5, ?6, ?7, ?7)
        "#,
    )
    .bind(id)
    .bind(format!("pool {id}"))
    .bind(total_contributed)
    .bind(platform_fee_percent)
    .bind(fmt_ts(end_date))
    .bind(status)
    .bind(fmt_ts(Utc::now()))
    .execute(pool)
    .await
    .expect("seed contribution");
}

pub async fn contribution_status(pool: &SqlitePool, id: &str) -> &'static str {
    db::get_contribution_status(pool, id)
        .await
        .expect("contribution status")
        .expect("contribution exists")
        .as_str()
}

pub async fn count_payouts(pool: &SqlitePool, contribution_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM payouts WHERE contribution_id = ?1")
        .bind(contribution_id)
        .fetch_one(pool)
        .await
        .expect("count payouts")
}

pub async fn count_revenue_records(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM revenue_records")
        .fetch_one(pool)
        .await
        .expect("count revenue records")
}

/// Spawn a local disbursement gateway that answers every POST with the
/// given status and body. Returns the endpoint URL.
pub async fn spawn_gateway(status: u16, body: &'static str) -> String {
    let status = StatusCode::from_u16(status).expect("valid status");
    serve_gateway(Router::new().route("/disburse", post(move || async move { (status, body) })))
        .await
}

/// Spawn a gateway that sleeps past the caller's client timeout before
/// answering, to exercise the timeout failure path.
pub async fn spawn_slow_gateway(delay: Duration) -> String {
    serve_gateway(Router::new().route(
        "/disburse",
        post(move || async move {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, "late")
        }),
    ))
    .await
}

async fn serve_gateway(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock gateway");
    let addr = listener.local_addr().expect("mock gateway addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock gateway");
    });

    format!("http://{addr}/disburse")
}
