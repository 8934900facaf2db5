//! Contribution settlement service — entry point.
//!
//! Starts the background settlement scheduler that periodically finalizes
//! due contribution pools, and exposes an Axum REST API for the on-demand
//! trigger, payout lookups, fee administration, and revenue reporting.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use settlement::api::{self, ApiState};
use settlement::config::Config;
use settlement::db;
use settlement::fees::FeeEngine;
use settlement::gateway::GatewayClient;
use settlement::settlement::{self as engine, SettlementCtx};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by every disbursement call.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(config.gateway_timeout_secs))
        .build()?;

    let gateway = match &config.payout_endpoint {
        Some(endpoint) => Some(Arc::new(GatewayClient::new(client, endpoint.clone()))),
        None => {
            warn!("PAYOUT_ENDPOINT not set — settlement runs will fail until configured");
            None
        }
    };

    let ctx = Arc::new(SettlementCtx {
        pool: pool.clone(),
        fees: Arc::new(FeeEngine::new(pool, config.default_fee_percent)),
        gateway,
    });

    // ─── Background scheduler ─────────────────────────────
    tokio::spawn(engine::run(ctx.clone(), config.settle_interval_secs));

    // ─── REST API ─────────────────────────────────────────
    let state = ApiState { ctx };

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/settlement/run", post(api::run_settlement))
        .route("/contributions/:id/payout", get(api::get_contribution_payout))
        .route("/revenue/summary", get(api::revenue_summary))
        .route("/revenue/total", get(api::revenue_total))
        .route("/revenue/stats", get(api::revenue_stats))
        .route("/fees", get(api::list_fees))
        .route("/fees/:category", get(api::get_fee).put(api::update_fee))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
