//! Disbursement gateway client — the external service that actually moves
//! money to recipients. Only success/failure is consumed from responses.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::errors::{Result, SettleError};

/// Request body for one disbursement.
#[derive(Debug, Clone, Serialize)]
pub struct DisburseRequest {
    pub payout_id: i64,
    pub amount: Decimal,
    pub contribution_id: String,
    pub currency: String,
}

pub struct GatewayClient {
    client: Client,
    endpoint: String,
}

impl GatewayClient {
    pub fn new(client: Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    /// Issue one disbursement. Any non-2xx status or transport error
    /// (including the client-level timeout) is a [`SettleError::Gateway`]
    /// carrying whatever error text the gateway returned.
    pub async fn disburse(&self, request: &DisburseRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| SettleError::Gateway(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SettleError::Gateway(format!(
            "gateway returned {status}: {body}"
        )))
    }
}
