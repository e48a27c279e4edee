//! HTTP client for the relay service that pays gas and broadcasts signed
//! transfers.
//!
//! Endpoint: `POST {base_url}/transfer`. A 2xx answer carries `{"txID": "…"}`;
//! anything else is a rejection with a diagnostic body. Submissions are never
//! retried: a rejected signature is bound to a nonce that may already be spent.

use std::future::Future;
use std::time::{Duration, Instant};

use alloy::hex;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::address::TronAddress;
use crate::transfer::{SignedTransfer, TransactionId};
use crate::SmoothError;

/// Submits signed transfers to a relay.
pub trait Relay: Send + Sync {
    /// Consumes the signed transfer: it is spent whatever the outcome.
    fn submit_transfer(
        &self,
        transfer: SignedTransfer,
    ) -> impl Future<Output = Result<TransactionId, SmoothError>> + Send;
}

/// JSON body of `POST /transfer`. Amounts are base units as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTransferBody {
    pub usdt_address: TronAddress,
    pub from: TronAddress,
    pub to: TronAddress,
    pub transfer_amount: String,
    pub fee_collector: TronAddress,
    pub fee_amount: String,
    pub nonce: u64,
    pub v: u8,
    pub r: String,
    pub s: String,
}

impl RelayTransferBody {
    pub fn from_signed(transfer: &SignedTransfer) -> Result<Self, SmoothError> {
        let request = &transfer.request;
        let nonce = relay_nonce(transfer.nonce)?;
        Ok(Self {
            usdt_address: request.token,
            from: request.sender,
            to: request.recipient,
            transfer_amount: request.amount.base_units().to_string(),
            fee_collector: request.fee_collector,
            fee_amount: request.fee.base_units().to_string(),
            nonce,
            v: transfer.signature.v,
            r: hex::encode_prefixed(transfer.signature.r),
            s: hex::encode_prefixed(transfer.signature.s),
        })
    }
}

/// The relay API carries the nonce as a JSON integer, so it must fit in 64 bits.
pub fn relay_nonce(nonce: U256) -> Result<u64, SmoothError> {
    u64::try_from(nonce)
        .map_err(|_| SmoothError::Range(format!("nonce {nonce} does not fit the relay API")))
}

#[derive(Debug, Deserialize)]
struct RelayTransferResponse {
    #[serde(rename = "txID")]
    tx_id: String,
}

/// [`Relay`] over reqwest.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RelayClient {
    /// Redirects are disabled so the signed body only ever reaches `base_url`.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SmoothError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SmoothError::Config(format!("relay HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &crate::config::SmoothConfig) -> Result<Self, SmoothError> {
        Self::new(
            &config.relay_url,
            config.relay_token.clone(),
            config.relay_timeout,
        )
    }

    pub fn transfer_url(&self) -> String {
        format!("{}/transfer", self.base_url)
    }

    async fn post_transfer(&self, body: &RelayTransferBody) -> Result<TransactionId, SmoothError> {
        let mut request = self.http.post(self.transfer_url()).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|e| transport_error(&e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            return Err(SmoothError::RelayRejected {
                status: Some(status.as_u16()),
                reason: rejection_reason(&text, status),
                body: text,
            });
        }

        let parsed: RelayTransferResponse =
            serde_json::from_str(&text).map_err(|e| SmoothError::RelayRejected {
                status: Some(status.as_u16()),
                reason: format!("unreadable relay response: {e}"),
                body: text.clone(),
            })?;
        Ok(TransactionId(parsed.tx_id))
    }
}

impl Relay for RelayClient {
    async fn submit_transfer(&self, transfer: SignedTransfer) -> Result<TransactionId, SmoothError> {
        let body = RelayTransferBody::from_signed(&transfer)?;
        tracing::info!(
            from = %body.from,
            to = %body.to,
            amount = %body.transfer_amount,
            nonce = body.nonce,
            "submitting transfer to relay"
        );

        let started = Instant::now();
        let result = self.post_transfer(&body).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(tx_id) => tracing::info!(tx_id = %tx_id, latency_ms, "relay accepted transfer"),
            Err(e) => tracing::warn!(error = %e, latency_ms, "relay did not accept transfer"),
        }
        result
    }
}

fn transport_error(e: &reqwest::Error) -> SmoothError {
    if e.is_timeout() {
        SmoothError::Timeout(format!("relay request: {e}"))
    } else {
        SmoothError::RelayRejected {
            status: None,
            reason: format!("relay request failed: {e}"),
            body: String::new(),
        }
    }
}

/// Prefer the relay's own `error` or `message` field, then the raw body.
fn rejection_reason(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["error", "message"] {
            if let Some(reason) = value.get(field).and_then(|v| v.as_str()) {
                return reason.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("empty response")
            .to_string()
    } else {
        trimmed.to_string()
    }
}
