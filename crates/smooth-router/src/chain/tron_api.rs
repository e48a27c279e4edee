//! [`ChainClient`] over the Tron full-node HTTP API (`/wallet/*`).
//!
//! Reads go through `triggerconstantcontract`. Approvals are built by the node
//! with `triggersmartcontract`, signed locally over the transaction id, sent
//! with `broadcasttransaction` and confirmed by polling
//! `gettransactioninfobyid` until the receipt lands.

use std::sync::Arc;
use std::time::Duration;

use alloy::hex;
use alloy::primitives::{TxHash, B256, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ChainClient, SmoothRouter, TRC20};
use crate::address::TronAddress;
use crate::config::SmoothConfig;
use crate::constants::RECEIPT_POLL_INTERVAL;
use crate::signer::{Credential, RecoverableSignature};
use crate::SmoothError;

const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

#[derive(Debug, Serialize)]
struct TriggerRequest {
    owner_address: TronAddress,
    contract_address: TronAddress,
    function_selector: &'static str,
    parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee_limit: Option<u64>,
    call_value: u64,
    visible: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ReturnStatus {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    #[serde(default)]
    result: ReturnStatus,
    #[serde(default)]
    constant_result: Vec<String>,
    /// Kept as raw JSON: it is signed and sent back to the node unchanged.
    #[serde(default)]
    transaction: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceReceipt {
    #[serde(default)]
    result: Option<String>,
}

/// `gettransactioninfobyid` answers `{}` until the transaction is in a block.
#[derive(Debug, Deserialize)]
struct TransactionInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    receipt: ResourceReceipt,
    #[serde(default, rename = "resMessage")]
    res_message: Option<String>,
}

/// Tron node HTTP client. Approvals need a signer for the owning account.
pub struct TronApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    signer: Option<Arc<dyn Credential>>,
    fee_limit_sun: u64,
    poll_interval: Duration,
}

impl std::fmt::Debug for TronApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TronApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("signer", &self.signer.as_ref().map(|s| s.address()))
            .field("fee_limit_sun", &self.fee_limit_sun)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl TronApiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SmoothError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SmoothError::Config(format!("tron API HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            signer: None,
            fee_limit_sun: crate::constants::APPROVE_FEE_LIMIT_SUN,
            poll_interval: RECEIPT_POLL_INTERVAL,
        })
    }

    pub fn from_config(config: &SmoothConfig) -> Result<Self, SmoothError> {
        Ok(Self::new(
            &config.tron_api_url,
            config.tron_api_key.clone(),
            config.chain_timeout,
        )?
        .with_fee_limit(config.fee_limit_sun))
    }

    /// Account that submits and signs approvals.
    pub fn with_signer(mut self, signer: Arc<dyn Credential>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_fee_limit(mut self, fee_limit_sun: u64) -> Self {
        self.fee_limit_sun = fee_limit_sun;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Latest block number as the node reports it.
    pub async fn health_check(&self) -> Result<u64, SmoothError> {
        let block: serde_json::Value = self.post("getnowblock", &serde_json::json!({})).await?;
        block
            .pointer("/block_header/raw_data/number")
            .and_then(|n| n.as_u64())
            .ok_or_else(|| SmoothError::ChainUnavailable("getnowblock returned no block number".into()))
    }

    async fn post<B, T>(&self, method: &str, body: &B) -> Result<T, SmoothError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/wallet/{method}", self.base_url);
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let resp = request.send().await.map_err(|e| transport_error(method, &e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| transport_error(method, &e))?;
        if !status.is_success() {
            return Err(SmoothError::ChainUnavailable(format!(
                "{method} returned HTTP {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| SmoothError::ChainUnavailable(format!("{method} response unreadable: {e}")))
    }

    async fn constant_call<C: SolCall>(
        &self,
        contract: TronAddress,
        owner: TronAddress,
        call: C,
    ) -> Result<U256, SmoothError> {
        let request = TriggerRequest {
            owner_address: owner,
            contract_address: contract,
            function_selector: C::SIGNATURE,
            parameter: call_parameter(&call),
            fee_limit: None,
            call_value: 0,
            visible: true,
        };
        let resp: TriggerResponse = self.post("triggerconstantcontract", &request).await?;
        if !resp.result.result {
            return Err(SmoothError::ChainUnavailable(format!(
                "{} failed: {}",
                C::SIGNATURE,
                describe(&resp.result.code, &resp.result.message)
            )));
        }

        let word = resp
            .constant_result
            .first()
            .and_then(|r| hex::decode(r).ok())
            .filter(|bytes| bytes.len() >= 32)
            .ok_or_else(|| {
                SmoothError::ChainUnavailable(format!("{} returned no value", C::SIGNATURE))
            })?;
        Ok(U256::from_be_slice(&word[..32]))
    }

    async fn broadcast_signed(
        &self,
        mut transaction: serde_json::Value,
        signature: &RecoverableSignature,
    ) -> Result<(), SmoothError> {
        let Some(object) = transaction.as_object_mut() else {
            return Err(SmoothError::ChainUnavailable(
                "triggersmartcontract returned a malformed transaction".into(),
            ));
        };
        object.insert(
            "signature".to_string(),
            serde_json::json!([hex::encode(signature.to_bytes())]),
        );

        let resp: BroadcastResponse = self.post("broadcasttransaction", &transaction).await?;
        if !resp.result {
            return Err(SmoothError::ApprovalDenied(format!(
                "broadcast rejected: {}",
                describe(&resp.code, &resp.message)
            )));
        }
        Ok(())
    }

    async fn wait_for_receipt(&self, tx_id: &str) -> Result<TransactionInfo, SmoothError> {
        let query = serde_json::json!({ "value": tx_id });
        loop {
            let info: TransactionInfo = self.post("gettransactioninfobyid", &query).await?;
            if info.id.is_some() {
                return Ok(info);
            }
            tracing::debug!(tx_id, "approval not yet in a block");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl ChainClient for TronApiClient {
    async fn router_nonce(&self, router: TronAddress, owner: TronAddress) -> Result<U256, SmoothError> {
        self.constant_call(router, owner, SmoothRouter::noncesCall { owner: owner.evm() })
            .await
    }

    async fn allowance(
        &self,
        token: TronAddress,
        owner: TronAddress,
        spender: TronAddress,
    ) -> Result<U256, SmoothError> {
        let call = TRC20::allowanceCall {
            owner: owner.evm(),
            spender: spender.evm(),
        };
        self.constant_call(token, owner, call).await
    }

    async fn balance_of(&self, token: TronAddress, owner: TronAddress) -> Result<U256, SmoothError> {
        self.constant_call(token, owner, TRC20::balanceOfCall { owner: owner.evm() })
            .await
    }

    async fn approve(
        &self,
        token: TronAddress,
        spender: TronAddress,
        amount: U256,
    ) -> Result<TxHash, SmoothError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| SmoothError::Signing("no credential to sign the approval".into()))?;
        let owner = TronAddress::from(signer.address());

        let call = TRC20::approveCall {
            spender: spender.evm(),
            value: amount,
        };
        let request = TriggerRequest {
            owner_address: owner,
            contract_address: token,
            function_selector: TRC20::approveCall::SIGNATURE,
            parameter: call_parameter(&call),
            fee_limit: Some(self.fee_limit_sun),
            call_value: 0,
            visible: true,
        };
        let resp: TriggerResponse = self.post("triggersmartcontract", &request).await?;
        let transaction = match resp.transaction {
            Some(tx) if resp.result.result => tx,
            _ => {
                return Err(SmoothError::ApprovalDenied(format!(
                    "approve not accepted by node: {}",
                    describe(&resp.result.code, &resp.result.message)
                )))
            }
        };

        let tx_hash = verified_tx_id(&transaction)?;
        let signature = RecoverableSignature::from_signature(&signer.sign_hash(&tx_hash)?);
        let tx_id = hex::encode(tx_hash);

        tracing::info!(tx_id = %tx_id, owner = %owner, "broadcasting approval");
        self.broadcast_signed(transaction, &signature).await?;

        let info = self.wait_for_receipt(&tx_id).await?;
        match info.receipt.result.as_deref() {
            Some("SUCCESS") => Ok(tx_hash),
            other => Err(SmoothError::ApprovalDenied(format!(
                "approve reverted ({}){}",
                other.unwrap_or("no receipt result"),
                info.res_message
                    .map(|m| format!(": {}", decode_message(&m)))
                    .unwrap_or_default()
            ))),
        }
    }
}

/// ABI arguments without the 4-byte selector; the node derives it from
/// `function_selector`.
fn call_parameter<C: SolCall>(call: &C) -> String {
    let encoded = call.abi_encode();
    hex::encode(&encoded[4..])
}

/// The id a node reports must be `sha256(raw_data_hex)`; only that hash is signed.
fn verified_tx_id(transaction: &serde_json::Value) -> Result<B256, SmoothError> {
    let reported = transaction
        .get("txID")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SmoothError::ChainUnavailable("transaction has no txID".into()))?;
    let raw = transaction
        .get("raw_data_hex")
        .and_then(|v| v.as_str())
        .and_then(|h| hex::decode(h).ok())
        .ok_or_else(|| SmoothError::ChainUnavailable("transaction has no raw_data_hex".into()))?;

    let computed = B256::from_slice(Sha256::digest(&raw).as_slice());
    if hex::encode(computed) != reported.trim_start_matches("0x").to_ascii_lowercase() {
        return Err(SmoothError::ApprovalDenied(format!(
            "node txID {reported} does not match its raw transaction"
        )));
    }
    Ok(computed)
}

/// Node messages are usually hex-encoded UTF-8.
fn decode_message(message: &str) -> String {
    hex::decode(message)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| message.to_string())
}

fn describe(code: &Option<String>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!("{code}: {}", decode_message(message)),
        (None, Some(message)) => decode_message(message),
        (Some(code), None) => code.clone(),
        (None, None) => "no reason given".to_string(),
    }
}

fn transport_error(method: &str, e: &reqwest::Error) -> SmoothError {
    if e.is_timeout() {
        SmoothError::Timeout(format!("{method}: {e}"))
    } else {
        SmoothError::ChainUnavailable(format!("{method} failed: {e}"))
    }
}
