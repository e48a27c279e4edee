//! Immutable runtime configuration, sourced once at process start.

use std::time::Duration;

use alloy::primitives::U256;
use url::Url;

use crate::address::TronAddress;
use crate::amount::TokenAmount;
use crate::constants::*;
use crate::SmoothError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid address in {0}: {1}")]
    InvalidAddress(&'static str, String),

    #[error("invalid URL in {0}: {1}")]
    InvalidUrl(&'static str, String),

    #[error("invalid amount in {0}: {1}")]
    InvalidAmount(&'static str, String),

    #[error("invalid number in {0}: {1}")]
    InvalidNumber(&'static str, String),
}

impl From<ConfigError> for SmoothError {
    fn from(e: ConfigError) -> Self {
        SmoothError::Config(e.to_string())
    }
}

/// Everything the transfer flow needs to know about the chain, the router
/// deployment and the relay. Passed to the orchestrator at construction.
#[derive(Clone)]
pub struct SmoothConfig {
    pub chain_id: u64,
    /// Ethereum-compatible JSON-RPC endpoint for contract reads
    pub rpc_url: String,
    /// Tron full-node HTTP API (`/wallet/*`)
    pub tron_api_url: String,
    /// `TRON-PRO-API-KEY` for TronGrid (None = anonymous, rate limited)
    pub tron_api_key: Option<String>,
    /// Energy ceiling for approve transactions, in sun
    pub fee_limit_sun: u64,
    /// Relay API base URL; transfers are POSTed to `{relay_url}/transfer`
    pub relay_url: String,
    /// Bearer token for the relay (None = unauthenticated)
    pub relay_token: Option<String>,
    pub router: TronAddress,
    pub token: TronAddress,
    pub token_decimals: u8,
    pub fee_collector: TronAddress,
    pub fee: TokenAmount,
    /// An on-chain allowance at or above this counts as approved.
    pub min_allowance: U256,
    /// Allowance requested when the gate has to approve.
    pub approve_amount: U256,
    pub explorer_base: String,
    /// SQLite file for the approval cache (None = in-memory, per session)
    pub approval_db_path: Option<String>,
    pub chain_timeout: Duration,
    pub relay_timeout: Duration,
    pub approval_timeout: Duration,
}

impl std::fmt::Debug for SmoothConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmoothConfig")
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .field("tron_api_url", &self.tron_api_url)
            .field(
                "tron_api_key",
                &self.tron_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("fee_limit_sun", &self.fee_limit_sun)
            .field("relay_url", &self.relay_url)
            .field(
                "relay_token",
                &self.relay_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("router", &self.router)
            .field("token", &self.token)
            .field("token_decimals", &self.token_decimals)
            .field("fee_collector", &self.fee_collector)
            .field("fee", &self.fee)
            .field("min_allowance", &self.min_allowance)
            .field("approve_amount", &self.approve_amount)
            .field("explorer_base", &self.explorer_base)
            .field("approval_db_path", &self.approval_db_path)
            .field("chain_timeout", &self.chain_timeout)
            .field("relay_timeout", &self.relay_timeout)
            .field("approval_timeout", &self.approval_timeout)
            .finish()
    }
}

impl SmoothConfig {
    /// Mainnet USDT defaults for the given router deployment and relay.
    pub fn new(router: TronAddress, relay_url: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            chain_id: TRON_MAINNET_CHAIN_ID,
            rpc_url: RPC_URL.to_string(),
            tron_api_url: TRON_API_URL.to_string(),
            tron_api_key: None,
            fee_limit_sun: APPROVE_FEE_LIMIT_SUN,
            relay_url: relay_url.into().trim_end_matches('/').to_string(),
            relay_token: None,
            router,
            token: parse_address("SMOOTH_TOKEN_ADDRESS", USDT_ADDRESS)?,
            token_decimals: USDT_DECIMALS,
            fee_collector: parse_address("SMOOTH_FEE_COLLECTOR", FEE_COLLECTOR)?,
            fee: parse_amount("SMOOTH_FEE", SMOOTH_FEE, USDT_DECIMALS)?,
            min_allowance: U256::MAX >> 1,
            approve_amount: U256::MAX,
            explorer_base: EXPLORER_BASE.to_string(),
            approval_db_path: None,
            chain_timeout: CHAIN_READ_TIMEOUT,
            relay_timeout: RELAY_TIMEOUT,
            approval_timeout: APPROVAL_CONFIRM_TIMEOUT,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Required
        let router_raw = get("SMOOTH_ROUTER_ADDRESS")
            .ok_or(ConfigError::MissingRequired("SMOOTH_ROUTER_ADDRESS"))?;
        let router = parse_address("SMOOTH_ROUTER_ADDRESS", &router_raw)?;

        let relay_url =
            get("SMOOTH_RELAY_URL").ok_or(ConfigError::MissingRequired("SMOOTH_RELAY_URL"))?;
        Url::parse(&relay_url)
            .map_err(|e| ConfigError::InvalidUrl("SMOOTH_RELAY_URL", format!("{relay_url}: {e}")))?;

        let mut config = Self::new(router, relay_url)?;

        if let Some(rpc_url) = get("SMOOTH_RPC_URL") {
            Url::parse(&rpc_url)
                .map_err(|e| ConfigError::InvalidUrl("SMOOTH_RPC_URL", format!("{rpc_url}: {e}")))?;
            config.rpc_url = rpc_url;
        }

        if let Some(api_url) = get("SMOOTH_TRON_API_URL") {
            Url::parse(&api_url).map_err(|e| {
                ConfigError::InvalidUrl("SMOOTH_TRON_API_URL", format!("{api_url}: {e}"))
            })?;
            config.tron_api_url = api_url.trim_end_matches('/').to_string();
        }
        config.tron_api_key = get("SMOOTH_TRON_API_KEY");
        if let Some(raw) = get("SMOOTH_FEE_LIMIT_SUN") {
            config.fee_limit_sun = parse_number("SMOOTH_FEE_LIMIT_SUN", &raw)?;
        }

        config.relay_token = get("SMOOTH_RELAY_TOKEN");

        if let Some(raw) = get("SMOOTH_CHAIN_ID") {
            config.chain_id = parse_number("SMOOTH_CHAIN_ID", &raw)?;
        }
        if let Some(raw) = get("SMOOTH_TOKEN_ADDRESS") {
            config.token = parse_address("SMOOTH_TOKEN_ADDRESS", &raw)?;
        }
        if let Some(raw) = get("SMOOTH_TOKEN_DECIMALS") {
            config.token_decimals = parse_number("SMOOTH_TOKEN_DECIMALS", &raw)?;
        }
        if let Some(raw) = get("SMOOTH_FEE_COLLECTOR") {
            config.fee_collector = parse_address("SMOOTH_FEE_COLLECTOR", &raw)?;
        }
        // Re-parse the fee whenever decimals may have changed.
        let fee_raw = get("SMOOTH_FEE").unwrap_or_else(|| SMOOTH_FEE.to_string());
        config.fee = parse_amount("SMOOTH_FEE", &fee_raw, config.token_decimals)?;

        if let Some(raw) = get("SMOOTH_APPROVE_AMOUNT") {
            config.approve_amount = if raw.eq_ignore_ascii_case("max") {
                U256::MAX
            } else {
                raw.parse::<U256>().map_err(|e| {
                    ConfigError::InvalidNumber("SMOOTH_APPROVE_AMOUNT", format!("{raw}: {e}"))
                })?
            };
            if config.approve_amount.is_zero() {
                return Err(ConfigError::InvalidNumber(
                    "SMOOTH_APPROVE_AMOUNT",
                    format!("{raw}: approving zero grants nothing"),
                ));
            }
            if config.approve_amount < config.min_allowance {
                // A bounded approval must still satisfy the gate's own check.
                config.min_allowance = config.approve_amount;
            }
        }

        if let Some(raw) = get("SMOOTH_EXPLORER_URL") {
            config.explorer_base = raw.trim_end_matches('/').to_string();
        }
        config.approval_db_path = get("SMOOTH_APPROVAL_DB");

        if let Some(raw) = get("SMOOTH_CHAIN_TIMEOUT_SECS") {
            config.chain_timeout = Duration::from_secs(parse_number("SMOOTH_CHAIN_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = get("SMOOTH_RELAY_TIMEOUT_SECS") {
            config.relay_timeout = Duration::from_secs(parse_number("SMOOTH_RELAY_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = get("SMOOTH_APPROVAL_TIMEOUT_SECS") {
            config.approval_timeout =
                Duration::from_secs(parse_number("SMOOTH_APPROVAL_TIMEOUT_SECS", &raw)?);
        }

        if config.relay_token.is_none() {
            tracing::debug!("SMOOTH_RELAY_TOKEN not set, relay requests are unauthenticated");
        }

        Ok(config)
    }

    /// Explorer page for a relayed transaction.
    pub fn explorer_link(&self, tx_id: &str) -> String {
        format!("{}/#/transaction/{tx_id}", self.explorer_base)
    }
}

fn parse_address(var: &'static str, raw: &str) -> Result<TronAddress, ConfigError> {
    raw.parse()
        .map_err(|e: SmoothError| ConfigError::InvalidAddress(var, e.to_string()))
}

fn parse_amount(var: &'static str, raw: &str, decimals: u8) -> Result<TokenAmount, ConfigError> {
    TokenAmount::parse(raw, decimals).map_err(|e| ConfigError::InvalidAmount(var, e.to_string()))
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| ConfigError::InvalidNumber(var, format!("{raw}: {e}")))
}
