use std::fmt;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::address::TronAddress;
use crate::amount::TokenAmount;
use crate::config::SmoothConfig;
use crate::signer::RecoverableSignature;
use crate::SmoothError;

/// The canonical fields of one user-initiated send. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub sender: TronAddress,
    pub recipient: TronAddress,
    pub amount: TokenAmount,
    pub fee: TokenAmount,
    pub fee_collector: TronAddress,
    pub token: TronAddress,
    pub router: TronAddress,
    pub chain_id: u64,
}

impl TransferRequest {
    /// Fill the protocol fields (fee, collector, token, router, chain) from config.
    pub fn new(
        config: &SmoothConfig,
        sender: TronAddress,
        recipient: TronAddress,
        amount: TokenAmount,
    ) -> Result<Self, SmoothError> {
        if amount.decimals() != config.token_decimals {
            return Err(SmoothError::Range(format!(
                "amount has {} decimals, token uses {}",
                amount.decimals(),
                config.token_decimals
            )));
        }
        Ok(Self {
            sender,
            recipient,
            amount,
            fee: config.fee,
            fee_collector: config.fee_collector,
            token: config.token,
            router: config.router,
            chain_id: config.chain_id,
        })
    }

    /// Amount plus fee: what leaves the sender's balance.
    pub fn total_debit(&self) -> Result<TokenAmount, SmoothError> {
        self.amount.checked_add(&self.fee)
    }
}

/// A request bound to the router nonce it was signed against.
///
/// Consumed by relay submission and never reused: the signature is only valid
/// while the router's nonce for the sender still equals `nonce`.
#[derive(Debug, PartialEq, Eq)]
pub struct SignedTransfer {
    pub request: TransferRequest,
    pub nonce: U256,
    pub signature: RecoverableSignature,
}

/// Transaction id reported by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful `transfer` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub tx_id: TransactionId,
    pub nonce: U256,
    pub amount: TokenAmount,
    pub fee: TokenAmount,
}
