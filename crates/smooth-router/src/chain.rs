//! Chain access used by the nonce resolver and the approval gate.
//!
//! [`ChainClient`] is the injected handle. Two implementations:
//! - [`TronApiClient`] talks to the Tron node HTTP API and can submit
//!   approvals. The CLIs use it.
//! - [`RpcChainClient`] uses alloy contract bindings over an
//!   Ethereum-compatible JSON-RPC endpoint (Tron full nodes serve one under
//!   `/jsonrpc`). Tron's endpoint is read-only, so approvals through it only
//!   work against EVM-compatible nodes.

use std::future::Future;

use alloy::primitives::{TxHash, U256};
use alloy::providers::Provider;
use alloy::sol;

use crate::address::TronAddress;
use crate::SmoothError;

mod tron_api;

pub use tron_api::TronApiClient;

// Router read surface. `nonces` advances only when the router executes a
// signed transfer for `owner`.
sol! {
    #[sol(rpc)]
    interface SmoothRouter {
        function nonces(address owner) external view returns (uint256);
    }
}

// TRC-20 (ERC-20 compatible) token interface.
sol! {
    #[sol(rpc)]
    interface TRC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

/// Chain operations the transfer flow depends on.
pub trait ChainClient: Send + Sync {
    /// The router's current nonce for `owner`.
    fn router_nonce(
        &self,
        router: TronAddress,
        owner: TronAddress,
    ) -> impl Future<Output = Result<U256, SmoothError>> + Send;

    /// Token allowance `owner` has granted to `spender`.
    fn allowance(
        &self,
        token: TronAddress,
        owner: TronAddress,
        spender: TronAddress,
    ) -> impl Future<Output = Result<U256, SmoothError>> + Send;

    /// Token balance of `owner` in base units.
    fn balance_of(
        &self,
        token: TronAddress,
        owner: TronAddress,
    ) -> impl Future<Output = Result<U256, SmoothError>> + Send;

    /// Submit `approve(spender, amount)` from the signing account and wait
    /// for a successful receipt.
    fn approve(
        &self,
        token: TronAddress,
        spender: TronAddress,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, SmoothError>> + Send;
}

/// [`ChainClient`] over an alloy provider. Approvals need a provider built
/// with a wallet for the sender.
pub struct RpcChainClient<P> {
    provider: P,
}

impl<P> RpcChainClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> RpcChainClient<P>
where
    P: Provider + Send + Sync,
{
    /// Check RPC connectivity by fetching the latest block number.
    pub async fn health_check(&self) -> Result<u64, SmoothError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| SmoothError::ChainUnavailable(format!("health check failed: {e}")))
    }
}

impl<P> ChainClient for RpcChainClient<P>
where
    P: Provider + Send + Sync,
{
    async fn router_nonce(&self, router: TronAddress, owner: TronAddress) -> Result<U256, SmoothError> {
        let contract = SmoothRouter::new(router.evm(), &self.provider);
        contract
            .nonces(owner.evm())
            .call()
            .await
            .map_err(|e| SmoothError::ChainUnavailable(format!("nonces failed: {e}")))
    }

    async fn allowance(
        &self,
        token: TronAddress,
        owner: TronAddress,
        spender: TronAddress,
    ) -> Result<U256, SmoothError> {
        let contract = TRC20::new(token.evm(), &self.provider);
        contract
            .allowance(owner.evm(), spender.evm())
            .call()
            .await
            .map_err(|e| SmoothError::ChainUnavailable(format!("allowance failed: {e}")))
    }

    async fn balance_of(&self, token: TronAddress, owner: TronAddress) -> Result<U256, SmoothError> {
        let contract = TRC20::new(token.evm(), &self.provider);
        contract
            .balanceOf(owner.evm())
            .call()
            .await
            .map_err(|e| SmoothError::ChainUnavailable(format!("balanceOf failed: {e}")))
    }

    async fn approve(
        &self,
        token: TronAddress,
        spender: TronAddress,
        amount: U256,
    ) -> Result<TxHash, SmoothError> {
        let contract = TRC20::new(token.evm(), &self.provider);
        let pending = contract
            .approve(spender.evm(), amount)
            .send()
            .await
            .map_err(|e| SmoothError::ChainUnavailable(format!("approve send failed: {e}")))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| SmoothError::ChainUnavailable(format!("approve receipt failed: {e}")))?;

        if !receipt.status() {
            return Err(SmoothError::ApprovalDenied("approve reverted".to_string()));
        }

        Ok(receipt.transaction_hash)
    }
}
