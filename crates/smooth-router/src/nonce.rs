use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;

use crate::address::TronAddress;
use crate::chain::ChainClient;
use crate::SmoothError;

/// Reads the router's replay nonce for a sender.
///
/// There is no cache: the value must be read for every attempt, right before
/// encoding, because only the router advances it and a stale value yields a
/// signature the router rejects.
pub struct NonceResolver<C> {
    chain: Arc<C>,
    timeout: Duration,
}

impl<C: ChainClient> NonceResolver<C> {
    pub fn new(chain: Arc<C>, timeout: Duration) -> Self {
        Self { chain, timeout }
    }

    pub async fn current_nonce(
        &self,
        sender: TronAddress,
        router: TronAddress,
    ) -> Result<U256, SmoothError> {
        let nonce = tokio::time::timeout(self.timeout, self.chain.router_nonce(router, sender))
            .await
            .map_err(|_| {
                SmoothError::Timeout(format!(
                    "router nonce read timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| match e {
                SmoothError::ChainUnavailable(_) => e,
                other => SmoothError::ChainUnavailable(other.to_string()),
            })?;

        tracing::debug!(sender = %sender, router = %router, nonce = %nonce, "resolved router nonce");
        Ok(nonce)
    }
}
