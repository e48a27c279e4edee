//! Router approval gate.
//!
//! The router can only move the sender's tokens after the token contract
//! records an allowance for it. The gate makes sure that allowance exists
//! before any transfer is signed:
//!
//! ```text
//! Unknown ─► Checking ─┬─► AlreadyGranted    (cache hit, or allowance already sufficient)
//!                      ├─► GrantedNow        (approve submitted and confirmed)
//!                      └─► NotGrantedFailed  (read or approve failed)
//! ```
//!
//! A cache hit skips the chain entirely. A miss always re-verifies on chain.
//! Only positive observations are cached.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::U256;

use crate::address::TronAddress;
use crate::approval_cache::{approval_key, ApprovalCache};
use crate::chain::ChainClient;
use crate::config::SmoothConfig;
use crate::SmoothError;

/// What is known about the router's authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Unknown,
    NotGranted,
    GrantedOnChain,
    GrantedCachedLocally,
}

/// Gate lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalPhase {
    Unknown,
    Checking,
    AlreadyGranted,
    GrantedNow,
    NotGrantedFailed,
}

/// Terminal outcome of [`ApprovalGate::check_approval`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    AlreadyGranted,
    GrantedNow,
    NotGrantedFailed { cause: SmoothError },
}

/// `granted` is true for both granted outcomes; the outcome tag only matters
/// for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalCheck {
    pub granted: bool,
    pub outcome: ApprovalOutcome,
}

impl ApprovalCheck {
    fn already_granted() -> Self {
        Self {
            granted: true,
            outcome: ApprovalOutcome::AlreadyGranted,
        }
    }

    fn granted_now() -> Self {
        Self {
            granted: true,
            outcome: ApprovalOutcome::GrantedNow,
        }
    }

    fn failed(cause: SmoothError) -> Self {
        Self {
            granted: false,
            outcome: ApprovalOutcome::NotGrantedFailed { cause },
        }
    }
}

pub struct ApprovalGate<C> {
    chain: Arc<C>,
    cache: Arc<dyn ApprovalCache>,
    owner: TronAddress,
    router: TronAddress,
    token: TronAddress,
    min_allowance: U256,
    approve_amount: U256,
    read_timeout: Duration,
    confirm_timeout: Duration,
    /// Serializes cold checks so concurrent callers never submit two approvals.
    cold_check: tokio::sync::Mutex<()>,
    phase: Mutex<ApprovalPhase>,
}

impl<C: ChainClient> ApprovalGate<C> {
    pub fn new(
        chain: Arc<C>,
        cache: Arc<dyn ApprovalCache>,
        owner: TronAddress,
        config: &SmoothConfig,
    ) -> Self {
        Self {
            chain,
            cache,
            owner,
            router: config.router,
            token: config.token,
            min_allowance: config.min_allowance,
            approve_amount: config.approve_amount,
            read_timeout: config.chain_timeout,
            confirm_timeout: config.approval_timeout,
            cold_check: tokio::sync::Mutex::new(()),
            phase: Mutex::new(ApprovalPhase::Unknown),
        }
    }

    fn key(&self) -> String {
        approval_key(self.owner, self.router)
    }

    fn phase_lock(&self) -> MutexGuard<'_, ApprovalPhase> {
        match self.phase.lock() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_phase(&self, phase: ApprovalPhase) {
        *self.phase_lock() = phase;
    }

    pub fn phase(&self) -> ApprovalPhase {
        self.phase_lock().clone()
    }

    /// Cache-only view; never touches the chain.
    pub fn cached_status(&self) -> ApprovalStatus {
        if self.cache.is_granted(&self.key()) {
            ApprovalStatus::GrantedCachedLocally
        } else {
            ApprovalStatus::Unknown
        }
    }

    /// Pure on-chain check; never writes the cache.
    pub async fn on_chain_status(&self) -> Result<ApprovalStatus, SmoothError> {
        let allowance = tokio::time::timeout(
            self.read_timeout,
            self.chain.allowance(self.token, self.owner, self.router),
        )
        .await
        .map_err(|_| {
            SmoothError::Timeout(format!(
                "allowance read timed out after {}s",
                self.read_timeout.as_secs_f32()
            ))
        })??;

        tracing::debug!(
            owner = %self.owner,
            router = %self.router,
            allowance = %allowance,
            "read router allowance"
        );

        // A zero allowance never authorizes anything, whatever the threshold.
        Ok(if !allowance.is_zero() && allowance >= self.min_allowance {
            ApprovalStatus::GrantedOnChain
        } else {
            ApprovalStatus::NotGranted
        })
    }

    pub async fn is_approved_on_chain(&self) -> Result<bool, SmoothError> {
        Ok(self.on_chain_status().await? == ApprovalStatus::GrantedOnChain)
    }

    fn remember(&self) {
        // The cache is only a shortcut: a failed write costs one extra read next time.
        if let Err(e) = self.cache.mark_granted(&self.key()) {
            tracing::warn!(error = %e, "failed to cache router approval");
        }
    }

    /// Ensure the router is approved, approving it if necessary.
    pub async fn check_approval(&self) -> ApprovalCheck {
        if self.cache.is_granted(&self.key()) {
            self.set_phase(ApprovalPhase::AlreadyGranted);
            return ApprovalCheck::already_granted();
        }

        let _guard = self.cold_check.lock().await;

        // Another caller may have finished while we waited.
        if self.cache.is_granted(&self.key()) {
            self.set_phase(ApprovalPhase::AlreadyGranted);
            return ApprovalCheck::already_granted();
        }

        self.set_phase(ApprovalPhase::Checking);

        let check = match self.on_chain_status().await {
            Ok(ApprovalStatus::GrantedOnChain) => {
                self.remember();
                ApprovalCheck::already_granted()
            }
            Ok(_) => self.grant().await,
            Err(e) => {
                tracing::error!(error = %e, "approval status check failed");
                ApprovalCheck::failed(e)
            }
        };

        self.set_phase(match &check.outcome {
            ApprovalOutcome::AlreadyGranted => ApprovalPhase::AlreadyGranted,
            ApprovalOutcome::GrantedNow => ApprovalPhase::GrantedNow,
            ApprovalOutcome::NotGrantedFailed { .. } => ApprovalPhase::NotGrantedFailed,
        });
        check
    }

    async fn grant(&self) -> ApprovalCheck {
        tracing::info!(
            owner = %self.owner,
            router = %self.router,
            token = %self.token,
            "router not approved, submitting approval"
        );

        let result = tokio::time::timeout(
            self.confirm_timeout,
            self.chain.approve(self.token, self.router, self.approve_amount),
        )
        .await;

        match result {
            Ok(Ok(tx_hash)) => {
                tracing::info!(tx = %tx_hash, "router approval confirmed");
                self.remember();
                ApprovalCheck::granted_now()
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "router approval failed");
                ApprovalCheck::failed(e)
            }
            Err(_) => {
                let e = SmoothError::Timeout(format!(
                    "approval not confirmed within {}s",
                    self.confirm_timeout.as_secs_f32()
                ));
                tracing::error!(error = %e, "router approval failed");
                ApprovalCheck::failed(e)
            }
        }
    }
}
