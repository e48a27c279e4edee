//! One-send-at-a-time transfer flow.
//!
//! ```text
//! Idle ─► ApprovalPending ─► NonceResolving ─► Signing ─► Relaying ─┬─► Succeeded ─► Idle
//!               │                  │              │                 └─► Failed ────► Idle
//!               └──────────────────┴──────────────┴──────────────────────► Failed ────► Idle
//! ```
//!
//! Input validation happens before the first transition, so a rejected input
//! never leaves `Idle` and never touches the network. Every transition is
//! broadcast; a UI follows progress by subscribing rather than being passed in.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::address::TronAddress;
use crate::amount::TokenAmount;
use crate::approval::{ApprovalCheck, ApprovalGate, ApprovalOutcome, ApprovalStatus};
use crate::approval_cache::ApprovalCache;
use crate::chain::ChainClient;
use crate::config::SmoothConfig;
use crate::encoding::{encode_transfer, message_digest};
use crate::error::FailureCause;
use crate::nonce::NonceResolver;
use crate::relay::{relay_nonce, Relay};
use crate::signer::{sign_transfer_message, Credential};
use crate::transfer::{SignedTransfer, TransactionId, TransferReceipt, TransferRequest};
use crate::SmoothError;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    ApprovalPending,
    NonceResolving,
    Signing,
    Relaying,
    Succeeded { tx_id: TransactionId },
    Failed { cause: FailureCause, reason: String },
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Succeeded { .. } | TransferState::Failed { .. })
    }
}

/// What subscribers receive: each state as it is entered.
pub type TransferEvent = TransferState;

/// Current state, broadcast channel and the in-flight flag.
struct Session {
    in_flight: AtomicBool,
    state: Mutex<TransferState>,
    events: broadcast::Sender<TransferEvent>,
}

impl Session {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            in_flight: AtomicBool::new(false),
            state: Mutex::new(TransferState::Idle),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransferState> {
        match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, next: TransferState) {
        *self.lock() = next.clone();
        // No subscribers is fine.
        let _ = self.events.send(next);
    }

    fn begin(&self) -> Result<FlightGuard<'_>, SmoothError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SmoothError::TransferInProgress)?;
        Ok(FlightGuard { session: self })
    }
}

/// Releases the in-flight flag and returns the session to `Idle`, including
/// when the transfer future is dropped mid-flight.
struct FlightGuard<'a> {
    session: &'a Session,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let abandoned = *self.session.lock() != TransferState::Idle;
        if abandoned {
            tracing::warn!("transfer abandoned before completion, returning to idle");
            self.session.emit(TransferState::Idle);
        }
        self.session.in_flight.store(false, Ordering::Release);
    }
}

/// Drives a send from validated input to a relay transaction id.
pub struct TransferOrchestrator<C, R> {
    config: SmoothConfig,
    sender: TronAddress,
    credential: Option<Arc<dyn Credential>>,
    chain: Arc<C>,
    gate: ApprovalGate<C>,
    nonces: NonceResolver<C>,
    relay: R,
    session: Session,
}

impl<C: ChainClient, R: Relay> TransferOrchestrator<C, R> {
    pub fn new(
        config: SmoothConfig,
        sender: TronAddress,
        credential: Option<Arc<dyn Credential>>,
        chain: Arc<C>,
        cache: Arc<dyn ApprovalCache>,
        relay: R,
    ) -> Self {
        let gate = ApprovalGate::new(chain.clone(), cache, sender, &config);
        let nonces = NonceResolver::new(chain.clone(), config.chain_timeout);
        Self {
            config,
            sender,
            credential,
            chain,
            gate,
            nonces,
            relay,
            session: Session::new(),
        }
    }

    pub fn config(&self) -> &SmoothConfig {
        &self.config
    }

    pub fn sender(&self) -> TronAddress {
        self.sender
    }

    pub fn state(&self) -> TransferState {
        self.session.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.session.events.subscribe()
    }

    pub fn approval_gate(&self) -> &ApprovalGate<C> {
        &self.gate
    }

    /// Make sure the router may spend the sender's tokens. Safe to call
    /// at any time; the transfer flow calls it too.
    pub async fn check_approval(&self) -> ApprovalCheck {
        self.gate.check_approval().await
    }

    pub fn cached_approval(&self) -> ApprovalStatus {
        self.gate.cached_status()
    }

    /// The sender's token balance as the chain reports it now.
    pub async fn fetch_balance(&self) -> Result<TokenAmount, SmoothError> {
        let units = tokio::time::timeout(
            self.config.chain_timeout,
            self.chain.balance_of(self.config.token, self.sender),
        )
        .await
        .map_err(|_| {
            SmoothError::Timeout(format!(
                "balance read timed out after {}s",
                self.config.chain_timeout.as_secs_f32()
            ))
        })??;
        TokenAmount::from_base_units(units, self.config.token_decimals)
    }

    /// Send `amount` to `recipient`, paying the protocol fee.
    ///
    /// `balance` is the sender balance the caller decided on (usually the one
    /// it displayed); `amount + fee` may not exceed it.
    pub async fn transfer(
        &self,
        recipient: &str,
        amount: &str,
        balance: &TokenAmount,
    ) -> Result<TransferReceipt, SmoothError> {
        let _flight = self.session.begin()?;

        let request = self.validate(recipient, amount, balance)?;

        match self.execute(&request).await {
            Ok(receipt) => {
                tracing::info!(
                    tx_id = %receipt.tx_id,
                    to = %request.recipient,
                    amount = %request.amount,
                    "transfer relayed"
                );
                self.session.emit(TransferState::Succeeded {
                    tx_id: receipt.tx_id.clone(),
                });
                self.session.emit(TransferState::Idle);
                Ok(receipt)
            }
            Err(e) => {
                tracing::error!(error = %e, to = %request.recipient, "transfer failed");
                self.session.emit(TransferState::Failed {
                    cause: e.cause(),
                    reason: e.to_string(),
                });
                self.session.emit(TransferState::Idle);
                Err(e)
            }
        }
    }

    fn validate(
        &self,
        recipient: &str,
        amount: &str,
        balance: &TokenAmount,
    ) -> Result<TransferRequest, SmoothError> {
        let recipient: TronAddress = recipient.trim().parse()?;
        let amount = TokenAmount::parse(amount.trim(), self.config.token_decimals)?;
        if amount.is_zero() {
            return Err(SmoothError::Range("amount must be greater than zero".to_string()));
        }

        let request = TransferRequest::new(&self.config, self.sender, recipient, amount)?;
        let debit = request.total_debit()?;
        if debit.checked_cmp(balance)? == CmpOrdering::Greater {
            return Err(SmoothError::Range(format!(
                "amount plus fee ({debit}) exceeds balance ({balance})"
            )));
        }
        Ok(request)
    }

    async fn execute(&self, request: &TransferRequest) -> Result<TransferReceipt, SmoothError> {
        self.session.emit(TransferState::ApprovalPending);
        let check = self.gate.check_approval().await;
        match check.outcome {
            ApprovalOutcome::AlreadyGranted => {}
            ApprovalOutcome::GrantedNow => {
                tracing::warn!(router = %request.router, "router approval was granted during transfer");
            }
            ApprovalOutcome::NotGrantedFailed { cause } => {
                return Err(match cause {
                    SmoothError::ApprovalDenied(_) => cause,
                    other => SmoothError::ApprovalDenied(other.to_string()),
                });
            }
        }

        self.session.emit(TransferState::NonceResolving);
        let nonce = self.nonces.current_nonce(request.sender, request.router).await?;
        relay_nonce(nonce)?;

        self.session.emit(TransferState::Signing);
        let message = encode_transfer(request, nonce);
        tracing::debug!(
            message = %alloy::hex::encode_prefixed(&message),
            digest = %message_digest(&message),
            "encoded transfer message"
        );
        let signature = sign_transfer_message(&message, self.credential.as_deref(), request.sender)?;

        self.session.emit(TransferState::Relaying);
        let signed = SignedTransfer {
            request: request.clone(),
            nonce,
            signature,
        };
        let tx_id = tokio::time::timeout(self.config.relay_timeout, self.relay.submit_transfer(signed))
            .await
            .map_err(|_| {
                SmoothError::Timeout(format!(
                    "relay did not answer within {}s",
                    self.config.relay_timeout.as_secs_f32()
                ))
            })??;

        Ok(TransferReceipt {
            tx_id,
            nonce,
            amount: request.amount,
            fee: request.fee,
        })
    }
}
