//! Gasless USDT transfers on Tron through the Smooth router.
//!
//! The sender signs a packed meta-transaction; a relay pays the energy and
//! broadcasts it; the router contract checks the signature and nonce, then
//! moves `amount` to the recipient and a fixed fee to the fee collector.
//!
//! # Pieces
//!
//! - [`TransferOrchestrator`] runs one send end to end and broadcasts progress
//! - [`ApprovalGate`] makes sure the router holds a token allowance first
//! - [`NonceResolver`] reads the router's replay nonce right before signing
//! - [`RelayClient`] submits the signed transfer over HTTP
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use alloy::signers::local::PrivateKeySigner;
//! use smooth::{
//!     Credential, InMemoryApprovalCache, RelayClient, SmoothConfig, TokenAmount,
//!     TransferOrchestrator, TronAddress, TronApiClient,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SmoothConfig::from_env()?;
//! let signer: PrivateKeySigner = "0xYOUR_KEY".parse()?;
//! let sender: TronAddress = Credential::address(&signer).into();
//! let credential: Arc<dyn Credential> = Arc::new(signer);
//!
//! let chain = Arc::new(TronApiClient::from_config(&config)?.with_signer(credential.clone()));
//! let relay = RelayClient::from_config(&config)?;
//!
//! let orchestrator = TransferOrchestrator::new(
//!     config,
//!     sender,
//!     Some(credential),
//!     chain,
//!     Arc::new(InMemoryApprovalCache::new()),
//!     relay,
//! );
//!
//! let balance: TokenAmount = orchestrator.fetch_balance().await?;
//! let receipt = orchestrator
//!     .transfer("TPvSv9BofZrXP4NtkuSmY6X4qFt41yEF6x", "10", &balance)
//!     .await?;
//! println!("{}", receipt.tx_id);
//! # Ok(())
//! # }
//! ```

// Core types
pub mod address;
pub mod amount;
pub mod config;
pub mod constants;
pub mod error;
pub mod transfer;

// Message construction and signing
pub mod encoding;
pub mod signer;

// Chain state
pub mod approval;
pub mod approval_cache;
pub mod chain;
pub mod nonce;

// Relay and flow
pub mod orchestrator;
pub mod relay;

// Re-exports
pub use address::TronAddress;
pub use amount::{from_base_units, to_base_units, TokenAmount};
pub use approval::{ApprovalCheck, ApprovalGate, ApprovalOutcome, ApprovalPhase, ApprovalStatus};
pub use approval_cache::{approval_key, ApprovalCache, InMemoryApprovalCache};
pub use chain::{ChainClient, RpcChainClient, TronApiClient};
pub use config::{ConfigError, SmoothConfig};
pub use encoding::{encode_transfer, message_digest, transfer_digest};
pub use error::{FailureCause, SmoothError};
pub use nonce::NonceResolver;
pub use orchestrator::{TransferEvent, TransferOrchestrator, TransferState};
pub use relay::{relay_nonce, Relay, RelayClient, RelayTransferBody};
pub use signer::{recover_signer, sign_transfer_message, Credential, RecoverableSignature};
pub use transfer::{SignedTransfer, TransactionId, TransferReceipt, TransferRequest};

#[cfg(feature = "full")]
pub use approval_cache::SqliteApprovalCache;
