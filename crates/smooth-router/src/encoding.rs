//! Packed transfer message, byte-for-byte what the router contract rebuilds
//! with `abi.encodePacked` before recovering the signer.
//!
//! Layout (234 bytes):
//!
//! | field         | type      | bytes |
//! |---------------|-----------|-------|
//! | "Smooth"      | string    | 6     |
//! | chainId       | uint256   | 32    |
//! | router        | address   | 20    |
//! | token         | address   | 20    |
//! | sender        | address   | 20    |
//! | recipient     | address   | 20    |
//! | amount        | uint256   | 32    |
//! | feeCollector  | address   | 20    |
//! | fee           | uint256   | 32    |
//! | nonce         | uint256   | 32    |
//!
//! Field order is shared with the on-chain verifier. Changing it here
//! without a router upgrade invalidates every signature.

use alloy::primitives::{keccak256, B256, U256};
use alloy::sol_types::SolValue;

use crate::constants::DOMAIN_TAG;
use crate::transfer::TransferRequest;

/// Length of an encoded transfer message.
pub const ENCODED_LEN: usize = 6 + 32 + 20 * 4 + 32 + 20 + 32 + 32;

/// Encode the transfer and nonce in the router's packed layout.
pub fn encode_transfer(request: &TransferRequest, nonce: U256) -> Vec<u8> {
    (
        DOMAIN_TAG.to_string(),
        U256::from(request.chain_id),
        request.router.evm(),
        request.token.evm(),
        request.sender.evm(),
        request.recipient.evm(),
        request.amount.base_units(),
        request.fee_collector.evm(),
        request.fee.base_units(),
        nonce,
    )
        .abi_encode_packed()
}

/// keccak256 over the packed message.
pub fn message_digest(message: &[u8]) -> B256 {
    keccak256(message)
}

/// Encode and hash in one step.
pub fn transfer_digest(request: &TransferRequest, nonce: U256) -> B256 {
    message_digest(&encode_transfer(request, nonce))
}
