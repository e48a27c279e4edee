//! Transfer signing and recovery.
//!
//! The router verifies signatures made by Tron's `signMessageV2`: the packed
//! message is hashed with keccak256, that 32-byte digest is wrapped in the
//! Tron signed-message envelope, hashed again, and signed with secp256k1.
//! Signatures travel as `(r, s, v)` with Electrum `v` (27 or 28).

use alloy::primitives::{keccak256, Address, Signature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use serde::{Deserialize, Serialize};

use crate::address::TronAddress;
use crate::encoding::message_digest;
use crate::SmoothError;

/// Prefix of the Tron signed-message envelope, followed by the decimal length
/// of the signed payload (always 32 here).
pub const TRON_MESSAGE_PREFIX: &[u8] = b"\x19TRON Signed Message:\n";

/// Signing capability for the active account.
///
/// Implementations must never expose or log the underlying key.
pub trait Credential: Send + Sync {
    /// Account the credential signs for.
    fn address(&self) -> Address;

    /// Sign a 32-byte prehash.
    fn sign_hash(&self, hash: &B256) -> Result<Signature, SmoothError>;
}

impl Credential for PrivateKeySigner {
    fn address(&self) -> Address {
        alloy::signers::Signer::address(self)
    }

    fn sign_hash(&self, hash: &B256) -> Result<Signature, SmoothError> {
        self.sign_hash_sync(hash)
            .map_err(|e| SmoothError::Signing(format!("signing failed: {e}")))
    }
}

/// Signature split into the components the relay and router consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoverableSignature {
    pub r: B256,
    pub s: B256,
    /// 27 or 28
    pub v: u8,
}

impl RecoverableSignature {
    pub fn from_signature(sig: &Signature) -> Self {
        Self {
            r: B256::from(sig.r().to_be_bytes::<32>()),
            s: B256::from(sig.s().to_be_bytes::<32>()),
            v: 27 + u8::from(sig.v()),
        }
    }

    pub fn to_signature(&self) -> Result<Signature, SmoothError> {
        let parity = match self.v {
            27 | 0 => false,
            28 | 1 => true,
            v => {
                return Err(SmoothError::Signing(format!(
                    "invalid recovery id v={v}"
                )))
            }
        };
        Ok(Signature::new(
            U256::from_be_bytes(self.r.0),
            U256::from_be_bytes(self.s.0),
            parity,
        ))
    }

    /// 65 bytes `r ‖ s ‖ v`.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = self.v;
        out
    }

    /// `0x`-prefixed hex of the 65-byte form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", alloy::hex::encode(self.to_bytes()))
    }
}

/// Hash a 32-byte digest inside the Tron signed-message envelope.
pub fn tron_message_hash(digest: &B256) -> B256 {
    let mut buf = Vec::with_capacity(TRON_MESSAGE_PREFIX.len() + 2 + 32);
    buf.extend_from_slice(TRON_MESSAGE_PREFIX);
    buf.extend_from_slice(b"32");
    buf.extend_from_slice(digest.as_slice());
    keccak256(buf)
}

/// Sign a packed transfer message for `sender`.
///
/// Fails closed: a missing credential, a credential for a different account,
/// or a signature that does not recover to `sender` is a [`SmoothError::Signing`].
pub fn sign_transfer_message(
    message: &[u8],
    credential: Option<&dyn Credential>,
    sender: TronAddress,
) -> Result<RecoverableSignature, SmoothError> {
    let credential = credential
        .ok_or_else(|| SmoothError::Signing("no credential available for the active account".to_string()))?;

    if credential.address() != sender.evm() {
        return Err(SmoothError::Signing(format!(
            "credential does not control sender {sender}"
        )));
    }

    let digest = message_digest(message);
    let hash = tron_message_hash(&digest);
    tracing::debug!(digest = %digest, "signing transfer digest");

    let sig = credential.sign_hash(&hash)?;
    let signature = RecoverableSignature::from_signature(&sig);

    let recovered = recover_signer(message, &signature)?;
    if recovered != sender {
        return Err(SmoothError::Signing(format!(
            "signature recovers to {recovered}, expected {sender}"
        )));
    }

    Ok(signature)
}

/// Recover the account that signed `message`.
pub fn recover_signer(
    message: &[u8],
    signature: &RecoverableSignature,
) -> Result<TronAddress, SmoothError> {
    let hash = tron_message_hash(&message_digest(message));
    let sig = signature.to_signature()?;
    sig.recover_address_from_prehash(&hash)
        .map(TronAddress::from)
        .map_err(|e| SmoothError::Signing(format!("recovery failed: {e}")))
}
