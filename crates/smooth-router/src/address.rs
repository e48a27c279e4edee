//! Tron account addresses.
//!
//! A Tron address is a 20-byte account id, the same shape as an EVM address,
//! shown to users as base58check over `0x41 ‖ id`. The router contract and
//! the packed message only ever see the 20-byte form.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::SmoothError;

/// Version byte prefixed to every mainnet Tron address.
pub const TRON_ADDRESS_PREFIX: u8 = 0x41;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TronAddress(Address);

impl TronAddress {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(Address::new(bytes))
    }

    /// The 20-byte account id used by contracts and the packed encoder.
    pub fn evm(&self) -> Address {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0 .0 .0
    }

    /// Canonical base58check text (`T...`).
    pub fn to_base58(&self) -> String {
        let mut versioned = [0u8; 21];
        versioned[0] = TRON_ADDRESS_PREFIX;
        versioned[1..].copy_from_slice(self.0.as_slice());
        bs58::encode(versioned).with_check().into_string()
    }

    /// Lowercase hex of the 21-byte versioned form (`41...`), as the Tron APIs print it.
    pub fn to_tron_hex(&self) -> String {
        format!("{TRON_ADDRESS_PREFIX:02x}{}", alloy::hex::encode(self.0))
    }

    /// Strict base58check parse.
    pub fn from_base58(s: &str) -> Result<Self, SmoothError> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| SmoothError::InvalidAddress(format!("'{s}': {e}")))?;
        Self::from_versioned(&decoded, s)
    }

    fn from_versioned(bytes: &[u8], original: &str) -> Result<Self, SmoothError> {
        if bytes.len() != 21 {
            return Err(SmoothError::InvalidAddress(format!(
                "'{original}': expected 21 bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != TRON_ADDRESS_PREFIX {
            return Err(SmoothError::InvalidAddress(format!(
                "'{original}': version byte 0x{:02x} is not 0x41",
                bytes[0]
            )));
        }
        Ok(Self(Address::from_slice(&bytes[1..])))
    }

    /// Returns true when `s` parses as any accepted address form.
    pub fn is_valid(s: &str) -> bool {
        s.parse::<Self>().is_ok()
    }
}

impl FromStr for TronAddress {
    type Err = SmoothError;

    /// Accepts base58check (`T...`), 21-byte hex (`41...`) and 20-byte `0x...` hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SmoothError::InvalidAddress("empty address".to_string()));
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let bytes = alloy::hex::decode(hex)
                .map_err(|e| SmoothError::InvalidAddress(format!("'{s}': {e}")))?;
            return match bytes.len() {
                20 => Ok(Self(Address::from_slice(&bytes))),
                21 => Self::from_versioned(&bytes, s),
                n => Err(SmoothError::InvalidAddress(format!(
                    "'{s}': expected 20 or 21 bytes, got {n}"
                ))),
            };
        }
        if s.len() == 42 && s.starts_with("41") && s.chars().all(|c| c.is_ascii_hexdigit()) {
            let bytes = alloy::hex::decode(s)
                .map_err(|e| SmoothError::InvalidAddress(format!("'{s}': {e}")))?;
            return Self::from_versioned(&bytes, s);
        }
        Self::from_base58(s)
    }
}

impl From<Address> for TronAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl From<TronAddress> for Address {
    fn from(address: TronAddress) -> Self {
        address.0
    }
}

impl fmt::Display for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TronAddress({})", self.to_base58())
    }
}

impl Serialize for TronAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for TronAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
