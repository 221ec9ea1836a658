use std::fmt;
use std::str::FromStr;

use rand::{rngs::OsRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const ADDRESS_SIZE: usize = 20;

/// Errors produced when parsing an [`Address`] from text.
#[derive(Debug, Error, PartialEq)]
pub enum AddressParseError {
    /// The hex string does not decode to exactly 20 bytes.
    #[error("address must be {expected} hex bytes, got {got}")]
    BadLength { expected: usize, got: usize },

    /// The string contains characters outside the hex alphabet.
    #[error("invalid hex in address: {0}")]
    BadHex(#[from] hex::FromHexError),
}

/// Opaque identity of a contributor or owner.
///
/// Fixed-width byte array with a stable total order, rendered as 40
/// lowercase hex characters. Nothing in the ledger interprets the bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Deterministic address for a human-readable label.
    ///
    /// First 20 bytes of `SHA-256(label)`. Lets tests and the CLI refer to
    /// identities as `alice` or `owner` without managing key material.
    pub fn derive(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest[..ADDRESS_SIZE]);
        Self(bytes)
    }

    /// Fresh random address from the OS entropy source.
    pub fn random() -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != ADDRESS_SIZE {
            return Err(AddressParseError::BadLength {
                expected: ADDRESS_SIZE,
                got: bytes.len(),
            });
        }
        let mut fixed = [0u8; ADDRESS_SIZE];
        fixed.copy_from_slice(&bytes);
        Ok(Self(fixed))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
