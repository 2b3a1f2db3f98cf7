//! 32-byte ledger addresses in their base58 text form.
//!
//! Wallets, mints, programs and derived escrow accounts all share this one
//! representation. On the wire and in logs a key is always base58; inside an
//! encoded escrow account it is the raw 32 bytes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a ledger public key in bytes.
pub const PUBKEY_LENGTH: usize = 32;

/// Failure to parse a base58 address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PubkeyError {
    #[error("invalid base58 address: {0}")]
    InvalidBase58(String),

    #[error("address decodes to {0} bytes, expected 32")]
    WrongLength(usize),
}

/// A 32-byte ledger address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; PUBKEY_LENGTH]);

impl Pubkey {
    /// The all-zero key. Unused mint slots in an escrow account hold this.
    pub const ZERO: Pubkey = Pubkey([0u8; PUBKEY_LENGTH]);

    pub const fn new(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; PUBKEY_LENGTH] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; PUBKEY_LENGTH]
    }

    /// Parses a compile-time constant address. Only for the well-known
    /// program ids in [`crate::config`], which are covered by tests.
    pub(crate) fn from_static(s: &'static str) -> Self {
        s.parse().unwrap_or(Self::ZERO)
    }
}

impl FromStr for Pubkey {
    type Err = PubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| PubkeyError::InvalidBase58(e.to_string()))?;
        if bytes.len() != PUBKEY_LENGTH {
            return Err(PubkeyError::WrongLength(bytes.len()));
        }
        let mut arr = [0u8; PUBKEY_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl From<[u8; PUBKEY_LENGTH]> for Pubkey {
    fn from(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    #[test]
    fn well_known_program_ids_parse() {
        for id in [
            config::DEFAULT_ESCROW_PROGRAM_ID,
            config::TOKEN_PROGRAM_ID,
            config::ASSOCIATED_TOKEN_PROGRAM_ID,
            config::SYSTEM_PROGRAM_ID,
            config::RENT_SYSVAR_ID,
        ] {
            let key: Pubkey = id.parse().expect(id);
            assert_eq!(key.to_string(), id);
        }
    }

    #[test]
    fn system_program_is_zero() {
        let key: Pubkey = config::SYSTEM_PROGRAM_ID.parse().unwrap();
        assert!(key.is_zero());
    }

    #[test]
    fn rejects_wrong_length() {
        let short = bs58::encode([7u8; 31]).into_string();
        assert_eq!(short.parse::<Pubkey>(), Err(PubkeyError::WrongLength(31)));
    }

    #[test]
    fn rejects_non_base58() {
        assert!(matches!(
            "0OIl".parse::<Pubkey>(),
            Err(PubkeyError::InvalidBase58(_))
        ));
    }

    #[test]
    fn serde_uses_base58_text() {
        let key = Pubkey::new([9u8; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key));
        let back: Pubkey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
