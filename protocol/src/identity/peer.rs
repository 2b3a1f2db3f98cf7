//! Peer identity: the wallet address a client trades under.
//!
//! The protocol treats it as an opaque, stable string. It filters self-echoes
//! (a client drops any message carrying its own identity) and it is the last
//! resort tie-break when choosing the escrow initializer. Only the escrow
//! layer needs it as a [`Pubkey`], and that conversion is fallible.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::pubkey::{Pubkey, PubkeyError};

/// Opaque wallet address identifying one side of a swap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty address means "no wallet connected".
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Interprets the address as a ledger key.
    pub fn to_pubkey(&self) -> Result<Pubkey, PubkeyError> {
        self.0.parse()
    }

    /// Shortened form for log lines and status text.
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 10 {
            return self.0.clone();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}..{}", head, tail)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerIdentity({})", self.0)
    }
}

impl From<Pubkey> for PeerIdentity {
    fn from(key: Pubkey) -> Self {
        Self(key.to_string())
    }
}

impl From<&str> for PeerIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_pubkey() {
        let key = Pubkey::new([3u8; 32]);
        let id = PeerIdentity::from(key);
        assert_eq!(id.to_pubkey().unwrap(), key);
    }

    #[test]
    fn opaque_ids_need_not_be_keys() {
        let id = PeerIdentity::new("alice");
        assert!(id.to_pubkey().is_err());
        assert_eq!(id.short(), "alice");
    }

    #[test]
    fn short_form_keeps_both_ends() {
        let id = PeerIdentity::new("ABCDEFGHIJKLMNOP");
        assert_eq!(id.short(), "ABCD..MNOP");
    }

    #[test]
    fn blank_is_empty() {
        assert!(PeerIdentity::new("  ").is_empty());
        assert!(!PeerIdentity::new("a").is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = PeerIdentity::new("wallet-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"wallet-1\"");
    }
}
