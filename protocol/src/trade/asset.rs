//! Tradable asset references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::identity::{Pubkey, PubkeyError};

/// An NFT offered in a swap.
///
/// Identity is the mint address alone. `name` and `image` are display data
/// carried along for the UI; two refs with the same mint are the same asset
/// no matter what metadata they carry.
#[derive(Clone, Serialize, Deserialize)]
pub struct AssetRef {
    /// Mint address (base58).
    pub mint: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Image URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl AssetRef {
    pub fn new(mint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mint: mint.into(),
            name: name.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, uri: impl Into<String>) -> Self {
        self.image = Some(uri.into());
        self
    }

    /// A bare reference with no metadata. The escrow account only knows mints.
    pub fn from_mint(mint: Pubkey) -> Self {
        Self::new(mint.to_string(), String::new())
    }

    pub fn mint_pubkey(&self) -> Result<Pubkey, PubkeyError> {
        self.mint.parse()
    }
}

impl PartialEq for AssetRef {
    fn eq(&self, other: &Self) -> bool {
        self.mint == other.mint
    }
}

impl Eq for AssetRef {}

impl Hash for AssetRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.mint.hash(state);
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "AssetRef({})", self.mint)
        } else {
            write!(f, "AssetRef({} \"{}\")", self.mint, self.name)
        }
    }
}

/// True when both lists hold the same mints in any order.
pub fn same_mints(a: &[AssetRef], b: &[AssetRef]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut left: Vec<&str> = a.iter().map(|x| x.mint.as_str()).collect();
    let mut right: Vec<&str> = b.iter().map(|x| x.mint.as_str()).collect();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_metadata() {
        let a = AssetRef::new("M1", "Cool Cat #1");
        let b = AssetRef::new("M1", "renamed").with_image("ipfs://x");
        assert_eq!(a, b);
        assert_ne!(a, AssetRef::new("M2", "Cool Cat #1"));
    }

    #[test]
    fn same_mints_is_order_insensitive() {
        let a = vec![AssetRef::new("M1", ""), AssetRef::new("M2", "")];
        let b = vec![AssetRef::new("M2", "x"), AssetRef::new("M1", "y")];
        assert!(same_mints(&a, &b));
        assert!(!same_mints(&a, &b[..1]));
    }

    #[test]
    fn image_is_omitted_when_absent() {
        let json = serde_json::to_value(AssetRef::new("M1", "n")).unwrap();
        assert!(json.get("image").is_none());
        let parsed: AssetRef = serde_json::from_str(r#"{"mint":"M9"}"#).unwrap();
        assert_eq!(parsed.mint, "M9");
        assert!(parsed.name.is_empty());
    }
}
