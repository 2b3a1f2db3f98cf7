//! # Escrow Account Layout
//!
//! Byte layout of the on-chain escrow account and its decoded, client-side
//! view.
//!
//! ```text
//! [0..8)    account discriminator = sha256("account:EscrowAccount")[..8]
//! [8..40)   initializer
//! [40..72)  taker
//! [72]      initializer_nft_count
//! [73]      taker_nft_count
//! [74..170) initializer_nft_mints  3 x 32
//! [170..266) taker_nft_mints       3 x 32
//! then      4 x [bool; 3]  per-NFT deposited/collected flags
//!           5 x bool       initializer_deposited .. is_initialized
//!           u8             bump
//!           i64 LE         created_at (unix seconds)
//!           i64 LE         timeout_in_seconds
//! ```
//!
//! Fixed-width little-endian fields with no length prefixes; `bincode`'s
//! fixint encoding produces exactly this shape. A closed account is zeroed
//! and reads as absent.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{MAX_ASSETS_PER_SIDE, MIN_ASSETS_PER_SIDE};
use crate::identity::{PeerIdentity, Pubkey};
use crate::trade::AssetRef;

use super::error::RpcError;

/// Length of the serialized account including the discriminator.
pub const ESCROW_ACCOUNT_LEN: usize = 8 + 292;

/// Anchor-style discriminator of the escrow account type.
pub fn account_discriminator() -> [u8; 8] {
    let digest = Sha256::digest(b"account:EscrowAccount");
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

// ---------------------------------------------------------------------------
// Raw Account
// ---------------------------------------------------------------------------

/// Field-for-field image of the on-chain account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccountData {
    pub initializer: [u8; 32],
    pub taker: [u8; 32],
    pub initializer_nft_count: u8,
    pub taker_nft_count: u8,
    pub initializer_nft_mints: [[u8; 32]; MAX_ASSETS_PER_SIDE],
    pub taker_nft_mints: [[u8; 32]; MAX_ASSETS_PER_SIDE],
    pub initializer_nft_deposited: [bool; MAX_ASSETS_PER_SIDE],
    pub taker_nft_deposited: [bool; MAX_ASSETS_PER_SIDE],
    pub initializer_nft_collected: [bool; MAX_ASSETS_PER_SIDE],
    pub taker_nft_collected: [bool; MAX_ASSETS_PER_SIDE],
    pub initializer_deposited: bool,
    pub taker_deposited: bool,
    pub initializer_collected: bool,
    pub taker_collected: bool,
    pub is_initialized: bool,
    pub bump: u8,
    pub created_at: i64,
    pub timeout_in_seconds: i64,
}

impl EscrowAccountData {
    /// Decodes raw account bytes. Trailing padding is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, RpcError> {
        if bytes.len() < ESCROW_ACCOUNT_LEN {
            return Err(RpcError::AccountDecode(format!(
                "expected at least {} bytes, got {}",
                ESCROW_ACCOUNT_LEN,
                bytes.len()
            )));
        }
        if bytes[..8] != account_discriminator() {
            return Err(RpcError::AccountDecode("discriminator mismatch".into()));
        }
        let data: Self = bincode::deserialize(&bytes[8..ESCROW_ACCOUNT_LEN])
            .map_err(|e| RpcError::AccountDecode(e.to_string()))?;

        for (side, count) in [
            ("initializer", data.initializer_nft_count),
            ("taker", data.taker_nft_count),
        ] {
            let count = count as usize;
            if !(MIN_ASSETS_PER_SIDE..=MAX_ASSETS_PER_SIDE).contains(&count) {
                return Err(RpcError::InvalidAssetCount { side, count });
            }
        }
        Ok(data)
    }

    /// Serializes with the discriminator prefix.
    pub fn encode(&self) -> Result<Vec<u8>, RpcError> {
        let body = bincode::serialize(self).map_err(|e| RpcError::Encode(e.to_string()))?;
        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(&account_discriminator());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Whether every NFT of a side has been collected by the other party.
    fn all_collected(flags: &[bool; MAX_ASSETS_PER_SIDE], count: u8) -> bool {
        flags.iter().take(count as usize).all(|&f| f)
    }

    fn mints(mints: &[[u8; 32]; MAX_ASSETS_PER_SIDE], count: u8) -> Vec<AssetRef> {
        mints
            .iter()
            .take(count as usize)
            .map(|m| AssetRef::from_mint(Pubkey::new(*m)))
            .collect()
    }
}

/// Whether account bytes are the zeroed remains of a closed escrow.
pub fn is_closed(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only view of an escrow as the orchestrator needs it.
///
/// Asset lists follow the on-chain slot order, which is also the index the
/// program expects in deposit and complete instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccountSnapshot {
    pub address: Pubkey,
    pub initializer: PeerIdentity,
    pub taker: PeerIdentity,
    pub initializer_assets: Vec<AssetRef>,
    pub taker_assets: Vec<AssetRef>,
    pub initializer_deposited: bool,
    pub taker_deposited: bool,
    /// The taker holds all of the initializer's NFTs.
    pub initializer_assets_collected: bool,
    /// The initializer holds all of the taker's NFTs.
    pub taker_assets_collected: bool,
    pub created_at: i64,
    pub timeout_secs: i64,
}

impl EscrowAccountSnapshot {
    pub fn from_account(address: Pubkey, data: &EscrowAccountData) -> Self {
        Self {
            address,
            initializer: Pubkey::new(data.initializer).into(),
            taker: Pubkey::new(data.taker).into(),
            initializer_assets: EscrowAccountData::mints(
                &data.initializer_nft_mints,
                data.initializer_nft_count,
            ),
            taker_assets: EscrowAccountData::mints(&data.taker_nft_mints, data.taker_nft_count),
            initializer_deposited: data.initializer_deposited,
            taker_deposited: data.taker_deposited,
            initializer_assets_collected: EscrowAccountData::all_collected(
                &data.initializer_nft_collected,
                data.initializer_nft_count,
            ),
            taker_assets_collected: EscrowAccountData::all_collected(
                &data.taker_nft_collected,
                data.taker_nft_count,
            ),
            created_at: data.created_at,
            timeout_secs: data.timeout_in_seconds,
        }
    }

    /// Unix second after which the initializer may reclaim deposits.
    pub fn expires_at(&self) -> i64 {
        self.created_at.saturating_add(self.timeout_secs)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires_at(), 0).single()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at()
    }

    /// Both parties deposited everything.
    pub fn fully_funded(&self) -> bool {
        self.initializer_deposited && self.taker_deposited
    }
}
