//! Error types for the trade synchronization protocol.
//!
//! Every local operation that the protocol refuses returns a [`SyncError`]
//! before anything reaches the channel. Duplicate and stale inbound messages
//! are not errors; they are absorbed silently by the session.

use thiserror::Error;

use super::session::TradePhase;

/// Validation failures of the sync protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// No wallet address is configured for the local client.
    #[error("no wallet connected")]
    NoWallet,

    /// The operation needs a trading partner and none is known yet.
    #[error("no swap partner on this channel")]
    NoPartner,

    /// Slot index outside the three-slot row.
    #[error("slot index {index} out of range")]
    SlotOutOfRange { index: usize },

    /// Too many (or too few) assets on one side.
    #[error("{side} side holds {count} assets, allowed range is 1..=3")]
    InvalidAssetCount { side: &'static str, count: usize },

    /// The same asset was placed twice on one side.
    #[error("asset {mint} already occupies a slot on this side")]
    DuplicateAsset { mint: String },

    /// The asset is not in the owner's advertised selection.
    #[error("asset {mint} is not offered by its owner")]
    NotOffered { mint: String },

    /// Accept requires at least one asset on each side.
    #[error("both sides need at least one asset before accepting")]
    EmptySlots,

    /// Both parties accepted; the terms are frozen until settlement ends or
    /// someone withdraws.
    #[error("trade terms are locked in phase {phase}")]
    AgreementLocked { phase: TradePhase },

    /// The action is not valid in the current phase.
    #[error("cannot {action} in phase {phase}")]
    InvalidPhase {
        phase: TradePhase,
        action: &'static str,
    },

    /// An inbound frame named an event this protocol does not speak.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// An inbound payload did not match its event's schema.
    #[error("malformed {event} payload: {reason}")]
    Decode { event: String, reason: String },
}
