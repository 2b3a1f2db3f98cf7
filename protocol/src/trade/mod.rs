//! # Trade Data Model
//!
//! The shared vocabulary of the sync protocol and the settlement
//! orchestrator:
//!
//! - **AssetRef**: an NFT, identified by mint; metadata is display-only.
//! - **TradeSlots**: up to three assets per side for the current round.
//! - **SwapPartner**: what we know about the peer across the channel.
//! - **AcceptanceState**: both acceptance flags plus who edited last.

pub mod asset;
pub mod partner;
pub mod slots;

pub use asset::{same_mints, AssetRef};
pub use partner::{AcceptanceState, ChangeOrigin, SwapPartner};
pub use slots::{SlotRow, SlotSide, TradeSlots};
