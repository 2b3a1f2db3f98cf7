// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Swap Protocol Core Library
//!
//! Two wallets meet on a shared pub/sub topic, agree on up to three NFTs per
//! side, and settle the trade through an on-chain escrow program. This crate
//! holds everything between the UI and the ledger:
//!
//! - **config**: protocol constants, event names and client settings.
//! - **identity**: wallet addresses, raw public keys and test keypairs.
//! - **trade**: assets, the slot board, partner and acceptance state.
//! - **sync**: the message set and the [`TradeSession`] reducer that keeps
//!   both clients' views of a round consistent.
//! - **channel**: the pub/sub seam plus an in-memory hub.
//! - **escrow**: address derivation, account decoding, instruction
//!   building and the [`EscrowRpcClient`] seam.
//! - **settlement**: the [`SettlementOrchestrator`] that sequences escrow
//!   calls for the local role.
//! - **client**: [`SwapClient`], the task that wires all of the above
//!   together behind a [`SwapHandle`].
//!
//! The reducers (`sync`, `settlement`) are pure: they take an input and
//! return actions. Only `client` performs I/O.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod identity;
pub mod settlement;
pub mod sync;
pub mod trade;

pub use channel::{ChannelTransport, MemoryHub, MemoryTransport};
pub use client::{SwapClient, SwapHandle, TradeView};
pub use config::SwapConfig;
pub use error::{Result, SwapError};
pub use escrow::{EscrowRpcClient, RpcError};
pub use events::SwapEvent;
pub use identity::{PeerIdentity, Pubkey};
pub use settlement::{EscrowAgreement, SettlementOrchestrator, SettlementStep, SwapRole};
pub use sync::{SwapMessage, TradePhase, TradeSession};
pub use trade::{AssetRef, SlotSide, TradeSlots};
