//! # Trade Sync Protocol
//!
//! Keeps two clients' views of a trade round consistent over a shared
//! pub/sub topic:
//!
//! 1. **Handshake** -- `partner-wallet-new` / `partner-wallet-response`
//!    bind the two wallets to each other.
//! 2. **Proposal** -- `partner-nfts` shares each side's pool, `trade-slots`
//!    carries the full slot board after every edit.
//! 3. **Acceptance** -- `swap-accepted` flags; any edit clears both.
//! 4. **Settlement notices** -- `escrow-initialized`, `escrow-deposited` and
//!    `escrow-cancelled` tell the partner an on-chain step finished.
//!
//! The [`TradeSession`] reducer owns all of it and emits [`SyncAction`]s.

pub mod action;
pub mod error;
pub mod message;
pub mod session;

pub use action::{SettlementTrigger, SyncAction};
pub use error::SyncError;
pub use message::SwapMessage;
pub use session::{TradePhase, TradeSession};
