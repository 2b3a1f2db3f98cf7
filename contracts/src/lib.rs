//! # Swap Contracts
//!
//! The settlement side of an NFT swap, run in process:
//!
//! - **Escrow Program**: the escrow program's rules (initialize, deposit,
//!   complete, cancel) executed against encoded escrow accounts, with NFT
//!   custody tracked per mint.
//! - **Ledger**: a shared ledger hosting the program. It hands out
//!   per-wallet gateways, so two swap clients can settle against the same
//!   state through the regular escrow client.
//!
//! ## Design Principles
//!
//! 1. Transactions are atomic: all instructions land or none do.
//! 2. Account state lives only in its encoded form; every read decodes it.
//! 3. Every failure is a typed [`escrow_program::ProgramError`].

pub mod escrow_program;
pub mod ledger;

pub use escrow_program::{ProgramError, ProgramOp, ProgramState};
pub use ledger::{EscrowLedger, LedgerCall, LedgerWallet};
