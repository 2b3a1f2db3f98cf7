//! # Escrow Program Interface
//!
//! Everything the client knows about the on-chain escrow:
//!
//! - [`pda`] -- escrow and token account address derivation.
//! - [`account`] -- the account byte layout and its decoded snapshot.
//! - [`instruction`] -- method discriminators, argument encoding and account
//!   lists.
//! - [`client`] -- the [`EscrowRpcClient`] seam used by settlement, and its
//!   implementation over a [`LedgerGateway`].

pub mod account;
pub mod client;
pub mod error;
pub mod instruction;
pub mod pda;

pub use account::{account_discriminator, EscrowAccountData, EscrowAccountSnapshot, ESCROW_ACCOUNT_LEN};
pub use client::{EscrowRpcClient, LedgerGateway, ProgramEscrowClient, TxSignature};
pub use error::RpcError;
pub use instruction::{check_asset_count, instruction_discriminator, AccountMeta, EscrowProgram, Instruction};
