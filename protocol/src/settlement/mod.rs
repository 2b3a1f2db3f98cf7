//! # Escrow Settlement
//!
//! Once both parties accept, the trade is frozen into an
//! [`EscrowAgreement`] and settled through the escrow program. The
//! [`SettlementOrchestrator`] decides which call comes next for the local
//! role; [`SettlementJob`]s perform the calls against an
//! [`crate::escrow::EscrowRpcClient`].

pub mod agreement;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod step;

pub use agreement::{resolve_role, EscrowAgreement, SwapRole};
pub use error::SettlementError;
pub use job::{JobOutcome, JobSuccess, SettlementJob};
pub use orchestrator::{OrchestratorAction, SettlementOrchestrator};
pub use step::{SettlementOp, SettlementStatus, SettlementStep};
