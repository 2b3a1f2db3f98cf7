use thiserror::Error;

use crate::escrow::RpcError;

use super::step::{SettlementOp, SettlementStep};

/// Settlement failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettlementError {
    /// An escrow call failed. Nothing is rolled back; the user retries.
    #[error("{op} failed: {source}")]
    Rpc { op: SettlementOp, source: RpcError },

    /// There are no accepted terms to act on.
    #[error("no accepted trade to settle")]
    NoAgreement,

    /// Only the initializer may cancel.
    #[error("only the escrow initializer can cancel")]
    NotInitializer,

    /// Another call for this agreement is still running.
    #[error("{op} is still running")]
    Busy { op: SettlementOp },

    /// Retry asked for while nothing has failed.
    #[error("no failed settlement step to retry")]
    NothingToRetry,

    /// The escrow account is missing.
    #[error("escrow account not found")]
    EscrowNotFound,

    /// An escrow for this pair already exists with different terms.
    #[error("an escrow with different terms already exists for this pair")]
    StaleEscrow,

    /// The on-chain escrow does not hold the accepted terms.
    #[error("escrow terms differ from the accepted trade")]
    TermsMismatch,

    /// The counterpart has not deposited yet.
    #[error("counterpart deposit is not on the ledger yet")]
    DepositsIncomplete,

    /// A trigger arrived that the current step cannot take.
    #[error("{trigger} is not expected while {step}")]
    OutOfOrder {
        trigger: &'static str,
        step: SettlementStep,
    },
}

impl SettlementError {
    pub(crate) fn rpc(op: SettlementOp) -> impl FnOnce(RpcError) -> Self {
        move |source| SettlementError::Rpc { op, source }
    }

    /// Whether a manual retry of the same step may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SettlementError::Rpc { source, .. } => source.is_retryable(),
            SettlementError::EscrowNotFound | SettlementError::DepositsIncomplete => true,
            _ => false,
        }
    }
}
