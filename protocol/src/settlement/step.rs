//! Settlement progress as seen by the UI.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One escrow call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOp {
    Initialize,
    Deposit,
    Complete,
    Cancel,
}

impl SettlementOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementOp::Initialize => "initialize",
            SettlementOp::Deposit => "deposit",
            SettlementOp::Complete => "complete",
            SettlementOp::Cancel => "cancel",
        }
    }

    /// The step shown while this call runs.
    pub fn running_step(&self) -> SettlementStep {
        match self {
            SettlementOp::Initialize => SettlementStep::Initializing,
            SettlementOp::Deposit => SettlementStep::Depositing,
            SettlementOp::Complete => SettlementStep::Completing,
            SettlementOp::Cancel => SettlementStep::Cancelling,
        }
    }
}

impl fmt::Display for SettlementOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where settlement of the current agreement stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step", content = "op")]
pub enum SettlementStep {
    Idle,
    /// Taker: waiting for the initializer to create the escrow.
    AwaitingEscrow,
    Initializing,
    /// Initializer: escrow funded on our side, waiting for the taker.
    AwaitingDeposit,
    Depositing,
    Completing,
    Cancelling,
    Settled,
    Cancelled,
    /// The call failed; nothing runs until the user retries or cancels.
    Failed(SettlementOp),
}

impl SettlementStep {
    /// An escrow call ran or may have run for the current agreement.
    pub fn escrow_touched(&self) -> bool {
        matches!(
            self,
            SettlementStep::Initializing
                | SettlementStep::AwaitingDeposit
                | SettlementStep::Depositing
                | SettlementStep::Completing
                | SettlementStep::Cancelling
                | SettlementStep::Failed(_)
        )
    }
}

impl fmt::Display for SettlementStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementStep::Idle => f.write_str("idle"),
            SettlementStep::AwaitingEscrow => f.write_str("awaiting escrow"),
            SettlementStep::Initializing => f.write_str("initializing"),
            SettlementStep::AwaitingDeposit => f.write_str("awaiting deposit"),
            SettlementStep::Depositing => f.write_str("depositing"),
            SettlementStep::Completing => f.write_str("completing"),
            SettlementStep::Cancelling => f.write_str("cancelling"),
            SettlementStep::Settled => f.write_str("settled"),
            SettlementStep::Cancelled => f.write_str("cancelled"),
            SettlementStep::Failed(op) => write!(f, "{} failed", op),
        }
    }
}

/// Snapshot pushed to the UI whenever settlement moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementStatus {
    pub step: SettlementStep,
    /// Human-readable progress or error text.
    pub message: String,
    /// An escrow call is in flight.
    pub busy: bool,
    /// Signature of the last successful call, when one was sent.
    pub signature: Option<String>,
    /// Unix second the escrow expires, once known.
    pub expires_at: Option<i64>,
}
