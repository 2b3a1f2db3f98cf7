//! Side effects requested by the trade session.
//!
//! The session never performs I/O. Every state transition returns a list of
//! actions and the driver executes them in order: publishes go out on the
//! channel, notifications go to the UI, settlement triggers go to the
//! orchestrator.

use crate::events::SwapEvent;
use crate::settlement::EscrowAgreement;

use super::message::SwapMessage;

/// One side effect of a session transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// Send a message to the partner.
    Publish(SwapMessage),
    /// Tell the UI something changed.
    Notify(SwapEvent),
    /// Drive the settlement orchestrator.
    Settle(SettlementTrigger),
}

/// Inputs the session feeds to the settlement orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementTrigger {
    /// Both parties accepted these terms.
    Agreed(EscrowAgreement),
    /// Acceptance was withdrawn before any escrow call was made.
    Abandoned,
    /// The partner reports the escrow exists.
    CounterpartInitialized { signature: Option<String> },
    /// The partner reports it deposited and collected.
    CounterpartDeposited { signature: Option<String> },
    /// The partner reports it cancelled the escrow.
    CounterpartCancelled { signature: Option<String> },
}

impl SyncAction {
    pub fn is_publish(&self) -> bool {
        matches!(self, SyncAction::Publish(_))
    }
}
