//! UI-facing notifications.
//!
//! The client broadcasts a [`SwapEvent`] for every observable change. A UI
//! subscribes through [`crate::SwapHandle::subscribe`] and re-renders from
//! the carried state; events are snapshots, not deltas.

use serde::Serialize;

use crate::settlement::SettlementStatus;
use crate::sync::TradePhase;
use crate::trade::{AcceptanceState, AssetRef, SwapPartner, TradeSlots};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SwapEvent {
    /// Joined or left a topic.
    Connection {
        topic: Option<String>,
        connected: bool,
    },
    /// The partner appeared, changed its selection, or went away.
    PartnerChanged { partner: Option<SwapPartner> },
    /// The local selection pool changed.
    SelectionChanged { assets: Vec<AssetRef> },
    SlotsChanged { slots: TradeSlots },
    AcceptanceChanged { acceptance: AcceptanceState },
    PhaseChanged { from: TradePhase, to: TradePhase },
    /// Progress of the escrow settlement.
    Settlement(SettlementStatus),
    /// Something failed that the user should see.
    Error { message: String },
}

impl SwapEvent {
    pub fn error(message: impl Into<String>) -> Self {
        SwapEvent::Error {
            message: message.into(),
        }
    }
}
