//! # Trade Session
//!
//! The per-client state machine of the sync protocol. It is a pure reducer:
//! inbound messages and local operations mutate the session and return the
//! [`SyncAction`]s the driver must perform. No I/O happens here, which keeps
//! every transition testable without a transport.
//!
//! ## Phases
//!
//! ```text
//! Idle --partner seen--> PartnerDiscovered --slot edit--> Proposing
//! Proposing --both accept--> BothAccepted --first escrow call--> Settling
//! Settling --settled--> Done --slot edit--> Proposing
//! Settling --cancelled--> Idle
//! any --channel lost--> Idle
//! ```
//!
//! ## Delivery Tolerance
//!
//! The channel delivers at least once, may echo our own publishes back, and
//! does not order events of different names. The session therefore drops
//! messages whose origin is the local wallet, treats repeated content as a
//! no-op, and ignores messages that do not make sense in the current phase
//! instead of failing on them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::events::SwapEvent;
use crate::identity::PeerIdentity;
use crate::settlement::{resolve_role, EscrowAgreement};
use crate::trade::{AcceptanceState, AssetRef, ChangeOrigin, SlotSide, SwapPartner, TradeSlots};

use super::action::{SettlementTrigger, SyncAction};
use super::error::SyncError;
use super::message::SwapMessage;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where the current trade round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradePhase {
    /// No partner on the channel.
    Idle,
    /// A partner is known but nothing has been proposed.
    PartnerDiscovered,
    /// Slots are being edited.
    Proposing,
    /// Both parties accepted the current slots.
    BothAccepted,
    /// An escrow call has been made for the current terms.
    Settling,
    /// The last round settled; the partner is still connected.
    Done,
}

impl TradePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradePhase::Idle => "idle",
            TradePhase::PartnerDiscovered => "partner_discovered",
            TradePhase::Proposing => "proposing",
            TradePhase::BothAccepted => "both_accepted",
            TradePhase::Settling => "settling",
            TradePhase::Done => "done",
        }
    }

    /// Numeric code for gauges.
    pub fn code(&self) -> i64 {
        match self {
            TradePhase::Idle => 0,
            TradePhase::PartnerDiscovered => 1,
            TradePhase::Proposing => 2,
            TradePhase::BothAccepted => 3,
            TradePhase::Settling => 4,
            TradePhase::Done => 5,
        }
    }

    /// Slots are frozen.
    pub fn terms_locked(&self) -> bool {
        matches!(self, TradePhase::BothAccepted | TradePhase::Settling)
    }
}

impl fmt::Display for TradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Trade state of one client on one channel.
#[derive(Debug, Clone)]
pub struct TradeSession {
    local: PeerIdentity,
    escrow_timeout_secs: i64,
    phase: TradePhase,
    partner: Option<SwapPartner>,
    /// Senders we already answered with `partner-wallet-response`.
    replied_to: HashSet<PeerIdentity>,
    /// Local pool of offerable NFTs.
    selection: Vec<AssetRef>,
    slots: TradeSlots,
    acceptance: AcceptanceState,
    agreement: Option<EscrowAgreement>,
    round: Uuid,
}

impl TradeSession {
    pub fn new(local: PeerIdentity, escrow_timeout_secs: i64) -> Self {
        Self {
            local,
            escrow_timeout_secs,
            phase: TradePhase::Idle,
            partner: None,
            replied_to: HashSet::new(),
            selection: Vec::new(),
            slots: TradeSlots::new(),
            acceptance: AcceptanceState::default(),
            agreement: None,
            round: Uuid::new_v4(),
        }
    }

    pub fn local(&self) -> &PeerIdentity {
        &self.local
    }

    pub fn phase(&self) -> TradePhase {
        self.phase
    }

    pub fn partner(&self) -> Option<&SwapPartner> {
        self.partner.as_ref()
    }

    pub fn selection(&self) -> &[AssetRef] {
        &self.selection
    }

    pub fn slots(&self) -> &TradeSlots {
        &self.slots
    }

    pub fn acceptance(&self) -> &AcceptanceState {
        &self.acceptance
    }

    /// Terms of the current round once both accepted.
    pub fn agreement(&self) -> Option<&EscrowAgreement> {
        self.agreement.as_ref()
    }

    /// Identifier of the current round; changes whenever a round ends.
    pub fn round_id(&self) -> Uuid {
        self.round
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Applies one inbound message.
    pub fn handle(&mut self, msg: SwapMessage) -> Vec<SyncAction> {
        let mut out = Vec::new();
        let origin = msg.origin().clone();
        if origin == self.local {
            trace!(event = msg.event(), "dropping own echo");
            return out;
        }
        if origin.is_empty() {
            debug!(event = msg.event(), "dropping message without sender");
            return out;
        }

        match msg {
            SwapMessage::PartnerWalletNew { sender_address } => {
                self.on_wallet_new(sender_address, &mut out)
            }
            SwapMessage::PartnerWalletResponse { sender_address } => {
                self.adopt_partner(&sender_address, &mut out);
            }
            SwapMessage::PartnerNfts {
                wallet_address,
                assets,
            } => self.on_partner_nfts(wallet_address, assets, &mut out),
            SwapMessage::TradeSlots {
                wallet_address,
                slots,
            } => self.on_trade_slots(wallet_address, slots, &mut out),
            SwapMessage::SwapAccepted {
                wallet_address,
                accepted,
            } => self.on_swap_accepted(wallet_address, accepted, &mut out),
            SwapMessage::EscrowInitialized { signature, .. } => self.forward_escrow_step(
                &origin,
                &[TradePhase::BothAccepted, TradePhase::Settling],
                SettlementTrigger::CounterpartInitialized { signature },
                &mut out,
            ),
            SwapMessage::EscrowDeposited { signature, .. } => self.forward_escrow_step(
                &origin,
                &[TradePhase::Settling],
                SettlementTrigger::CounterpartDeposited { signature },
                &mut out,
            ),
            SwapMessage::EscrowCancelled { signature, .. } => self.forward_escrow_step(
                &origin,
                &[TradePhase::BothAccepted, TradePhase::Settling],
                SettlementTrigger::CounterpartCancelled { signature },
                &mut out,
            ),
        }
        out
    }

    fn on_wallet_new(&mut self, sender: PeerIdentity, out: &mut Vec<SyncAction>) {
        let replacing = matches!(&self.partner, Some(p) if p.wallet_address != sender);
        if replacing {
            if self.phase.terms_locked() {
                warn!(stranger = %sender.short(), phase = %self.phase, "ignoring new wallet while terms are locked");
                return;
            }
            info!(new = %sender.short(), "partner wallet replaced");
            self.reset_round(out);
            self.partner = None;
            self.set_phase(TradePhase::Idle, out);
        }
        if !self.adopt_partner(&sender, out) {
            return;
        }

        if self.replied_to.insert(sender.clone()) {
            out.push(SyncAction::Publish(SwapMessage::PartnerWalletResponse {
                sender_address: self.local.clone(),
            }));
        }
        // A (re)joining partner has no copy of our pool.
        if !self.selection.is_empty() {
            out.push(SyncAction::Publish(SwapMessage::PartnerNfts {
                wallet_address: self.local.clone(),
                assets: self.selection.clone(),
            }));
        }
    }

    /// Binds `address` as the partner if none is bound yet. Returns false
    /// when a different wallet is already the partner.
    fn adopt_partner(&mut self, address: &PeerIdentity, out: &mut Vec<SyncAction>) -> bool {
        match &self.partner {
            Some(p) if &p.wallet_address == address => true,
            Some(p) => {
                debug!(
                    partner = %p.wallet_address.short(),
                    stranger = %address.short(),
                    "ignoring message from a third wallet"
                );
                false
            }
            None => {
                info!(partner = %address.short(), "partner discovered");
                self.partner = Some(SwapPartner::new(address.clone()));
                out.push(SyncAction::Notify(SwapEvent::PartnerChanged {
                    partner: self.partner.clone(),
                }));
                if self.phase == TradePhase::Idle {
                    self.set_phase(TradePhase::PartnerDiscovered, out);
                }
                true
            }
        }
    }

    fn on_partner_nfts(&mut self, from: PeerIdentity, assets: Vec<AssetRef>, out: &mut Vec<SyncAction>) {
        if !self.adopt_partner(&from, out) {
            return;
        }
        let Some(partner) = self.partner.as_mut() else {
            return;
        };
        if partner.selected_nfts == assets {
            return;
        }
        debug!(count = assets.len(), "partner selection updated");
        partner.selected_nfts = assets;
        out.push(SyncAction::Notify(SwapEvent::PartnerChanged {
            partner: Some(partner.clone()),
        }));
    }

    fn on_trade_slots(&mut self, from: PeerIdentity, slots: TradeSlots, out: &mut Vec<SyncAction>) {
        if !self.adopt_partner(&from, out) {
            return;
        }
        if self.phase == TradePhase::Settling {
            warn!("ignoring partner slot edit during settlement");
            out.push(SyncAction::Notify(SwapEvent::error(
                "partner changed the slots while settlement is running",
            )));
            return;
        }
        let incoming = slots.inverted();
        if incoming == self.slots {
            trace!("partner slots unchanged");
            return;
        }

        if self.phase == TradePhase::BothAccepted {
            info!("partner edited agreed terms; agreement dropped");
            self.agreement = None;
            out.push(SyncAction::Settle(SettlementTrigger::Abandoned));
        }
        self.slots = incoming;
        self.record_edit(ChangeOrigin::Remote, out);
    }

    fn on_swap_accepted(&mut self, from: PeerIdentity, accepted: bool, out: &mut Vec<SyncAction>) {
        if !self.adopt_partner(&from, out) {
            return;
        }
        if self.phase == TradePhase::Settling {
            if !accepted && self.acceptance.remote_accepted {
                warn!("partner withdrew acceptance during settlement");
                out.push(SyncAction::Notify(SwapEvent::error(
                    "partner withdrew acceptance after settlement started; cancel the escrow to recover",
                )));
            } else {
                debug!(accepted, "ignoring acceptance change during settlement");
            }
            return;
        }
        if self.acceptance.remote_accepted == accepted {
            return;
        }

        self.acceptance.remote_accepted = accepted;
        if let Some(partner) = self.partner.as_mut() {
            partner.swap_accepted = accepted;
        }
        out.push(SyncAction::Notify(SwapEvent::AcceptanceChanged {
            acceptance: self.acceptance,
        }));

        if accepted && self.acceptance.local_accepted {
            self.enter_both_accepted(out);
        } else if !accepted && self.phase == TradePhase::BothAccepted {
            self.agreement = None;
            out.push(SyncAction::Settle(SettlementTrigger::Abandoned));
            self.set_phase(TradePhase::Proposing, out);
        }
    }

    fn forward_escrow_step(
        &mut self,
        from: &PeerIdentity,
        phases: &[TradePhase],
        trigger: SettlementTrigger,
        out: &mut Vec<SyncAction>,
    ) {
        let is_partner = self
            .partner
            .as_ref()
            .map_or(false, |p| &p.wallet_address == from);
        if !is_partner || !phases.contains(&self.phase) {
            debug!(phase = %self.phase, ?trigger, "ignoring escrow notice");
            return;
        }
        out.push(SyncAction::Settle(trigger));
    }

    // -----------------------------------------------------------------------
    // Local operations
    // -----------------------------------------------------------------------

    /// Announces the local wallet on a freshly joined channel.
    pub fn announce(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        self.require_wallet()?;
        let mut out = vec![SyncAction::Publish(SwapMessage::PartnerWalletNew {
            sender_address: self.local.clone(),
        })];
        if !self.selection.is_empty() {
            out.push(SyncAction::Publish(SwapMessage::PartnerNfts {
                wallet_address: self.local.clone(),
                assets: self.selection.clone(),
            }));
        }
        Ok(out)
    }

    /// Replaces the local pool of offerable NFTs.
    pub fn select_nfts(&mut self, assets: Vec<AssetRef>) -> Result<Vec<SyncAction>, SyncError> {
        self.require_wallet()?;
        let mut seen = HashSet::new();
        if let Some(dup) = assets.iter().find(|a| !seen.insert(a.mint.as_str())) {
            return Err(SyncError::DuplicateAsset {
                mint: dup.mint.clone(),
            });
        }
        if assets == self.selection {
            return Ok(Vec::new());
        }

        self.selection = assets;
        let mut out = vec![SyncAction::Notify(SwapEvent::SelectionChanged {
            assets: self.selection.clone(),
        })];
        if self.partner.is_some() {
            out.push(SyncAction::Publish(SwapMessage::PartnerNfts {
                wallet_address: self.local.clone(),
                assets: self.selection.clone(),
            }));
        }
        Ok(out)
    }

    /// Places `asset` in slot `index` of `side`.
    ///
    /// `Mine` assets must come from the local selection and `Partner` assets
    /// from the partner's advertised selection.
    pub fn assign_slot(
        &mut self,
        side: SlotSide,
        index: usize,
        asset: AssetRef,
    ) -> Result<Vec<SyncAction>, SyncError> {
        self.edit(|session, slots| {
            session.check_offered(side, &asset)?;
            slots.assign(side, index, asset)
        })
    }

    pub fn clear_slot(&mut self, side: SlotSide, index: usize) -> Result<Vec<SyncAction>, SyncError> {
        self.edit(|_, slots| slots.clear(side, index).map(|_| ()))
    }

    /// Replaces the whole board in one edit.
    pub fn set_slots(&mut self, next: TradeSlots) -> Result<Vec<SyncAction>, SyncError> {
        self.edit(|session, slots| {
            for side in [SlotSide::Mine, SlotSide::Partner] {
                for asset in next.row(side).iter().flatten() {
                    session.check_offered(side, asset)?;
                }
            }
            // Re-run through `assign` for the per-side duplicate check.
            let mut rebuilt = TradeSlots::new();
            for side in [SlotSide::Mine, SlotSide::Partner] {
                for (i, slot) in next.row(side).iter().enumerate() {
                    if let Some(asset) = slot {
                        rebuilt.assign(side, i, asset.clone())?;
                    }
                }
            }
            *slots = rebuilt;
            Ok(())
        })
    }

    fn edit<F>(&mut self, apply: F) -> Result<Vec<SyncAction>, SyncError>
    where
        F: FnOnce(&Self, &mut TradeSlots) -> Result<(), SyncError>,
    {
        self.require_wallet()?;
        if self.partner.is_none() {
            return Err(SyncError::NoPartner);
        }
        if self.phase.terms_locked() {
            return Err(SyncError::AgreementLocked { phase: self.phase });
        }

        let mut next = self.slots.clone();
        apply(self, &mut next)?;
        if next == self.slots {
            return Ok(Vec::new());
        }

        self.slots = next;
        let mut out = vec![SyncAction::Publish(SwapMessage::TradeSlots {
            wallet_address: self.local.clone(),
            slots: self.slots.clone(),
        })];
        self.record_edit(ChangeOrigin::Local, &mut out);
        Ok(out)
    }

    fn check_offered(&self, side: SlotSide, asset: &AssetRef) -> Result<(), SyncError> {
        let pool: &[AssetRef] = match side {
            SlotSide::Mine => &self.selection,
            SlotSide::Partner => self
                .partner
                .as_ref()
                .map(|p| p.selected_nfts.as_slice())
                .unwrap_or(&[]),
        };
        if pool.contains(asset) {
            Ok(())
        } else {
            Err(SyncError::NotOffered {
                mint: asset.mint.clone(),
            })
        }
    }

    /// Accepts the current slots.
    pub fn accept(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        self.require_wallet()?;
        if self.partner.is_none() {
            return Err(SyncError::NoPartner);
        }
        match self.phase {
            TradePhase::Settling => {
                return Err(SyncError::InvalidPhase {
                    phase: self.phase,
                    action: "accept",
                })
            }
            TradePhase::BothAccepted => return Ok(Vec::new()),
            _ => {}
        }
        if !self.slots.is_ready() {
            return Err(SyncError::EmptySlots);
        }
        if self.acceptance.local_accepted {
            return Ok(Vec::new());
        }

        self.acceptance.local_accepted = true;
        let mut out = vec![
            SyncAction::Publish(SwapMessage::SwapAccepted {
                wallet_address: self.local.clone(),
                accepted: true,
            }),
            SyncAction::Notify(SwapEvent::AcceptanceChanged {
                acceptance: self.acceptance,
            }),
        ];
        if self.acceptance.remote_accepted {
            self.enter_both_accepted(&mut out);
        }
        Ok(out)
    }

    /// Withdraws a local acceptance before settlement starts.
    ///
    /// Refused once settlement runs. A withdrawal still in flight when the
    /// initializer starts settling is only reported there, so an escrow
    /// created in that window stays live until the initializer cancels it
    /// or it expires.
    pub fn withdraw_accept(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        self.require_wallet()?;
        if self.phase == TradePhase::Settling {
            return Err(SyncError::InvalidPhase {
                phase: self.phase,
                action: "withdraw acceptance",
            });
        }
        if !self.acceptance.local_accepted {
            return Ok(Vec::new());
        }

        self.acceptance.local_accepted = false;
        let mut out = vec![
            SyncAction::Publish(SwapMessage::SwapAccepted {
                wallet_address: self.local.clone(),
                accepted: false,
            }),
            SyncAction::Notify(SwapEvent::AcceptanceChanged {
                acceptance: self.acceptance,
            }),
        ];
        if self.phase == TradePhase::BothAccepted {
            self.agreement = None;
            out.push(SyncAction::Settle(SettlementTrigger::Abandoned));
            self.set_phase(TradePhase::Proposing, &mut out);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Settlement feedback
    // -----------------------------------------------------------------------

    /// The first escrow call for the agreed terms has been dispatched.
    pub fn mark_settling(&mut self) -> Vec<SyncAction> {
        let mut out = Vec::new();
        if self.phase == TradePhase::BothAccepted {
            self.set_phase(TradePhase::Settling, &mut out);
        }
        out
    }

    /// The escrow settled. Traded assets leave both pools and the board is
    /// cleared for the next round.
    pub fn finish_round(&mut self) -> Vec<SyncAction> {
        let mut out = Vec::new();
        if let Some(agreement) = self.agreement.take() {
            let given = agreement.local_assets();
            let before = self.selection.len();
            self.selection.retain(|a| !given.contains(a));
            if self.selection.len() != before {
                out.push(SyncAction::Notify(SwapEvent::SelectionChanged {
                    assets: self.selection.clone(),
                }));
                out.push(SyncAction::Publish(SwapMessage::PartnerNfts {
                    wallet_address: self.local.clone(),
                    assets: self.selection.clone(),
                }));
            }
            if let Some(partner) = self.partner.as_mut() {
                let received = agreement.counterpart_assets();
                partner.selected_nfts.retain(|a| !received.contains(a));
            }
            info!(round = %self.round, "trade round settled");
        }
        self.reset_round(&mut out);
        self.set_phase(TradePhase::Done, &mut out);
        out
    }

    /// The escrow was cancelled. The partner stays bound.
    pub fn cancel_round(&mut self) -> Vec<SyncAction> {
        let mut out = Vec::new();
        info!(round = %self.round, "trade round cancelled");
        self.reset_round(&mut out);
        self.set_phase(TradePhase::Idle, &mut out);
        out
    }

    /// The channel closed: forget the partner and the round.
    pub fn channel_lost(&mut self) -> Vec<SyncAction> {
        let mut out = Vec::new();
        self.reset_round(&mut out);
        self.replied_to.clear();
        if self.partner.take().is_some() {
            out.push(SyncAction::Notify(SwapEvent::PartnerChanged { partner: None }));
        }
        self.set_phase(TradePhase::Idle, &mut out);
        out
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_wallet(&self) -> Result<(), SyncError> {
        if self.local.is_empty() {
            Err(SyncError::NoWallet)
        } else {
            Ok(())
        }
    }

    fn record_edit(&mut self, origin: ChangeOrigin, out: &mut Vec<SyncAction>) {
        if self.acceptance.record_edit(origin) {
            out.push(SyncAction::Publish(SwapMessage::SwapAccepted {
                wallet_address: self.local.clone(),
                accepted: false,
            }));
        }
        if let Some(partner) = self.partner.as_mut() {
            partner.swap_accepted = self.acceptance.remote_accepted;
        }
        out.push(SyncAction::Notify(SwapEvent::SlotsChanged {
            slots: self.slots.clone(),
        }));
        out.push(SyncAction::Notify(SwapEvent::AcceptanceChanged {
            acceptance: self.acceptance,
        }));
        self.set_phase(TradePhase::Proposing, out);
    }

    fn enter_both_accepted(&mut self, out: &mut Vec<SyncAction>) {
        let Some(partner) = self.partner.as_ref().map(|p| p.wallet_address.clone()) else {
            return;
        };
        let role = resolve_role(&self.acceptance, &self.local, &partner);
        match EscrowAgreement::from_slots(
            &self.local,
            &partner,
            role,
            &self.slots,
            self.escrow_timeout_secs,
        ) {
            Ok(agreement) => {
                info!(
                    role = %role,
                    giving = agreement.local_assets().len(),
                    receiving = agreement.counterpart_assets().len(),
                    "both parties accepted"
                );
                self.agreement = Some(agreement.clone());
                self.set_phase(TradePhase::BothAccepted, out);
                out.push(SyncAction::Settle(SettlementTrigger::Agreed(agreement)));
            }
            Err(e) => {
                warn!(error = %e, "accepted slots do not form a valid escrow");
                out.push(SyncAction::Notify(SwapEvent::error(e.to_string())));
            }
        }
    }

    fn reset_round(&mut self, out: &mut Vec<SyncAction>) {
        let had_state = !self.slots.is_empty() || self.acceptance != AcceptanceState::default();
        self.slots = TradeSlots::new();
        self.acceptance.reset();
        self.agreement = None;
        if let Some(partner) = self.partner.as_mut() {
            partner.swap_accepted = false;
        }
        self.round = Uuid::new_v4();
        if had_state {
            out.push(SyncAction::Notify(SwapEvent::SlotsChanged {
                slots: self.slots.clone(),
            }));
            out.push(SyncAction::Notify(SwapEvent::AcceptanceChanged {
                acceptance: self.acceptance,
            }));
        }
    }

    fn set_phase(&mut self, to: TradePhase, out: &mut Vec<SyncAction>) {
        if self.phase == to {
            return;
        }
        let from = self.phase;
        debug!(%from, %to, "trade phase");
        self.phase = to;
        out.push(SyncAction::Notify(SwapEvent::PhaseChanged { from, to }));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
