//! The frozen terms of a trade once both parties accepted, and the role
//! each party plays in settling it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{MAX_ASSETS_PER_SIDE, MIN_ASSETS_PER_SIDE};
use crate::escrow::EscrowAccountSnapshot;
use crate::identity::PeerIdentity;
use crate::sync::SyncError;
use crate::trade::{same_mints, AcceptanceState, AssetRef, ChangeOrigin, SlotSide, TradeSlots};

/// Which side of the escrow a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapRole {
    /// Creates the escrow and deposits first; the only party allowed to cancel.
    Initializer,
    /// Deposits into an existing escrow and collects in the same step.
    Taker,
}

impl SwapRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapRole::Initializer => "initializer",
            SwapRole::Taker => "taker",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            SwapRole::Initializer => SwapRole::Taker,
            SwapRole::Taker => SwapRole::Initializer,
        }
    }
}

impl std::fmt::Display for SwapRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tie-break rule: whoever made the last slot edit initializes.
///
/// Both peers observe the same last edit, one as `Local` and the other as
/// `Remote`, so exactly one of them resolves to `Initializer`. Before any
/// edit has been seen the lexicographically smaller address initializes.
pub fn resolve_role(
    acceptance: &AcceptanceState,
    local: &PeerIdentity,
    partner: &PeerIdentity,
) -> SwapRole {
    match acceptance.last_change {
        Some(ChangeOrigin::Local) => SwapRole::Initializer,
        Some(ChangeOrigin::Remote) => SwapRole::Taker,
        None if local < partner => SwapRole::Initializer,
        None => SwapRole::Taker,
    }
}

/// Terms both parties accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAgreement {
    /// Correlates asynchronous settlement results with the round that
    /// started them.
    pub id: Uuid,
    pub local_role: SwapRole,
    pub initializer: PeerIdentity,
    pub taker: PeerIdentity,
    pub initializer_assets: Vec<AssetRef>,
    pub taker_assets: Vec<AssetRef>,
    pub timeout_secs: i64,
}

impl EscrowAgreement {
    /// Freezes `slots` (local point of view) into escrow terms.
    pub fn from_slots(
        local: &PeerIdentity,
        partner: &PeerIdentity,
        local_role: SwapRole,
        slots: &TradeSlots,
        timeout_secs: i64,
    ) -> Result<Self, SyncError> {
        let mine = slots.assets(SlotSide::Mine);
        let theirs = slots.assets(SlotSide::Partner);
        check_count(SlotSide::Mine.as_str(), mine.len())?;
        check_count(SlotSide::Partner.as_str(), theirs.len())?;

        let (initializer, taker, initializer_assets, taker_assets) = match local_role {
            SwapRole::Initializer => (local.clone(), partner.clone(), mine, theirs),
            SwapRole::Taker => (partner.clone(), local.clone(), theirs, mine),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            local_role,
            initializer,
            taker,
            initializer_assets,
            taker_assets,
            timeout_secs,
        })
    }

    pub fn is_initializer(&self) -> bool {
        self.local_role == SwapRole::Initializer
    }

    /// The other party's wallet.
    pub fn counterpart(&self) -> &PeerIdentity {
        match self.local_role {
            SwapRole::Initializer => &self.taker,
            SwapRole::Taker => &self.initializer,
        }
    }

    /// Assets the local party gives away.
    pub fn local_assets(&self) -> &[AssetRef] {
        match self.local_role {
            SwapRole::Initializer => &self.initializer_assets,
            SwapRole::Taker => &self.taker_assets,
        }
    }

    /// Assets the local party receives.
    pub fn counterpart_assets(&self) -> &[AssetRef] {
        match self.local_role {
            SwapRole::Initializer => &self.taker_assets,
            SwapRole::Taker => &self.initializer_assets,
        }
    }

    /// Same parties and same asset sets, ignoring ids and slot order.
    pub fn same_terms(&self, other: &EscrowAgreement) -> bool {
        self.initializer == other.initializer
            && self.taker == other.taker
            && same_mints(&self.initializer_assets, &other.initializer_assets)
            && same_mints(&self.taker_assets, &other.taker_assets)
    }

    /// Whether an on-chain escrow records exactly these terms.
    pub fn matches(&self, snapshot: &EscrowAccountSnapshot) -> bool {
        self.initializer == snapshot.initializer
            && self.taker == snapshot.taker
            && same_mints(&self.initializer_assets, &snapshot.initializer_assets)
            && same_mints(&self.taker_assets, &snapshot.taker_assets)
    }
}

fn check_count(side: &'static str, count: usize) -> Result<(), SyncError> {
    if (MIN_ASSETS_PER_SIDE..=MAX_ASSETS_PER_SIDE).contains(&count) {
        Ok(())
    } else {
        Err(SyncError::InvalidAssetCount { side, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nft(mint: &str) -> AssetRef {
        AssetRef::new(mint, mint)
    }

    #[test]
    fn exactly_one_initializer_after_an_edit() {
        let a = PeerIdentity::new("A");
        let b = PeerIdentity::new("B");

        // A edited last: A sees Local, B sees Remote.
        let seen_by_a = AcceptanceState {
            local_accepted: true,
            remote_accepted: true,
            last_change: Some(ChangeOrigin::Local),
        };
        let seen_by_b = AcceptanceState {
            last_change: Some(ChangeOrigin::Remote),
            ..seen_by_a
        };
        assert_eq!(resolve_role(&seen_by_a, &a, &b), SwapRole::Initializer);
        assert_eq!(resolve_role(&seen_by_b, &b, &a), SwapRole::Taker);
    }

    #[test]
    fn address_order_breaks_ties_without_edits() {
        let a = PeerIdentity::new("Aaa");
        let b = PeerIdentity::new("Bbb");
        let none = AcceptanceState::default();
        assert_eq!(resolve_role(&none, &a, &b), SwapRole::Initializer);
        assert_eq!(resolve_role(&none, &b, &a), SwapRole::Taker);
    }

    #[test]
    fn taker_view_mirrors_initializer_view() {
        let a = PeerIdentity::new("A");
        let b = PeerIdentity::new("B");
        let a_slots = TradeSlots::from_assets(&[nft("M1")], &[nft("M2"), nft("M3")]).unwrap();
        let b_slots = a_slots.inverted();

        let at_a = EscrowAgreement::from_slots(&a, &b, SwapRole::Initializer, &a_slots, 60).unwrap();
        let at_b = EscrowAgreement::from_slots(&b, &a, SwapRole::Taker, &b_slots, 60).unwrap();

        assert!(at_a.same_terms(&at_b));
        assert_eq!(at_a.initializer_assets, vec![nft("M1")]);
        assert_eq!(at_b.local_assets(), &[nft("M2"), nft("M3")]);
        assert_eq!(at_b.counterpart(), &a);
        assert_eq!(at_a.counterpart_assets(), at_b.local_assets());
    }

    #[test]
    fn empty_side_is_rejected() {
        let slots = TradeSlots::from_assets(&[nft("M1")], &[]).unwrap();
        let err = EscrowAgreement::from_slots(
            &PeerIdentity::new("A"),
            &PeerIdentity::new("B"),
            SwapRole::Initializer,
            &slots,
            60,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SyncError::InvalidAssetCount {
                side: "partner",
                count: 0
            }
        );
    }
}
