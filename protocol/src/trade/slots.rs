//! Trade slots: the concrete assets proposed in the current round.
//!
//! Each client holds two fixed arrays of three optional assets, one for its
//! own side and one for the partner's. The arrays are relative: what one
//! client calls `my_slots` the other calls `partner_slots`, so every received
//! slot message is inverted before it is applied.

use serde::{Deserialize, Serialize};

use crate::config::MAX_ASSETS_PER_SIDE;
use crate::sync::SyncError;

use super::asset::AssetRef;

/// Which half of the slot board an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotSide {
    /// Assets the local user gives away.
    Mine,
    /// Assets the local user receives.
    Partner,
}

impl SlotSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotSide::Mine => "mine",
            SlotSide::Partner => "partner",
        }
    }
}

/// One slot row.
pub type SlotRow = [Option<AssetRef>; MAX_ASSETS_PER_SIDE];

/// The slot board of one trade round, from the local point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSlots {
    pub my_slots: SlotRow,
    pub partner_slots: SlotRow,
}

impl TradeSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from packed asset lists. Fails when either list is
    /// longer than a row.
    pub fn from_assets(mine: &[AssetRef], partner: &[AssetRef]) -> Result<Self, SyncError> {
        let mut slots = Self::new();
        for (side, assets) in [(SlotSide::Mine, mine), (SlotSide::Partner, partner)] {
            if assets.len() > MAX_ASSETS_PER_SIDE {
                return Err(SyncError::InvalidAssetCount {
                    side: side.as_str(),
                    count: assets.len(),
                });
            }
            for (i, asset) in assets.iter().enumerate() {
                slots.assign(side, i, asset.clone())?;
            }
        }
        Ok(slots)
    }

    /// The same board seen from the other peer.
    pub fn inverted(&self) -> Self {
        Self {
            my_slots: self.partner_slots.clone(),
            partner_slots: self.my_slots.clone(),
        }
    }

    pub fn row(&self, side: SlotSide) -> &SlotRow {
        match side {
            SlotSide::Mine => &self.my_slots,
            SlotSide::Partner => &self.partner_slots,
        }
    }

    fn row_mut(&mut self, side: SlotSide) -> &mut SlotRow {
        match side {
            SlotSide::Mine => &mut self.my_slots,
            SlotSide::Partner => &mut self.partner_slots,
        }
    }

    /// Puts `asset` into slot `index` of `side`, replacing whatever was there.
    ///
    /// An asset may occupy at most one slot on a side.
    pub fn assign(&mut self, side: SlotSide, index: usize, asset: AssetRef) -> Result<(), SyncError> {
        if index >= MAX_ASSETS_PER_SIDE {
            return Err(SyncError::SlotOutOfRange { index });
        }
        let row = self.row_mut(side);
        let taken_elsewhere = row
            .iter()
            .enumerate()
            .any(|(i, slot)| i != index && slot.as_ref() == Some(&asset));
        if taken_elsewhere {
            return Err(SyncError::DuplicateAsset { mint: asset.mint });
        }
        row[index] = Some(asset);
        Ok(())
    }

    /// Empties slot `index` of `side`. Returns the asset that was there.
    pub fn clear(&mut self, side: SlotSide, index: usize) -> Result<Option<AssetRef>, SyncError> {
        if index >= MAX_ASSETS_PER_SIDE {
            return Err(SyncError::SlotOutOfRange { index });
        }
        Ok(self.row_mut(side)[index].take())
    }

    /// Filled slots of `side`, in slot order.
    pub fn assets(&self, side: SlotSide) -> Vec<AssetRef> {
        self.row(side).iter().flatten().cloned().collect()
    }

    pub fn count(&self, side: SlotSide) -> usize {
        self.row(side).iter().filter(|s| s.is_some()).count()
    }

    /// Both sides hold at least one asset: the accept precondition.
    pub fn is_ready(&self) -> bool {
        self.count(SlotSide::Mine) > 0 && self.count(SlotSide::Partner) > 0
    }

    pub fn is_empty(&self) -> bool {
        self.count(SlotSide::Mine) == 0 && self.count(SlotSide::Partner) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nft(mint: &str) -> AssetRef {
        AssetRef::new(mint, format!("NFT {}", mint))
    }

    #[test]
    fn inversion_swaps_rows() {
        let slots = TradeSlots::from_assets(&[nft("M1")], &[nft("M2"), nft("M3")]).unwrap();
        let inv = slots.inverted();
        assert_eq!(inv.my_slots, slots.partner_slots);
        assert_eq!(inv.partner_slots, slots.my_slots);
        assert_eq!(inv.inverted(), slots);
    }

    #[test]
    fn assign_and_clear() {
        let mut slots = TradeSlots::new();
        slots.assign(SlotSide::Mine, 2, nft("M1")).unwrap();
        assert_eq!(slots.count(SlotSide::Mine), 1);
        assert_eq!(slots.assets(SlotSide::Mine), vec![nft("M1")]);

        let removed = slots.clear(SlotSide::Mine, 2).unwrap();
        assert_eq!(removed, Some(nft("M1")));
        assert!(slots.is_empty());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut slots = TradeSlots::new();
        assert_eq!(
            slots.assign(SlotSide::Partner, 3, nft("M1")),
            Err(SyncError::SlotOutOfRange { index: 3 })
        );
        assert_eq!(
            slots.clear(SlotSide::Partner, 7),
            Err(SyncError::SlotOutOfRange { index: 7 })
        );
    }

    #[test]
    fn same_asset_twice_on_one_side_is_rejected() {
        let mut slots = TradeSlots::new();
        slots.assign(SlotSide::Mine, 0, nft("M1")).unwrap();
        assert!(matches!(
            slots.assign(SlotSide::Mine, 1, nft("M1")),
            Err(SyncError::DuplicateAsset { .. })
        ));
        // Re-assigning the same slot is fine.
        slots.assign(SlotSide::Mine, 0, nft("M1")).unwrap();
    }

    #[test]
    fn readiness_needs_both_sides() {
        let mut slots = TradeSlots::new();
        assert!(!slots.is_ready());
        slots.assign(SlotSide::Mine, 0, nft("M1")).unwrap();
        assert!(!slots.is_ready());
        slots.assign(SlotSide::Partner, 1, nft("M2")).unwrap();
        assert!(slots.is_ready());
    }

    #[test]
    fn too_many_assets_is_rejected() {
        let four: Vec<AssetRef> = (0..4).map(|i| nft(&format!("M{}", i))).collect();
        assert!(matches!(
            TradeSlots::from_assets(&four, &[]),
            Err(SyncError::InvalidAssetCount { count: 4, .. })
        ));
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let slots = TradeSlots::from_assets(&[nft("M1")], &[]).unwrap();
        let json = serde_json::to_value(&slots).unwrap();
        assert!(json.get("mySlots").is_some());
        assert!(json.get("partnerSlots").is_some());
        assert_eq!(json["partnerSlots"], serde_json::json!([null, null, null]));
    }
}
