//! The local model of the remote peer and of the acceptance handshake.

use serde::{Deserialize, Serialize};

use crate::identity::PeerIdentity;

use super::asset::AssetRef;

/// What the local client knows about its trading partner.
///
/// Created by the first wallet handshake message, updated as partner
/// messages arrive, and dropped when the channel closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPartner {
    pub wallet_address: PeerIdentity,
    /// The partner's advertised selection, replaced wholesale on every
    /// `partner-nfts` message.
    pub selected_nfts: Vec<AssetRef>,
    /// Mirror of [`AcceptanceState::remote_accepted`].
    pub swap_accepted: bool,
}

impl SwapPartner {
    pub fn new(wallet_address: PeerIdentity) -> Self {
        Self {
            wallet_address,
            selected_nfts: Vec::new(),
            swap_accepted: false,
        }
    }
}

/// Who made the most recent slot edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOrigin {
    Local,
    Remote,
}

/// Acceptance flags of the current round.
///
/// A slot edit always clears the local flag. A local edit also clears the
/// remote flag, since the partner drops its own acceptance when the edit
/// reaches it. A remote edit leaves the remote flag alone: the partner
/// announces its own withdrawal with a `swap-accepted` message, and those
/// arrive in order, so the flag tracks the partner's latest word even when
/// its acceptance overtakes the edit it refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceState {
    pub local_accepted: bool,
    pub remote_accepted: bool,
    /// Origin of the last slot edit; `None` until someone edits.
    pub last_change: Option<ChangeOrigin>,
}

impl AcceptanceState {
    /// The "I made the last change" flag of the tie-break rule.
    pub fn i_made_last_change(&self) -> bool {
        self.last_change == Some(ChangeOrigin::Local)
    }

    pub fn both_accepted(&self) -> bool {
        self.local_accepted && self.remote_accepted
    }

    /// Records an edit. Returns whether a local acceptance was withdrawn.
    pub fn record_edit(&mut self, origin: ChangeOrigin) -> bool {
        let withdrawn = self.local_accepted;
        self.local_accepted = false;
        if origin == ChangeOrigin::Local {
            self.remote_accepted = false;
        }
        self.last_change = Some(origin);
        withdrawn
    }

    /// Back to a fresh round.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_edit_clears_both_flags() {
        let mut acc = AcceptanceState {
            local_accepted: true,
            remote_accepted: true,
            last_change: Some(ChangeOrigin::Remote),
        };
        assert!(acc.record_edit(ChangeOrigin::Local));
        assert!(!acc.local_accepted);
        assert!(!acc.remote_accepted);
        assert!(acc.i_made_last_change());
    }

    #[test]
    fn remote_edit_keeps_partner_flag() {
        let mut acc = AcceptanceState {
            local_accepted: true,
            remote_accepted: true,
            last_change: Some(ChangeOrigin::Local),
        };
        assert!(acc.record_edit(ChangeOrigin::Remote));
        assert!(!acc.local_accepted);
        assert!(acc.remote_accepted);
        assert!(!acc.i_made_last_change());

        // Nothing to withdraw the second time.
        assert!(!acc.record_edit(ChangeOrigin::Remote));
    }

    #[test]
    fn local_edit_sets_last_change_flag() {
        let mut acc = AcceptanceState::default();
        assert!(!acc.i_made_last_change());
        acc.record_edit(ChangeOrigin::Local);
        assert!(acc.i_made_last_change());
    }

    #[test]
    fn new_partner_has_not_accepted() {
        let p = SwapPartner::new(PeerIdentity::new("bob"));
        assert!(!p.swap_accepted);
        assert!(p.selected_nfts.is_empty());
    }
}
