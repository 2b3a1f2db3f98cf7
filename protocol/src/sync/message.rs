//! # Wire Messages
//!
//! The closed set of messages two paired clients exchange on their shared
//! topic. Each message travels as an event name plus a JSON payload; every
//! payload carries the sender's wallet address so receivers can drop their
//! own echoes.
//!
//! ```text
//! partner-wallet-new       { senderAddress }
//! partner-wallet-response  { senderAddress }
//! partner-nfts             { walletAddress, assets }
//! trade-slots              { walletAddress, slots: { mySlots, partnerSlots } }
//! swap-accepted            { walletAddress, accepted }
//! escrow-initialized       { walletAddress, signature? }
//! escrow-deposited         { walletAddress, signature? }
//! escrow-cancelled         { walletAddress, signature? }
//! ```
//!
//! `signature` is absent when a step was recovered from existing on-chain
//! state rather than performed by a fresh transaction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::PeerIdentity;
use crate::trade::{AssetRef, TradeSlots};

use super::error::SyncError;

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SwapMessage {
    /// "I am here": sent on joining a topic.
    PartnerWalletNew {
        #[serde(rename = "senderAddress")]
        sender_address: PeerIdentity,
    },
    /// Reply to `partner-wallet-new`, sent at most once per sender.
    PartnerWalletResponse {
        #[serde(rename = "senderAddress")]
        sender_address: PeerIdentity,
    },
    /// The sender's full selection of offerable NFTs.
    PartnerNfts {
        #[serde(rename = "walletAddress")]
        wallet_address: PeerIdentity,
        assets: Vec<AssetRef>,
    },
    /// The sender's slot board, from the sender's point of view.
    TradeSlots {
        #[serde(rename = "walletAddress")]
        wallet_address: PeerIdentity,
        slots: TradeSlots,
    },
    /// The sender accepted (or withdrew acceptance of) the current slots.
    SwapAccepted {
        #[serde(rename = "walletAddress")]
        wallet_address: PeerIdentity,
        accepted: bool,
    },
    /// The initializer created the escrow; the taker may deposit.
    EscrowInitialized {
        #[serde(rename = "walletAddress")]
        wallet_address: PeerIdentity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// The taker deposited and collected; the initializer may complete.
    EscrowDeposited {
        #[serde(rename = "walletAddress")]
        wallet_address: PeerIdentity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// The initializer cancelled the escrow; the round is over.
    EscrowCancelled {
        #[serde(rename = "walletAddress")]
        wallet_address: PeerIdentity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

impl SwapMessage {
    /// Wire event name.
    pub fn event(&self) -> &'static str {
        use crate::config::*;
        match self {
            Self::PartnerWalletNew { .. } => EVENT_PARTNER_WALLET_NEW,
            Self::PartnerWalletResponse { .. } => EVENT_PARTNER_WALLET_RESPONSE,
            Self::PartnerNfts { .. } => EVENT_PARTNER_NFTS,
            Self::TradeSlots { .. } => EVENT_TRADE_SLOTS,
            Self::SwapAccepted { .. } => EVENT_SWAP_ACCEPTED,
            Self::EscrowInitialized { .. } => EVENT_ESCROW_INITIALIZED,
            Self::EscrowDeposited { .. } => EVENT_ESCROW_DEPOSITED,
            Self::EscrowCancelled { .. } => EVENT_ESCROW_CANCELLED,
        }
    }

    /// The wallet that published this message.
    pub fn origin(&self) -> &PeerIdentity {
        match self {
            Self::PartnerWalletNew { sender_address }
            | Self::PartnerWalletResponse { sender_address } => sender_address,
            Self::PartnerNfts { wallet_address, .. }
            | Self::TradeSlots { wallet_address, .. }
            | Self::SwapAccepted { wallet_address, .. }
            | Self::EscrowInitialized { wallet_address, .. }
            | Self::EscrowDeposited { wallet_address, .. }
            | Self::EscrowCancelled { wallet_address, .. } => wallet_address,
        }
    }

    /// Splits the message into its event name and JSON payload.
    pub fn encode(&self) -> Result<(&'static str, Value), SyncError> {
        let mut tagged = serde_json::to_value(self).map_err(|e| SyncError::Decode {
            event: self.event().to_string(),
            reason: e.to_string(),
        })?;
        let payload = tagged
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok((self.event(), payload))
    }

    /// Rebuilds a message from an event name and payload.
    pub fn decode(event: &str, payload: Value) -> Result<Self, SyncError> {
        if !crate::config::ALL_EVENTS.contains(&event) {
            return Err(SyncError::UnknownEvent(event.to_string()));
        }
        let tagged = serde_json::json!({ "event": event, "payload": payload });
        serde_json::from_value(tagged).map_err(|e| SyncError::Decode {
            event: event.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use serde_json::json;

    fn alice() -> PeerIdentity {
        PeerIdentity::new("alice")
    }

    #[test]
    fn event_names_match_config() {
        let cases = vec![
            SwapMessage::PartnerWalletNew { sender_address: alice() },
            SwapMessage::PartnerWalletResponse { sender_address: alice() },
            SwapMessage::PartnerNfts { wallet_address: alice(), assets: vec![] },
            SwapMessage::TradeSlots { wallet_address: alice(), slots: TradeSlots::new() },
            SwapMessage::SwapAccepted { wallet_address: alice(), accepted: true },
            SwapMessage::EscrowInitialized { wallet_address: alice(), signature: None },
            SwapMessage::EscrowDeposited { wallet_address: alice(), signature: None },
            SwapMessage::EscrowCancelled { wallet_address: alice(), signature: None },
        ];
        let names: Vec<&str> = cases.iter().map(|m| m.event()).collect();
        assert_eq!(names, config::ALL_EVENTS.to_vec());

        for msg in cases {
            let (event, payload) = msg.encode().unwrap();
            assert_eq!(event, msg.event());
            assert_eq!(SwapMessage::decode(event, payload).unwrap(), msg);
        }
    }

    #[test]
    fn payload_uses_wire_field_names() {
        let msg = SwapMessage::SwapAccepted {
            wallet_address: alice(),
            accepted: true,
        };
        let (_, payload) = msg.encode().unwrap();
        assert_eq!(payload, json!({ "walletAddress": "alice", "accepted": true }));

        let msg = SwapMessage::PartnerWalletNew {
            sender_address: alice(),
        };
        let (_, payload) = msg.encode().unwrap();
        assert_eq!(payload, json!({ "senderAddress": "alice" }));
    }

    #[test]
    fn decodes_foreign_trade_slots_payload() {
        let payload = json!({
            "walletAddress": "bob",
            "slots": {
                "mySlots": [{ "mint": "M2", "name": "Two" }, null, null],
                "partnerSlots": [null, { "mint": "M1" }, null]
            }
        });
        let msg = SwapMessage::decode(config::EVENT_TRADE_SLOTS, payload).unwrap();
        match msg {
            SwapMessage::TradeSlots { wallet_address, slots } => {
                assert_eq!(wallet_address.as_str(), "bob");
                assert_eq!(slots.my_slots[0].as_ref().unwrap().mint, "M2");
                assert_eq!(slots.partner_slots[1].as_ref().unwrap().mint, "M1");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_event() {
        assert_eq!(
            SwapMessage::decode("chat", json!({})),
            Err(SyncError::UnknownEvent("chat".into()))
        );
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = SwapMessage::decode(config::EVENT_SWAP_ACCEPTED, json!({ "accepted": "yes" }))
            .unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }));
    }

    #[test]
    fn missing_signature_is_allowed() {
        let msg = SwapMessage::decode(
            config::EVENT_ESCROW_INITIALIZED,
            json!({ "walletAddress": "alice" }),
        )
        .unwrap();
        assert_eq!(msg.origin(), &alice());
    }
}
