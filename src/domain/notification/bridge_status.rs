//! Lifecycle status of a notification bridge.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Where a bridge is in its subscribe/unsubscribe lifecycle.
///
/// ```text
///          subject set           joined & live
///   Idle ──────────────▶ Connecting ─────────────▶ Subscribed
///    ▲                     │  ▲                      │  │
///    │   subject cleared   │  │ subject changed /    │  │
///    └─────────────────────┘  │ link dropped         │  │
///    ▲                        └──────────────────────┘  │
///    └──────────────────────────────────────────────────┘
///                    subject cleared
///
///   any state ── teardown ──▶ TornDown (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    /// No restaurant selected; no registry interaction.
    #[default]
    Idle,
    /// A restaurant is selected but the link is not (yet) live.
    Connecting,
    /// Joined to the restaurant channel over a live link.
    Subscribed,
    /// Consumer is gone; nothing further happens.
    TornDown,
}

impl BridgeStatus {
    /// True while the bridge wants events for some restaurant.
    pub fn has_intent(&self) -> bool {
        matches!(self, BridgeStatus::Connecting | BridgeStatus::Subscribed)
    }
}

impl StateMachine for BridgeStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use BridgeStatus::*;
        matches!(
            (self, target),
            (Idle, Connecting)
                | (Connecting, Subscribed)
                | (Connecting, Idle)
                | (Subscribed, Connecting)
                | (Subscribed, Idle)
                | (Idle, TornDown)
                | (Connecting, TornDown)
                | (Subscribed, TornDown)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use BridgeStatus::*;
        match self {
            Idle => vec![Connecting, TornDown],
            Connecting => vec![Subscribed, Idle, TornDown],
            Subscribed => vec![Connecting, Idle, TornDown],
            TornDown => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BridgeStatus; 4] = [
        BridgeStatus::Idle,
        BridgeStatus::Connecting,
        BridgeStatus::Subscribed,
        BridgeStatus::TornDown,
    ];

    #[test]
    fn default_is_idle() {
        assert_eq!(BridgeStatus::default(), BridgeStatus::Idle);
    }

    #[test]
    fn idle_cannot_jump_straight_to_subscribed() {
        assert!(BridgeStatus::Idle
            .transition_to(BridgeStatus::Subscribed)
            .is_err());
    }

    #[test]
    fn every_live_state_can_be_torn_down() {
        for status in [BridgeStatus::Idle, BridgeStatus::Connecting, BridgeStatus::Subscribed] {
            assert!(status.can_transition_to(&BridgeStatus::TornDown));
        }
    }

    #[test]
    fn torn_down_is_terminal() {
        assert!(BridgeStatus::TornDown.is_terminal());
        for target in ALL {
            assert!(!BridgeStatus::TornDown.can_transition_to(&target));
        }
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for status in ALL {
            for target in ALL {
                assert_eq!(
                    status.can_transition_to(&target),
                    status.valid_transitions().contains(&target),
                    "{:?} -> {:?}",
                    status,
                    target
                );
            }
        }
    }

    #[test]
    fn has_intent_only_while_connecting_or_subscribed() {
        assert!(!BridgeStatus::Idle.has_intent());
        assert!(BridgeStatus::Connecting.has_intent());
        assert!(BridgeStatus::Subscribed.has_intent());
        assert!(!BridgeStatus::TornDown.has_intent());
    }
}
