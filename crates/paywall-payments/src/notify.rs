//! Entitlement Notifications
//!
//! Fire-and-forget events published after a reconciliation commits. Chat
//! transport and other live surfaces subscribe; nobody listening is fine.

use chrono::{DateTime, Utc};
use paywall_core::{PaymentKind, PaymentRail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Something a user just gained (or lost through a refund)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EntitlementEvent {
    SubscriptionActivated {
        user_id: String,
        plan_id: String,
        provider: PaymentRail,
        period_end: DateTime<Utc>,
    },
    MediaUnlocked {
        user_id: String,
        media_id: String,
    },
    MessageUnlocked {
        user_id: String,
        message_id: String,
    },
    TipReceived {
        user_id: String,
        message_id: Option<String>,
        amount: Decimal,
    },
    PaymentRefunded {
        user_id: String,
        payment_id: String,
        kind: PaymentKind,
    },
}

impl EntitlementEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::SubscriptionActivated { user_id, .. }
            | Self::MediaUnlocked { user_id, .. }
            | Self::MessageUnlocked { user_id, .. }
            | Self::TipReceived { user_id, .. }
            | Self::PaymentRefunded { user_id, .. } => user_id,
        }
    }
}

/// Broadcast hub for [`EntitlementEvent`]s
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: broadcast::Sender<EntitlementEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntitlementEvent> {
        self.tx.subscribe()
    }

    /// Publish without waiting; returns how many subscribers saw it.
    pub fn publish(&self, event: EntitlementEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::debug!(user_id = %event.user_id(), "No entitlement subscribers");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        let event = EntitlementEvent::MessageUnlocked {
            user_id: "fan".into(),
            message_id: "msg_1".into(),
        };
        assert_eq!(notifier.publish(event.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let notifier = Notifier::new(4);
        let sent = notifier.publish(EntitlementEvent::MediaUnlocked {
            user_id: "fan".into(),
            media_id: "m1".into(),
        });
        assert_eq!(sent, 0);
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(EntitlementEvent::TipReceived {
            user_id: "fan".into(),
            message_id: Some("msg_1".into()),
            amount: Decimal::new(500, 2),
        })
        .unwrap();
        assert_eq!(json["event"], "tip_received");
        assert_eq!(json["userId"], "fan");
        assert_eq!(json["messageId"], "msg_1");
    }
}
