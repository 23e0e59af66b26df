use chrono::Utc;
use dashmap::DashMap;
use sea_orm::ActiveValue::Set;
use sea_orm::ActiveModelTrait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    entity::notifications::{ActiveModel as NotificationActive, Model as NotificationModel},
    models::{Notification, NotificationKind},
    state::AppState,
};

const CHANNEL_CAPACITY: usize = 64;

/// Per-user broadcast hub feeding the SSE stream. Replaces polling the
/// notifications table on an interval.
pub struct NotificationHub {
    channels: DashMap<Uuid, broadcast::Sender<Notification>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a user's notifications. Creates the channel if needed.
    pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Push a notification. No-op if nobody is listening.
    pub fn push(&self, user_id: Uuid, notification: &Notification) {
        if let Some(sender) = self.channels.get(&user_id) {
            let _ = sender.send(notification.clone());
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire-and-forget: insert the row and push it to any live stream. Failures
/// are logged and swallowed so a notification can never fail the booking or
/// payment transition it is attached to.
pub async fn emit(state: &AppState, user_id: Uuid, kind: NotificationKind, message: &str) {
    let row = NotificationActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        kind: Set(kind),
        message: Set(message.to_string()),
        read: Set(false),
        created_at: Set(Utc::now().into()),
    };

    match row.insert(&state.orm).await {
        Ok(model) => {
            let notification = notification_from_entity(model);
            state.notify.push(user_id, &notification);
        }
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "notification emit failed");
        }
    }
}

pub fn notification_from_entity(model: NotificationModel) -> Notification {
    Notification {
        id: model.id,
        user_id: model.user_id,
        kind: model.kind,
        message: model.message,
        read: model.read,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationKind::BookingConfirmed,
            message: "Your booking is confirmed".into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotificationHub::new();
        let user_id = Uuid::new_v4();
        let mut rx = hub.subscribe(user_id);

        let n = sample(user_id);
        hub.push(user_id, &n);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, n.id);
    }

    #[tokio::test]
    async fn push_without_subscribers_is_noop() {
        let hub = NotificationHub::new();
        let user_id = Uuid::new_v4();
        hub.push(user_id, &sample(user_id));
    }

    #[tokio::test]
    async fn subscribers_are_isolated_per_user() {
        let hub = NotificationHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut alice_rx = hub.subscribe(alice);
        let mut bob_rx = hub.subscribe(bob);

        hub.push(alice, &sample(alice));

        assert!(alice_rx.recv().await.is_ok());
        assert!(bob_rx.try_recv().is_err());
    }
}
