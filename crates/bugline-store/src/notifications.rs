//! Notification repository implementation.

use async_trait::async_trait;
use uuid::Uuid;

use bugline_core::{Error, Notification, NotificationRepository, Result};

use crate::state::Shared;

/// In-memory implementation of NotificationRepository.
pub struct MemNotificationRepository {
    state: Shared,
}

impl MemNotificationRepository {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

#[async_trait]
impl NotificationRepository for MemNotificationRepository {
    async fn insert_batch(&self, notifications: &[Notification]) -> Result<()> {
        let mut state = self.state.write().await;
        // All-or-nothing: reject the whole batch if any (recipient, event)
        // pair already exists. The fan-out dedupes within a batch; this
        // guards against a replayed batch.
        for n in notifications {
            let duplicate = state
                .notifications
                .iter()
                .any(|existing| {
                    existing.recipient_id == n.recipient_id && existing.event_id == n.event_id
                });
            if duplicate {
                return Err(Error::Conflict(format!(
                    "notification for recipient {} and event {} already exists",
                    n.recipient_id, n.event_id
                )));
            }
        }
        state.notifications.extend_from_slice(notifications);
        Ok(())
    }

    async fn list_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        let state = self.state.read().await;
        let mut result: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn mark_read(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        match state.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                Ok(())
            }
            None => Err(Error::NotFound(format!("notification {id}"))),
        }
    }
}
