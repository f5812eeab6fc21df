//! Notification fan-out.
//!
//! Expands one mutation event into per-recipient notification records.
//! Recipient selection, in precedence order: current watchers of the bug,
//! the newly changed assignee, subjects mentioned in the newly added
//! content. The acting subject is always excluded, mentioned subjects
//! without project membership are dropped, and a recipient selected by
//! several rules still gets exactly one notification for the event.
//!
//! Persistence is a single batch and is best-effort relative to the
//! mutation of record: a failed batch is the caller's to log and swallow,
//! never to retry or roll back.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use bugline_core::{
    Bug, Clock, Notification, NotificationKind, Repository, Result,
};

/// A completed mutation, as seen by the fan-out.
///
/// The pipeline snapshots the watcher list itself (post-persist for
/// create/update/comment, pre-delete for delete) so the fan-out never
/// reads state the mutation already tore down.
#[derive(Debug, Clone)]
pub struct FanoutEvent {
    /// Originating mutation event id — dedup key with the recipient.
    pub event_id: Uuid,
    pub kind: NotificationKind,
    /// Acting subject; never a recipient.
    pub actor_id: Uuid,
    pub bug: Bug,
    /// Watchers of the bug at mutation time.
    pub watcher_ids: Vec<Uuid>,
    /// Subjects resolved from mentions in the newly added content.
    pub mention_ids: Vec<Uuid>,
    /// New assignee, when this event changed the assignment.
    pub assignee_changed_to: Option<Uuid>,
}

/// Converts mutation outcomes into persisted notification batches.
pub struct NotificationFanout {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl NotificationFanout {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Compute the deduplicated recipient set and persist one notification
    /// per recipient as a batch.
    pub async fn fanout(&self, event: &FanoutEvent) -> Result<Vec<Notification>> {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut recipients: Vec<Uuid> = Vec::new();
        let mut select = |id: Uuid| {
            if id != event.actor_id && seen.insert(id) {
                recipients.push(id);
            }
        };

        for watcher in &event.watcher_ids {
            select(*watcher);
        }
        if let Some(assignee) = event.assignee_changed_to {
            select(assignee);
        }
        for mention in &event.mention_ids {
            // Mentioned subjects must hold membership on the bug's project.
            let is_member = self
                .repo
                .memberships
                .get(*mention, event.bug.project_id)
                .await?
                .is_some();
            if is_member {
                select(*mention);
            }
        }

        let now = self.clock.now();
        let notifications: Vec<Notification> = recipients
            .into_iter()
            .map(|recipient_id| Notification {
                id: Uuid::now_v7(),
                recipient_id,
                event_id: event.event_id,
                kind: event.kind,
                bug_id: event.bug.id,
                actor_id: event.actor_id,
                read: false,
                created_at: now,
            })
            .collect();

        if !notifications.is_empty() {
            self.repo.notifications.insert_batch(&notifications).await?;
        }
        debug!(
            subsystem = "fanout",
            op = "fanout",
            event_id = %event.event_id,
            bug_id = %event.bug.id,
            recipient_count = notifications.len(),
            "fanned out mutation event"
        );
        Ok(notifications)
    }
}
