//! Room-scoped event broadcast.
//!
//! The broadcaster turns a payload into a [`RoomEvent`] envelope and hands
//! it to every live connection joined to the target room, as tracked by the
//! presence registry. Events reach the per-connection channels in the order
//! `broadcast` calls are issued; connections joining after a call returns
//! never see that event (no buffering, no replay).

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use bugline_core::{EventPayload, Room, RoomEvent};

use crate::presence::PresenceTracker;

/// Fire-and-forget fan-out to a room's live connections.
#[derive(Clone)]
pub struct RealtimeBroadcaster {
    tracker: Arc<PresenceTracker>,
}

impl RealtimeBroadcaster {
    pub fn new(tracker: Arc<PresenceTracker>) -> Self {
        Self { tracker }
    }

    /// Envelope `payload` and deliver it to everyone in `room`.
    ///
    /// Per-connection delivery never blocks: a slow or closed connection is
    /// skipped without affecting the others. Returns the delivered event so
    /// callers can re-address it to sibling rooms.
    pub fn broadcast(&self, room: Room, actor: Option<Uuid>, payload: EventPayload) -> RoomEvent {
        let event = RoomEvent::new(room, actor, payload);
        self.deliver(&event);
        event
    }

    /// Deliver an already-enveloped event to its room, preserving the
    /// originating event id (used when one mutation fans out to several
    /// rooms).
    pub fn deliver(&self, event: &RoomEvent) -> usize {
        let delivered = self.tracker.deliver(event);
        debug!(
            subsystem = "broadcast",
            event_type = event.event_type,
            event_id = %event.event_id,
            room = %event.room,
            delivery_count = delivered,
            "broadcast event"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceConfig;
    use bugline_core::{PresenceUser, SystemClock};

    fn setup() -> (Arc<PresenceTracker>, RealtimeBroadcaster) {
        let tracker = Arc::new(PresenceTracker::new(
            PresenceConfig::default(),
            Arc::new(SystemClock),
        ));
        let broadcaster = RealtimeBroadcaster::new(tracker.clone());
        (tracker, broadcaster)
    }

    fn user(name: &str) -> PresenceUser {
        PresenceUser {
            subject_id: Uuid::new_v4(),
            username: name.to_string(),
        }
    }

    fn payload(name: &str) -> EventPayload {
        EventPayload::PresenceUserJoined { user: user(name) }
    }

    #[tokio::test]
    async fn test_delivers_to_all_room_members() {
        let (tracker, broadcaster) = setup();
        let room = Room::bug(Uuid::new_v4());
        let (a, mut rx_a) = tracker.connect(user("a"));
        let (b, mut rx_b) = tracker.connect(user("b"));
        tracker.join_room(a, room).unwrap();
        tracker.join_room(b, room).unwrap();
        // Drain join traffic.
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        let event = broadcaster.broadcast(room, None, payload("x"));
        assert_eq!(rx_a.recv().await.unwrap().event_id, event.event_id);
        assert_eq!(rx_b.recv().await.unwrap().event_id, event.event_id);
    }

    #[tokio::test]
    async fn test_no_delivery_outside_room() {
        let (tracker, broadcaster) = setup();
        let room = Room::bug(Uuid::new_v4());
        let (a, mut rx_a) = tracker.connect(user("a"));
        tracker.join_room(a, Room::global()).unwrap();
        while rx_a.try_recv().is_ok() {}

        broadcaster.broadcast(room, None, payload("x"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_joiner_misses_event() {
        let (tracker, broadcaster) = setup();
        let room = Room::project(Uuid::new_v4());

        broadcaster.broadcast(room, None, payload("early"));

        let (late, mut rx) = tracker.connect(user("late"));
        tracker.join_room(late, room).unwrap();
        let snapshot = rx.recv().await.unwrap();
        assert!(matches!(
            snapshot.payload,
            EventPayload::PresenceUsers { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_connection_does_not_block_others() {
        let (tracker, broadcaster) = setup();
        let room = Room::bug(Uuid::new_v4());
        let (dead, rx_dead) = tracker.connect(user("dead"));
        let (live, mut rx_live) = tracker.connect(user("live"));
        tracker.join_room(dead, room).unwrap();
        tracker.join_room(live, room).unwrap();
        drop(rx_dead);
        while rx_live.try_recv().is_ok() {}

        let delivered = broadcaster.deliver(&RoomEvent::new(room, None, payload("x")));
        assert_eq!(delivered, 1);
        assert!(rx_live.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_submission_order_preserved() {
        let (tracker, broadcaster) = setup();
        let room = Room::global();
        let (a, mut rx) = tracker.connect(user("a"));
        tracker.join_room(a, room).unwrap();
        while rx.try_recv().is_ok() {}

        let first = broadcaster.broadcast(room, None, payload("1"));
        let second = broadcaster.broadcast(room, None, payload("2"));
        let third = broadcaster.broadcast(room, None, payload("3"));

        assert_eq!(rx.recv().await.unwrap().event_id, first.event_id);
        assert_eq!(rx.recv().await.unwrap().event_id, second.event_id);
        assert_eq!(rx.recv().await.unwrap().event_id, third.event_id);
    }
}
