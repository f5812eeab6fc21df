//! Room scopes, event envelope, and event payloads for real-time delivery.
//!
//! Every live-delivered message is a [`RoomEvent`]: a versioned,
//! self-describing envelope around a domain payload. The envelope carries
//! metadata (UUIDv7 event id for temporal ordering, timestamp, acting
//! subject, target room) while `payload` holds the domain data.
//!
//! ## Wire format
//!
//! Payloads serialize with a `type` tag, e.g.:
//!
//! ```text
//! {"event_id":"...","event_type":"bug:updated","room":"bug:07b2...",
//!  "occurred_at":"...","actor":"...","payload":{"type":"BugUpdated",...}}
//! ```
//!
//! Consumers should ignore unknown fields (forward compatibility);
//! `payload_version` increments on breaking payload changes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{ActivityLogEntry, Bug, Comment, Notification};

// ============================================================================
// Rooms
// ============================================================================

/// The entity scope a room is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "id")]
pub enum RoomScope {
    /// Every connection interested in system-wide traffic.
    Global,
    /// One project's bug traffic.
    Project(Uuid),
    /// One bug's updates and comments.
    Bug(Uuid),
    /// A subject's personal channel (notifications).
    Subject(Uuid),
}

/// A logical broadcast scope that live connections join.
///
/// Each scope exists in two variants: the plain room carrying domain
/// events, and a presence-suffixed sibling carrying join/leave traffic.
/// Rooms are pure identifiers — membership lives in the presence tracker
/// and is derived entirely from live sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Room {
    pub scope: RoomScope,
    pub presence: bool,
}

impl Room {
    pub fn global() -> Self {
        Room {
            scope: RoomScope::Global,
            presence: false,
        }
    }

    pub fn project(id: Uuid) -> Self {
        Room {
            scope: RoomScope::Project(id),
            presence: false,
        }
    }

    pub fn bug(id: Uuid) -> Self {
        Room {
            scope: RoomScope::Bug(id),
            presence: false,
        }
    }

    /// The personal channel a subject's notifications are delivered on.
    pub fn subject(id: Uuid) -> Self {
        Room {
            scope: RoomScope::Subject(id),
            presence: false,
        }
    }

    /// The presence-suffixed sibling of this room.
    pub fn presence_variant(self) -> Self {
        Room {
            scope: self.scope,
            presence: true,
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            RoomScope::Global => write!(f, "global")?,
            RoomScope::Project(id) => write!(f, "project:{id}")?,
            RoomScope::Bug(id) => write!(f, "bug:{id}")?,
            RoomScope::Subject(id) => write!(f, "user:{id}")?,
        }
        if self.presence {
            write!(f, ":presence")?;
        }
        Ok(())
    }
}

impl Serialize for Room {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Event payloads
// ============================================================================

/// Minimal subject view carried by presence events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceUser {
    pub subject_id: Uuid,
    pub username: String,
}

/// Domain-specific event data, serialized with a `type` tag field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// A bug was filed. Carries the full snapshot plus the creation
    /// activity entry.
    BugCreated {
        bug: Bug,
        activity: ActivityLogEntry,
    },
    /// A bug changed. Carries the post-mutation snapshot plus the diff
    /// activity entry.
    BugUpdated {
        bug: Bug,
        activity: ActivityLogEntry,
    },
    /// A bug was deleted. Carries the last snapshot plus the deletion
    /// activity entry.
    BugDeleted {
        bug: Bug,
        activity: ActivityLogEntry,
    },
    /// A comment was added.
    CommentCreated { comment: Comment, bug_id: Uuid },
    /// One notification, delivered only on the recipient's personal room.
    NotificationNew { notification: Notification },
    /// Full member list, sent to a session on join.
    PresenceUsers { users: Vec<PresenceUser> },
    /// Incremental membership delta: someone joined.
    PresenceUserJoined { user: PresenceUser },
    /// Incremental membership delta: someone left.
    PresenceUserLeft { user: PresenceUser },
}

impl EventPayload {
    /// Colon-namespaced event type name for the envelope.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::BugCreated { .. } => "bug:created",
            EventPayload::BugUpdated { .. } => "bug:updated",
            EventPayload::BugDeleted { .. } => "bug:deleted",
            EventPayload::CommentCreated { .. } => "comment:created",
            EventPayload::NotificationNew { .. } => "notification:new",
            EventPayload::PresenceUsers { .. } => "presence:users",
            EventPayload::PresenceUserJoined { .. } => "presence:user_joined",
            EventPayload::PresenceUserLeft { .. } => "presence:user_left",
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Versioned envelope delivered to every connection joined to `room`.
#[derive(Debug, Clone, Serialize)]
pub struct RoomEvent {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Colon-namespaced event type (e.g., `"bug:updated"`).
    pub event_type: &'static str,
    /// Room this event was addressed to.
    pub room: Room,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Subject that caused this event. None for system-originated events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Uuid>,
    /// Payload schema version (for forward/backward compatibility).
    pub payload_version: u32,
    /// Domain-specific event data.
    pub payload: EventPayload,
}

impl RoomEvent {
    /// Wrap a payload for delivery to `room`, minting a fresh UUIDv7 id.
    pub fn new(room: Room, actor: Option<Uuid>, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: payload.event_type(),
            room,
            occurred_at: Utc::now(),
            actor,
            payload_version: 1,
            payload,
        }
    }

    /// Re-address an already-built event to another room, keeping the
    /// originating event id so downstream dedup keys stay stable.
    pub fn readdressed(&self, room: Room) -> Self {
        let mut clone = self.clone();
        clone.room = room;
        clone
    }
}
