//! Shared state table behind every in-memory repository handle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use bugline_core::{ActivityLogEntry, Bug, Comment, Notification, ProjectMembership, Subject, Watcher};

/// All tables of the in-memory store.
///
/// One `RwLock` guards the whole state: the multi-write units the pipeline
/// relies on (bug + implicit watchers, sequence allocation) take a single
/// write guard, so they are atomic with respect to every other operation.
#[derive(Default)]
pub(crate) struct StoreState {
    pub subjects: HashMap<Uuid, Subject>,
    /// Keyed by (subject_id, project_id).
    pub memberships: HashMap<(Uuid, Uuid), ProjectMembership>,
    pub bugs: HashMap<Uuid, Bug>,
    pub comments: HashMap<Uuid, Comment>,
    /// Keyed by (bug_id, subject_id) — enforces pair uniqueness.
    pub watchers: HashMap<(Uuid, Uuid), Watcher>,
    /// Append-only, keyed by bug; entries stay in insertion order and
    /// survive bug deletion.
    pub activity: HashMap<Uuid, Vec<ActivityLogEntry>>,
    pub notifications: Vec<Notification>,
    /// Highest sequence handed out per project.
    pub sequence_counters: HashMap<Uuid, i64>,
}

pub(crate) type Shared = Arc<RwLock<StoreState>>;
