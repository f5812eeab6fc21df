//! Capability traits consumed by the mutation pipeline.
//!
//! These traits define the interfaces that concrete storage backends must
//! satisfy. The pipeline never touches a store directly — it receives a
//! [`Repository`] bundle of trait objects, constructed at process start and
//! passed down explicitly. No ambient globals.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Command for filing a new bug.
#[derive(Debug, Clone)]
pub struct CreateBugRequest {
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub severity: Severity,
    /// Optional initial assignee; must hold membership on `project_id`.
    pub assignee_id: Option<Uuid>,
}

/// Command for updating a bug. `None` fields are left untouched;
/// `assignee_id` uses a double Option to distinguish "leave alone"
/// from "unassign".
#[derive(Debug, Clone, Default)]
pub struct UpdateBugRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<BugStatus>,
    pub priority: Option<Priority>,
    pub severity: Option<Severity>,
    pub assignee_id: Option<Option<Uuid>>,
}

/// Command for adding a comment to a bug.
#[derive(Debug, Clone)]
pub struct AddCommentRequest {
    pub bug_id: Uuid,
    /// Parent comment for threading; must belong to the same bug.
    pub parent_id: Option<Uuid>,
    pub body: String,
}

// =============================================================================
// CLOCK
// =============================================================================

/// Supplies current time for resolution timestamps and record metadata.
/// Injectable so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// SUBJECT & MEMBERSHIP REPOSITORIES
// =============================================================================

/// Repository for subject lookups.
#[async_trait]
pub trait SubjectRepository: Send + Sync {
    /// Insert a subject (seeding / account provisioning).
    async fn insert(&self, subject: Subject) -> Result<()>;

    /// Fetch a subject by id.
    async fn get(&self, id: Uuid) -> Result<Option<Subject>>;

    /// Resolve usernames (lowercase) to subjects. Unknown names are
    /// silently dropped, not an error.
    async fn resolve_usernames(&self, usernames: &[String]) -> Result<Vec<Subject>>;
}

/// Repository for project membership records.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Add a subject to a project with the given capabilities.
    async fn add(&self, membership: ProjectMembership) -> Result<()>;

    /// Remove a subject from a project.
    async fn remove(&self, subject_id: Uuid, project_id: Uuid) -> Result<()>;

    /// Fetch the membership of a subject on a project, if any.
    async fn get(&self, subject_id: Uuid, project_id: Uuid) -> Result<Option<ProjectMembership>>;

    /// All memberships of a project.
    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<ProjectMembership>>;
}

// =============================================================================
// BUG REPOSITORY
// =============================================================================

/// Repository for bug CRUD.
///
/// The `*_with_watchers` methods are the atomic multi-write units the
/// pipeline relies on: the bug write and the implicit watcher insertions
/// either all land or none do.
#[async_trait]
pub trait BugRepository: Send + Sync {
    /// Insert a new bug together with its implicit watchers
    /// (reporter, assignee). Fails Conflict if the bug's (project,
    /// sequence) pair is already taken.
    async fn insert_with_watchers(&self, bug: Bug, watchers: &[Watcher]) -> Result<()>;

    /// Persist an updated snapshot together with any implicit watcher
    /// additions (newly assigned subject). Watcher rows that already exist
    /// are left untouched.
    async fn update_with_watchers(&self, bug: Bug, watchers: &[Watcher]) -> Result<()>;

    /// Fetch a bug by id, failing NotFound when absent.
    async fn fetch(&self, id: Uuid) -> Result<Bug>;

    /// Delete a bug and its dependent rows (comments, watchers).
    /// Activity entries survive — the log is append-only.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// List bugs of a project ordered by sequence.
    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Bug>>;
}

// =============================================================================
// COMMENT REPOSITORY
// =============================================================================

/// Repository for comments.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Insert a comment.
    async fn insert(&self, comment: Comment) -> Result<()>;

    /// Fetch a comment by id.
    async fn get(&self, id: Uuid) -> Result<Option<Comment>>;

    /// All comments of a bug ordered by creation time.
    async fn list_for_bug(&self, bug_id: Uuid) -> Result<Vec<Comment>>;
}

// =============================================================================
// WATCHER REPOSITORY
// =============================================================================

/// Repository for watcher records.
#[async_trait]
pub trait WatcherRepository: Send + Sync {
    /// Add a watcher. Fails Conflict when the (bug, subject) pair
    /// already exists.
    async fn add(&self, watcher: Watcher) -> Result<()>;

    /// Remove a watcher. Fails NotFound when the pair does not exist.
    async fn remove(&self, bug_id: Uuid, subject_id: Uuid) -> Result<()>;

    /// All watchers of a bug.
    async fn list_for_bug(&self, bug_id: Uuid) -> Result<Vec<Watcher>>;
}

// =============================================================================
// ACTIVITY & NOTIFICATION REPOSITORIES
// =============================================================================

/// Append-only repository for activity entries.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Append an entry. Entries are never updated or deleted.
    async fn append(&self, entry: ActivityLogEntry) -> Result<()>;

    /// All entries of a bug in creation order.
    async fn list_for_bug(&self, bug_id: Uuid) -> Result<Vec<ActivityLogEntry>>;
}

/// Repository for notification records.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Persist a fan-out batch. All-or-nothing; the caller treats failure
    /// as best-effort relative to the mutation of record.
    async fn insert_batch(&self, notifications: &[Notification]) -> Result<()>;

    /// Notifications addressed to a recipient, newest first.
    async fn list_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<Notification>>;

    /// Mark one notification read.
    async fn mark_read(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// SEQUENCE ALLOCATOR
// =============================================================================

/// Produces gap-free, per-project monotonic bug sequence numbers.
///
/// Two concurrent calls for the same project never return the same value;
/// allocations for different projects proceed independently.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Next sequence for `project_id`: one greater than the highest
    /// previously allocated, starting at 1.
    async fn next_sequence(&self, project_id: Uuid) -> Result<i64>;
}

// =============================================================================
// REPOSITORY BUNDLE
// =============================================================================

/// Explicitly constructed bundle of storage capabilities, passed down from
/// process start. Cloning is cheap (Arc per field).
#[derive(Clone)]
pub struct Repository {
    pub subjects: Arc<dyn SubjectRepository>,
    pub memberships: Arc<dyn MembershipRepository>,
    pub bugs: Arc<dyn BugRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub watchers: Arc<dyn WatcherRepository>,
    pub activity: Arc<dyn ActivityRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub sequences: Arc<dyn SequenceAllocator>,
}
