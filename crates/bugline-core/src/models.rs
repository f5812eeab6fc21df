//! Core data models for bugline.
//!
//! These types are shared across all bugline crates and represent
//! the core domain entities.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// SUBJECT TYPES
// =============================================================================

/// Coarse application-wide role of a subject.
///
/// Roles gate a small number of global decisions (delete, admin override);
/// everything project-scoped goes through [`CapabilitySet`] on the
/// subject's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Reporter,
    Developer,
    Qa,
    ProjectManager,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Reporter => "REPORTER",
            Role::Developer => "DEVELOPER",
            Role::Qa => "QA",
            Role::ProjectManager => "PROJECT_MANAGER",
            Role::Admin => "ADMIN",
        };
        f.write_str(s)
    }
}

/// An authenticated actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    /// Unique login name; mention resolution matches against the
    /// lowercased form.
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

// =============================================================================
// MEMBERSHIP & CAPABILITIES
// =============================================================================

/// A named project-scoped permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Manage project settings and membership.
    ManageProject,
    /// Create, edit, and triage bugs.
    ManageBugs,
    /// Comment on bugs.
    Comment,
    /// Run test/QA workflows (verify fixes, reopen).
    Test,
}

impl Capability {
    const ALL: [Capability; 4] = [
        Capability::ManageProject,
        Capability::ManageBugs,
        Capability::Comment,
        Capability::Test,
    ];

    fn bit(self) -> u8 {
        match self {
            Capability::ManageProject => 1 << 0,
            Capability::ManageBugs => 1 << 1,
            Capability::Comment => 1 << 2,
            Capability::Test => 1 << 3,
        }
    }
}

/// Fixed-shape capability bitset held by a project membership.
///
/// Serialized as a list of capability names rather than the raw bits, so
/// stored memberships stay readable and unknown bits can never round-trip
/// in. Validated at write time: only the four known capabilities exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// Empty set — a member with no project rights.
    pub fn empty() -> Self {
        Self(0)
    }

    /// All capabilities. Typical for project leads.
    pub fn all() -> Self {
        Capability::ALL.iter().copied().collect()
    }

    pub fn with(mut self, cap: Capability) -> Self {
        self.0 |= cap.bit();
        self
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn contains_any(&self, caps: &[Capability]) -> bool {
        caps.iter().any(|c| self.contains(*c))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn to_vec(self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|c| self.contains(*c))
            .collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::empty(), |set, cap| set.with(cap))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let caps = Vec::<Capability>::deserialize(deserializer)?;
        Ok(caps.into_iter().collect())
    }
}

/// The join entity granting a subject scoped rights within a project.
///
/// Created when a subject is added to a project, deleted on removal.
/// A subject's effective rights on an entity are the union of role-derived
/// rights and the capabilities held here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMembership {
    pub subject_id: Uuid,
    pub project_id: Uuid,
    pub capabilities: CapabilitySet,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// BUG TYPES
// =============================================================================

/// Lifecycle status of a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BugStatus {
    New,
    InProgress,
    InReview,
    Resolved,
    Closed,
    Reopened,
    Duplicate,
    WontFix,
    CannotReproduce,
}

impl BugStatus {
    /// Whether this status implies the bug carries a resolution timestamp.
    ///
    /// `resolved_at` is non-null iff the status is in this class.
    pub fn is_resolved_class(&self) -> bool {
        matches!(
            self,
            BugStatus::Resolved
                | BugStatus::Closed
                | BugStatus::Duplicate
                | BugStatus::WontFix
                | BugStatus::CannotReproduce
        )
    }
}

impl fmt::Display for BugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BugStatus::New => "NEW",
            BugStatus::InProgress => "IN_PROGRESS",
            BugStatus::InReview => "IN_REVIEW",
            BugStatus::Resolved => "RESOLVED",
            BugStatus::Closed => "CLOSED",
            BugStatus::Reopened => "REOPENED",
            BugStatus::Duplicate => "DUPLICATE",
            BugStatus::WontFix => "WONT_FIX",
            BugStatus::CannotReproduce => "CANNOT_REPRODUCE",
        };
        f.write_str(s)
    }
}

/// Scheduling urgency of a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        };
        f.write_str(s)
    }
}

/// Impact of a bug on the affected system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Trivial,
    Minor,
    Major,
    Critical,
    Blocker,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Trivial => "TRIVIAL",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
            Severity::Blocker => "BLOCKER",
        };
        f.write_str(s)
    }
}

/// A tracked defect. Belongs to exactly one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bug {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Project-scoped sequence number, immutable once assigned.
    /// Unique and gap-free within a project, starting at 1.
    pub sequence: i64,
    pub title: String,
    pub description: String,
    pub status: BugStatus,
    pub priority: Priority,
    pub severity: Severity,
    /// The filing subject. Immutable.
    pub reporter_id: Uuid,
    /// Current assignee; must be a member of the bug's project.
    pub assignee_id: Option<Uuid>,
    /// Set exactly when status enters the resolved class, cleared when it
    /// leaves.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Free-form per-project extension fields. Empty map on creation.
    pub custom_fields: BTreeMap<String, JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// COMMENT TYPES
// =============================================================================

/// A comment on a bug, threaded by parent reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub bug_id: Uuid,
    pub author_id: Uuid,
    /// Parent comment for threading. Must belong to the same bug.
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// WATCHER TYPES
// =============================================================================

/// How a watcher row came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherSource {
    /// Subject explicitly subscribed.
    Explicit,
    /// Implicit: subject reported the bug.
    Reporter,
    /// Implicit: subject was assigned the bug.
    Assignee,
}

/// (bug, subject) interest record. Unique per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watcher {
    pub bug_id: Uuid,
    pub subject_id: Uuid,
    pub source: WatcherSource,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ACTIVITY LOG TYPES
// =============================================================================

/// What kind of mutation an activity entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Created,
    Updated,
    Deleted,
}

/// Old/new values of one tracked field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Append-only record of one mutation, ordered by creation time per bug.
///
/// Entries are immutable: they are never updated or deleted, even when the
/// mutation they describe is later superseded by another writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub bug_id: Uuid,
    pub actor_id: Uuid,
    pub action: ActivityKind,
    /// Human-readable description, one sentence per changed field.
    pub summary: String,
    /// Structured field → {old, new} delta. Empty for generic updates
    /// touching no tracked field.
    pub changes: BTreeMap<String, FieldChange>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// NOTIFICATION TYPES
// =============================================================================

/// Why a notification was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BugCreated,
    BugUpdated,
    BugDeleted,
    CommentAdded,
}

/// One per-recipient record derived from a mutation event.
///
/// Many notifications may derive from one event, each addressed to exactly
/// one recipient; a recipient never receives two notifications for the same
/// originating event, no matter how many fan-out rules selected them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    /// Originating mutation event. Dedup key together with `recipient_id`.
    pub event_id: Uuid,
    pub kind: NotificationKind,
    pub bug_id: Uuid,
    pub actor_id: Uuid,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_set_roundtrip() {
        let set = CapabilitySet::empty()
            .with(Capability::ManageBugs)
            .with(Capability::Comment);
        assert!(set.contains(Capability::ManageBugs));
        assert!(set.contains(Capability::Comment));
        assert!(!set.contains(Capability::ManageProject));
        assert!(!set.contains(Capability::Test));

        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["manage-bugs","comment"]"#);
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_capability_set_rejects_unknown_names() {
        let err = serde_json::from_str::<CapabilitySet>(r#"["manage-bugs","sudo"]"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_capability_set_contains_any() {
        let set = CapabilitySet::empty().with(Capability::Test);
        assert!(set.contains_any(&[Capability::Comment, Capability::Test]));
        assert!(!set.contains_any(&[Capability::Comment, Capability::ManageBugs]));
    }

    #[test]
    fn test_resolved_class_membership() {
        for status in [
            BugStatus::Resolved,
            BugStatus::Closed,
            BugStatus::Duplicate,
            BugStatus::WontFix,
            BugStatus::CannotReproduce,
        ] {
            assert!(status.is_resolved_class(), "{status} should be resolved-class");
        }
        for status in [
            BugStatus::New,
            BugStatus::InProgress,
            BugStatus::InReview,
            BugStatus::Reopened,
        ] {
            assert!(!status.is_resolved_class(), "{status} should be open-class");
        }
    }

    #[test]
    fn test_status_serialized_screaming_snake() {
        let json = serde_json::to_string(&BugStatus::CannotReproduce).unwrap();
        assert_eq!(json, r#""CANNOT_REPRODUCE""#);
    }
}
