//! Activity log derivation.
//!
//! Turns a before/after pair of bug snapshots into one append-only
//! [`ActivityLogEntry`]: a human-readable sentence per changed tracked
//! field plus a structured field → {old, new} map. Pure and synchronous;
//! persisting the entry is the repository's job.
//!
//! Tracked fields: status, priority, severity, assignee, title. A mutation
//! touching only non-tracked fields (description, custom fields) still gets
//! a generic "updated" entry; a mutation with no net change gets none.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ActivityKind, ActivityLogEntry, Bug, FieldChange, Subject};

fn assignee_label(assignee: Option<Uuid>) -> String {
    match assignee {
        Some(id) => id.to_string(),
        None => "unassigned".to_string(),
    }
}

fn push_change(
    changes: &mut BTreeMap<String, FieldChange>,
    sentences: &mut Vec<String>,
    actor: &Subject,
    field: &str,
    old: String,
    new: String,
) {
    sentences.push(format!(
        "{} changed {} from {} to {}.",
        actor.display_name, field, old, new
    ));
    changes.insert(
        field.to_string(),
        FieldChange {
            old: Some(old),
            new: Some(new),
        },
    );
}

/// Derive the activity entry for an update, if the update changed anything.
///
/// Returns `None` when `before` and `after` are identical in every field
/// the command could have touched — a no-op update appends nothing.
pub fn diff(
    actor: &Subject,
    before: &Bug,
    after: &Bug,
    now: DateTime<Utc>,
) -> Option<ActivityLogEntry> {
    let mut changes = BTreeMap::new();
    let mut sentences = Vec::new();

    if before.status != after.status {
        push_change(
            &mut changes,
            &mut sentences,
            actor,
            "status",
            before.status.to_string(),
            after.status.to_string(),
        );
    }
    if before.priority != after.priority {
        push_change(
            &mut changes,
            &mut sentences,
            actor,
            "priority",
            before.priority.to_string(),
            after.priority.to_string(),
        );
    }
    if before.severity != after.severity {
        push_change(
            &mut changes,
            &mut sentences,
            actor,
            "severity",
            before.severity.to_string(),
            after.severity.to_string(),
        );
    }
    if before.assignee_id != after.assignee_id {
        push_change(
            &mut changes,
            &mut sentences,
            actor,
            "assignee",
            assignee_label(before.assignee_id),
            assignee_label(after.assignee_id),
        );
    }
    if before.title != after.title {
        push_change(
            &mut changes,
            &mut sentences,
            actor,
            "title",
            before.title.clone(),
            after.title.clone(),
        );
    }

    if changes.is_empty() {
        let untracked_changed = before.description != after.description
            || before.custom_fields != after.custom_fields;
        if !untracked_changed {
            return None;
        }
        sentences.push(format!("{} updated the bug.", actor.display_name));
    }

    Some(ActivityLogEntry {
        id: Uuid::now_v7(),
        bug_id: after.id,
        actor_id: actor.id,
        action: ActivityKind::Updated,
        summary: sentences.join(" "),
        changes,
        created_at: now,
    })
}

/// Synthesize the entry recorded alongside a freshly created bug.
pub fn created(actor: &Subject, bug: &Bug, now: DateTime<Utc>) -> ActivityLogEntry {
    ActivityLogEntry {
        id: Uuid::now_v7(),
        bug_id: bug.id,
        actor_id: actor.id,
        action: ActivityKind::Created,
        summary: format!(
            "{} filed bug #{}: {}.",
            actor.display_name, bug.sequence, bug.title
        ),
        changes: BTreeMap::new(),
        created_at: now,
    }
}

/// Synthesize the entry recorded when a bug is deleted.
pub fn deleted(actor: &Subject, bug: &Bug, now: DateTime<Utc>) -> ActivityLogEntry {
    ActivityLogEntry {
        id: Uuid::now_v7(),
        bug_id: bug.id,
        actor_id: actor.id,
        action: ActivityKind::Deleted,
        summary: format!(
            "{} deleted bug #{}: {}.",
            actor.display_name, bug.sequence, bug.title
        ),
        changes: BTreeMap::new(),
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BugStatus, Priority, Role, Severity};

    fn actor() -> Subject {
        Subject {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            role: Role::Developer,
        }
    }

    fn bug() -> Bug {
        Bug {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            sequence: 7,
            title: "Crash on save".to_string(),
            description: "Saving a draft crashes".to_string(),
            status: BugStatus::New,
            priority: Priority::Medium,
            severity: Severity::Major,
            reporter_id: Uuid::new_v4(),
            assignee_id: None,
            resolved_at: None,
            custom_fields: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_noop_update_records_nothing() {
        let before = bug();
        let after = before.clone();
        assert!(diff(&actor(), &before, &after, Utc::now()).is_none());
    }

    #[test]
    fn test_status_change_recorded() {
        let before = bug();
        let mut after = before.clone();
        after.status = BugStatus::InProgress;

        let entry = diff(&actor(), &before, &after, Utc::now()).unwrap();
        assert_eq!(entry.action, ActivityKind::Updated);
        assert_eq!(entry.bug_id, after.id);
        assert_eq!(entry.changes.len(), 1);
        let change = &entry.changes["status"];
        assert_eq!(change.old.as_deref(), Some("NEW"));
        assert_eq!(change.new.as_deref(), Some("IN_PROGRESS"));
        assert_eq!(
            entry.summary,
            "Alice changed status from NEW to IN_PROGRESS."
        );
    }

    #[test]
    fn test_multiple_tracked_changes_one_entry() {
        let before = bug();
        let mut after = before.clone();
        after.priority = Priority::Urgent;
        after.title = "Crash on save (Windows)".to_string();
        after.assignee_id = Some(Uuid::nil());

        let entry = diff(&actor(), &before, &after, Utc::now()).unwrap();
        assert_eq!(entry.changes.len(), 3);
        assert!(entry.changes.contains_key("priority"));
        assert!(entry.changes.contains_key("title"));
        assert_eq!(
            entry.changes["assignee"].old.as_deref(),
            Some("unassigned")
        );
        // One sentence per changed field.
        assert_eq!(entry.summary.matches('.').count(), 3);
    }

    #[test]
    fn test_untracked_change_gets_generic_entry() {
        let before = bug();
        let mut after = before.clone();
        after.description = "Saving any document crashes".to_string();

        let entry = diff(&actor(), &before, &after, Utc::now()).unwrap();
        assert_eq!(entry.action, ActivityKind::Updated);
        assert!(entry.changes.is_empty());
        assert_eq!(entry.summary, "Alice updated the bug.");
    }

    #[test]
    fn test_created_entry_shape() {
        let b = bug();
        let entry = created(&actor(), &b, Utc::now());
        assert_eq!(entry.action, ActivityKind::Created);
        assert_eq!(entry.summary, "Alice filed bug #7: Crash on save.");
        assert!(entry.changes.is_empty());
    }

    #[test]
    fn test_deleted_entry_shape() {
        let b = bug();
        let entry = deleted(&actor(), &b, Utc::now());
        assert_eq!(entry.action, ActivityKind::Deleted);
        assert!(entry.summary.contains("deleted bug #7"));
    }
}
