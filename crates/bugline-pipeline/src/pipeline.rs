//! The permission-scoped mutation pipeline.
//!
//! Every state-changing operation runs the same sequence: load current
//! state, authorize against membership and role, validate the command,
//! persist atomically, record activity, then hand the outcome to the
//! notification fan-out and the room broadcaster. The first five steps are
//! all-or-nothing — a NotFound/Forbidden/Conflict/InvalidAssignee/
//! ValidationFailed is terminal with no partial writes. The fan-out and
//! broadcast phase is best-effort: failures there are logged and swallowed,
//! never failing the committed mutation and never retried.
//!
//! Concurrency: mutations from one caller on one bug apply in submission
//! order; concurrent writers to the same bug race last-writer-wins, with
//! every writer's activity entry preserved in the append-only log.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use bugline_core::defaults::SEQUENCE_ALLOC_MAX_ATTEMPTS;
use bugline_core::{
    activity, authorize, extract_mentions, Action, ActivityLogEntry, AddCommentRequest,
    AuthzContext, Bug, BugStatus, Clock, Comment, CreateBugRequest, Error, EventPayload,
    Notification, NotificationKind, Repository, Result, Room, RoomEvent, Subject, Target,
    UpdateBugRequest, Watcher, WatcherSource,
};
use bugline_realtime::RealtimeBroadcaster;

use crate::fanout::{FanoutEvent, NotificationFanout};

/// What a successful mutation produced.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// Originating event id shared by the activity entry's fan-out and the
    /// room events.
    pub event_id: Uuid,
    /// Post-mutation bug snapshot (last snapshot, for deletes).
    pub bug: Bug,
    /// Activity entry appended for this mutation, when one was.
    pub activity: Option<ActivityLogEntry>,
    /// The comment, for `add_comment`.
    pub comment: Option<Comment>,
    /// Notifications the fan-out persisted (empty when fan-out failed —
    /// best-effort).
    pub notifications: Vec<Notification>,
}

/// Orchestrates create/update/delete of bugs, comments, and watchers.
pub struct MutationPipeline {
    repo: Repository,
    clock: Arc<dyn Clock>,
    fanout: NotificationFanout,
    broadcaster: RealtimeBroadcaster,
}

impl MutationPipeline {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>, broadcaster: RealtimeBroadcaster) -> Self {
        let fanout = NotificationFanout::new(repo.clone(), clock.clone());
        Self {
            repo,
            clock,
            fanout,
            broadcaster,
        }
    }

    // =========================================================================
    // BUG OPERATIONS
    // =========================================================================

    /// File a new bug: allocate the project-scoped sequence, set the caller
    /// as reporter, make reporter and assignee implicit watchers.
    pub async fn create_bug(
        &self,
        subject: &Subject,
        req: CreateBugRequest,
    ) -> Result<MutationOutcome> {
        let membership = self.repo.memberships.get(subject.id, req.project_id).await?;
        let assignee_is_member = match req.assignee_id {
            Some(assignee) => self
                .repo
                .memberships
                .get(assignee, req.project_id)
                .await?
                .is_some(),
            None => false,
        };
        authorize(
            &AuthzContext {
                subject,
                membership: membership.as_ref(),
                assignee_is_member,
            },
            Action::CreateBug,
            &Target {
                project_id: req.project_id,
                reporter_id: None,
                assignee_id: req.assignee_id,
            },
        )
        .permit()?;

        if req.title.trim().is_empty() {
            return Err(Error::ValidationFailed("title must not be empty".into()));
        }

        let now = self.clock.now();
        let bug = self.insert_with_sequence_retry(subject, &req, now).await?;

        let entry = activity::created(subject, &bug, now);
        self.repo.activity.append(entry.clone()).await?;

        info!(
            subsystem = "pipeline",
            op = "create_bug",
            bug_id = %bug.id,
            project_id = %bug.project_id,
            sequence = bug.sequence,
            subject_id = %subject.id,
            "bug created"
        );

        let mention_ids = self.resolve_mentions(bug.id, &req.description).await;
        let rooms = [Room::project(bug.project_id), Room::global()];
        let outcome = self
            .finish(
                subject,
                bug.clone(),
                Some(entry.clone()),
                None,
                NotificationKind::BugCreated,
                mention_ids,
                req.assignee_id,
                EventPayload::BugCreated { bug, activity: entry },
                &rooms,
            )
            .await;
        Ok(outcome)
    }

    /// Apply a partial update to a bug. Status transitions into the
    /// resolved class stamp `resolved_at`; transitions out clear it.
    /// A no-op update persists nothing and emits nothing.
    pub async fn update_bug(
        &self,
        subject: &Subject,
        bug_id: Uuid,
        req: UpdateBugRequest,
    ) -> Result<MutationOutcome> {
        let before = self.repo.bugs.fetch(bug_id).await?;
        let membership = self
            .repo
            .memberships
            .get(subject.id, before.project_id)
            .await?;
        authorize(
            &AuthzContext {
                subject,
                membership: membership.as_ref(),
                assignee_is_member: false,
            },
            Action::UpdateBug,
            &Target {
                project_id: before.project_id,
                reporter_id: Some(before.reporter_id),
                assignee_id: req.assignee_id.flatten(),
            },
        )
        .permit()?;

        // Command validation: a newly named assignee must be a member.
        if let Some(Some(assignee)) = req.assignee_id {
            let is_member = self
                .repo
                .memberships
                .get(assignee, before.project_id)
                .await?
                .is_some();
            if !is_member {
                return Err(Error::InvalidAssignee(assignee));
            }
        }

        let now = self.clock.now();
        let after = merge_update(&before, &req, now);

        let Some(entry) = activity::diff(subject, &before, &after, now) else {
            // No net change: nothing persisted, nothing broadcast.
            return Ok(MutationOutcome {
                event_id: Uuid::now_v7(),
                bug: before,
                activity: None,
                comment: None,
                notifications: Vec::new(),
            });
        };

        // Newly assigned subjects become implicit watchers in the same
        // write unit.
        let mut implicit = Vec::new();
        let assignee_changed = after.assignee_id != before.assignee_id;
        if assignee_changed {
            if let Some(assignee) = after.assignee_id {
                implicit.push(Watcher {
                    bug_id,
                    subject_id: assignee,
                    source: WatcherSource::Assignee,
                    created_at: now,
                });
            }
        }
        self.repo
            .bugs
            .update_with_watchers(after.clone(), &implicit)
            .await?;
        self.repo.activity.append(entry.clone()).await?;

        info!(
            subsystem = "pipeline",
            op = "update_bug",
            bug_id = %bug_id,
            subject_id = %subject.id,
            "bug updated"
        );

        // Mentions count only for newly added content.
        let mention_ids = match &req.description {
            Some(description) if *description != before.description => {
                self.resolve_mentions(bug_id, description).await
            }
            _ => Vec::new(),
        };
        let assignee_changed_to = if assignee_changed { after.assignee_id } else { None };
        let rooms = [Room::bug(bug_id), Room::project(after.project_id)];
        let outcome = self
            .finish(
                subject,
                after.clone(),
                Some(entry.clone()),
                None,
                NotificationKind::BugUpdated,
                mention_ids,
                assignee_changed_to,
                EventPayload::BugUpdated {
                    bug: after,
                    activity: entry,
                },
                &rooms,
            )
            .await;
        Ok(outcome)
    }

    /// Delete a bug. Only its reporter or a PROJECT_MANAGER/ADMIN may.
    /// Comments and watchers go with it; the activity log survives.
    pub async fn delete_bug(&self, subject: &Subject, bug_id: Uuid) -> Result<MutationOutcome> {
        let bug = self.repo.bugs.fetch(bug_id).await?;
        let membership = self
            .repo
            .memberships
            .get(subject.id, bug.project_id)
            .await?;
        authorize(
            &AuthzContext {
                subject,
                membership: membership.as_ref(),
                assignee_is_member: false,
            },
            Action::DeleteBug,
            &Target {
                project_id: bug.project_id,
                reporter_id: Some(bug.reporter_id),
                assignee_id: None,
            },
        )
        .permit()?;

        // Snapshot watchers before the delete tears them down.
        let watcher_ids: Vec<Uuid> = self
            .repo
            .watchers
            .list_for_bug(bug_id)
            .await?
            .into_iter()
            .map(|w| w.subject_id)
            .collect();

        self.repo.bugs.delete(bug_id).await?;
        let now = self.clock.now();
        let entry = activity::deleted(subject, &bug, now);
        self.repo.activity.append(entry.clone()).await?;

        info!(
            subsystem = "pipeline",
            op = "delete_bug",
            bug_id = %bug_id,
            subject_id = %subject.id,
            "bug deleted"
        );

        let rooms = [Room::bug(bug_id), Room::project(bug.project_id)];
        let outcome = self
            .finish_with_watchers(
                subject,
                bug.clone(),
                Some(entry.clone()),
                None,
                NotificationKind::BugDeleted,
                Vec::new(),
                None,
                watcher_ids,
                EventPayload::BugDeleted { bug, activity: entry },
                &rooms,
            )
            .await;
        Ok(outcome)
    }

    // =========================================================================
    // COMMENT OPERATIONS
    // =========================================================================

    /// Add a (possibly threaded) comment to a bug.
    pub async fn add_comment(
        &self,
        subject: &Subject,
        req: AddCommentRequest,
    ) -> Result<MutationOutcome> {
        let bug = self.repo.bugs.fetch(req.bug_id).await?;
        let membership = self
            .repo
            .memberships
            .get(subject.id, bug.project_id)
            .await?;
        authorize(
            &AuthzContext {
                subject,
                membership: membership.as_ref(),
                assignee_is_member: false,
            },
            Action::Comment,
            &Target {
                project_id: bug.project_id,
                reporter_id: Some(bug.reporter_id),
                assignee_id: None,
            },
        )
        .permit()?;

        if req.body.trim().is_empty() {
            return Err(Error::ValidationFailed("comment body must not be empty".into()));
        }
        if let Some(parent_id) = req.parent_id {
            match self.repo.comments.get(parent_id).await? {
                Some(parent) if parent.bug_id == req.bug_id => {}
                Some(_) => {
                    return Err(Error::ValidationFailed(
                        "parent comment belongs to a different bug".into(),
                    ))
                }
                None => {
                    return Err(Error::ValidationFailed(format!(
                        "parent comment {parent_id} not found"
                    )))
                }
            }
        }

        let now = self.clock.now();
        let comment = Comment {
            id: Uuid::new_v4(),
            bug_id: req.bug_id,
            author_id: subject.id,
            parent_id: req.parent_id,
            body: req.body,
            created_at: now,
        };
        self.repo.comments.insert(comment.clone()).await?;

        info!(
            subsystem = "pipeline",
            op = "add_comment",
            bug_id = %req.bug_id,
            subject_id = %subject.id,
            "comment added"
        );

        let mention_ids = self.resolve_mentions(bug.id, &comment.body).await;
        let rooms = [Room::bug(bug.id), Room::project(bug.project_id)];
        let outcome = self
            .finish(
                subject,
                bug.clone(),
                None,
                Some(comment.clone()),
                NotificationKind::CommentAdded,
                mention_ids,
                None,
                EventPayload::CommentCreated {
                    comment,
                    bug_id: bug.id,
                },
                &rooms,
            )
            .await;
        Ok(outcome)
    }

    // =========================================================================
    // WATCHER OPERATIONS
    // =========================================================================

    /// Explicitly subscribe `subject` to a bug. Conflict if already
    /// watching.
    pub async fn add_watcher(&self, subject: &Subject, bug_id: Uuid) -> Result<Watcher> {
        let bug = self.repo.bugs.fetch(bug_id).await?;
        self.authorize_watch(subject, &bug).await?;

        let watcher = Watcher {
            bug_id,
            subject_id: subject.id,
            source: WatcherSource::Explicit,
            created_at: self.clock.now(),
        };
        self.repo.watchers.add(watcher.clone()).await?;
        info!(
            subsystem = "pipeline",
            op = "add_watcher",
            bug_id = %bug_id,
            subject_id = %subject.id,
            "watcher added"
        );
        Ok(watcher)
    }

    /// Remove `subject`'s watcher row. NotFound if not watching.
    pub async fn remove_watcher(&self, subject: &Subject, bug_id: Uuid) -> Result<()> {
        let bug = self.repo.bugs.fetch(bug_id).await?;
        self.authorize_watch(subject, &bug).await?;
        self.repo.watchers.remove(bug_id, subject.id).await?;
        info!(
            subsystem = "pipeline",
            op = "remove_watcher",
            bug_id = %bug_id,
            subject_id = %subject.id,
            "watcher removed"
        );
        Ok(())
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn authorize_watch(&self, subject: &Subject, bug: &Bug) -> Result<()> {
        let membership = self
            .repo
            .memberships
            .get(subject.id, bug.project_id)
            .await?;
        authorize(
            &AuthzContext {
                subject,
                membership: membership.as_ref(),
                assignee_is_member: false,
            },
            Action::Watch,
            &Target {
                project_id: bug.project_id,
                reporter_id: Some(bug.reporter_id),
                assignee_id: None,
            },
        )
        .permit()
    }

    /// Allocate a sequence and insert, retrying a bounded number of times
    /// when a concurrent creator claimed the same number first.
    async fn insert_with_sequence_retry(
        &self,
        subject: &Subject,
        req: &CreateBugRequest,
        now: DateTime<Utc>,
    ) -> Result<Bug> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let sequence = self.repo.sequences.next_sequence(req.project_id).await?;
            let bug = Bug {
                id: Uuid::new_v4(),
                project_id: req.project_id,
                sequence,
                title: req.title.clone(),
                description: req.description.clone(),
                status: BugStatus::New,
                priority: req.priority,
                severity: req.severity,
                reporter_id: subject.id,
                assignee_id: req.assignee_id,
                resolved_at: None,
                custom_fields: BTreeMap::new(),
                created_at: now,
                updated_at: now,
            };

            let mut watchers = vec![Watcher {
                bug_id: bug.id,
                subject_id: subject.id,
                source: WatcherSource::Reporter,
                created_at: now,
            }];
            if let Some(assignee) = req.assignee_id {
                if assignee != subject.id {
                    watchers.push(Watcher {
                        bug_id: bug.id,
                        subject_id: assignee,
                        source: WatcherSource::Assignee,
                        created_at: now,
                    });
                }
            }

            match self.repo.bugs.insert_with_watchers(bug.clone(), &watchers).await {
                Ok(()) => return Ok(bug),
                Err(Error::Conflict(msg)) if attempt < SEQUENCE_ALLOC_MAX_ATTEMPTS => {
                    warn!(
                        subsystem = "pipeline",
                        op = "create_bug",
                        project_id = %req.project_id,
                        sequence,
                        attempt,
                        error = %msg,
                        "sequence race, retrying allocation"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolve @mentions to subject ids. Runs after the mutation of record
    /// has committed, so a failed lookup is logged and the fan-out proceeds
    /// without mentions rather than failing the persisted mutation.
    async fn resolve_mentions(&self, bug_id: Uuid, text: &str) -> Vec<Uuid> {
        let names = extract_mentions(text);
        if names.is_empty() {
            return Vec::new();
        }
        match self.repo.subjects.resolve_usernames(&names).await {
            Ok(subjects) => subjects.into_iter().map(|s| s.id).collect(),
            Err(err) => {
                warn!(
                    subsystem = "fanout",
                    bug_id = %bug_id,
                    error = %err,
                    "mention resolution failed, fanning out without mentions"
                );
                Vec::new()
            }
        }
    }

    /// Fan-out and broadcast phase, reading the current watcher list.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        subject: &Subject,
        bug: Bug,
        entry: Option<ActivityLogEntry>,
        comment: Option<Comment>,
        kind: NotificationKind,
        mention_ids: Vec<Uuid>,
        assignee_changed_to: Option<Uuid>,
        payload: EventPayload,
        rooms: &[Room],
    ) -> MutationOutcome {
        let watcher_ids = match self.repo.watchers.list_for_bug(bug.id).await {
            Ok(watchers) => watchers.into_iter().map(|w| w.subject_id).collect(),
            Err(err) => {
                warn!(
                    subsystem = "fanout",
                    bug_id = %bug.id,
                    error = %err,
                    "failed to load watchers, fanning out without them"
                );
                Vec::new()
            }
        };
        self.finish_with_watchers(
            subject,
            bug,
            entry,
            comment,
            kind,
            mention_ids,
            assignee_changed_to,
            watcher_ids,
            payload,
            rooms,
        )
        .await
    }

    /// Best-effort tail of every mutation: persist the notification batch,
    /// then emit the room events in submission order. Nothing here can fail
    /// the already-committed mutation.
    #[allow(clippy::too_many_arguments)]
    async fn finish_with_watchers(
        &self,
        subject: &Subject,
        bug: Bug,
        entry: Option<ActivityLogEntry>,
        comment: Option<Comment>,
        kind: NotificationKind,
        mention_ids: Vec<Uuid>,
        assignee_changed_to: Option<Uuid>,
        watcher_ids: Vec<Uuid>,
        payload: EventPayload,
        rooms: &[Room],
    ) -> MutationOutcome {
        let event_id = Uuid::now_v7();
        let fanout_event = FanoutEvent {
            event_id,
            kind,
            actor_id: subject.id,
            bug: bug.clone(),
            watcher_ids,
            mention_ids,
            assignee_changed_to,
        };
        let notifications = match self.fanout.fanout(&fanout_event).await {
            Ok(notifications) => notifications,
            Err(err) => {
                warn!(
                    subsystem = "fanout",
                    event_id = %event_id,
                    bug_id = %bug.id,
                    error = %err,
                    "notification fan-out failed, mutation stands"
                );
                Vec::new()
            }
        };

        // One envelope per mutation: sibling rooms see the same event id,
        // and it is the id the notification fan-out deduped on.
        if let Some((first, rest)) = rooms.split_first() {
            let mut event = RoomEvent::new(*first, Some(subject.id), payload);
            event.event_id = event_id;
            self.broadcaster.deliver(&event);
            for room in rest {
                self.broadcaster.deliver(&event.readdressed(*room));
            }
        }
        for notification in &notifications {
            let room = Room::subject(notification.recipient_id);
            let event = RoomEvent::new(
                room,
                Some(subject.id),
                EventPayload::NotificationNew {
                    notification: notification.clone(),
                },
            );
            self.broadcaster.deliver(&event);
        }

        MutationOutcome {
            event_id,
            bug,
            activity: entry,
            comment,
            notifications,
        }
    }
}

/// Merge a partial update onto `before`, handling the resolution
/// timestamp: stamped on entering the resolved class, cleared on leaving,
/// preserved while moving within it.
fn merge_update(before: &Bug, req: &UpdateBugRequest, now: DateTime<Utc>) -> Bug {
    let mut after = before.clone();
    if let Some(title) = &req.title {
        after.title = title.clone();
    }
    if let Some(description) = &req.description {
        after.description = description.clone();
    }
    if let Some(status) = req.status {
        after.status = status;
    }
    if let Some(priority) = req.priority {
        after.priority = priority;
    }
    if let Some(severity) = req.severity {
        after.severity = severity;
    }
    if let Some(assignee) = req.assignee_id {
        after.assignee_id = assignee;
    }

    let was_resolved = before.status.is_resolved_class();
    let is_resolved = after.status.is_resolved_class();
    after.resolved_at = match (was_resolved, is_resolved) {
        (false, true) => Some(now),
        (_, false) => None,
        (true, true) => before.resolved_at,
    };

    // Only bump updated_at for an actual change.
    if after.title != before.title
        || after.description != before.description
        || after.status != before.status
        || after.priority != before.priority
        || after.severity != before.severity
        || after.assignee_id != before.assignee_id
    {
        after.updated_at = now;
    }
    after
}
