//! Bug repository implementation, including the atomic multi-write units.

use async_trait::async_trait;
use uuid::Uuid;

use bugline_core::{Bug, BugRepository, Error, Result, Watcher};

use crate::state::Shared;

/// In-memory implementation of BugRepository.
///
/// Multi-write units take one write guard over the whole state table, so
/// the bug write and its implicit watcher insertions land together or not
/// at all.
pub struct MemBugRepository {
    state: Shared,
}

impl MemBugRepository {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

#[async_trait]
impl BugRepository for MemBugRepository {
    async fn insert_with_watchers(&self, bug: Bug, watchers: &[Watcher]) -> Result<()> {
        let mut state = self.state.write().await;

        let sequence_taken = state
            .bugs
            .values()
            .any(|b| b.project_id == bug.project_id && b.sequence == bug.sequence);
        if sequence_taken {
            return Err(Error::Conflict(format!(
                "sequence {} already taken in project {}",
                bug.sequence, bug.project_id
            )));
        }
        if state.bugs.contains_key(&bug.id) {
            return Err(Error::Conflict(format!("bug {} already exists", bug.id)));
        }

        for watcher in watchers {
            state
                .watchers
                .entry((watcher.bug_id, watcher.subject_id))
                .or_insert_with(|| watcher.clone());
        }
        state.bugs.insert(bug.id, bug);
        Ok(())
    }

    async fn update_with_watchers(&self, bug: Bug, watchers: &[Watcher]) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.bugs.contains_key(&bug.id) {
            return Err(Error::BugNotFound(bug.id));
        }
        for watcher in watchers {
            state
                .watchers
                .entry((watcher.bug_id, watcher.subject_id))
                .or_insert_with(|| watcher.clone());
        }
        state.bugs.insert(bug.id, bug);
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Bug> {
        let state = self.state.read().await;
        state.bugs.get(&id).cloned().ok_or(Error::BugNotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if state.bugs.remove(&id).is_none() {
            return Err(Error::BugNotFound(id));
        }
        state.comments.retain(|_, c| c.bug_id != id);
        state.watchers.retain(|(bug_id, _), _| *bug_id != id);
        // Activity entries survive deletion — the log is append-only.
        Ok(())
    }

    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Bug>> {
        let state = self.state.read().await;
        let mut bugs: Vec<Bug> = state
            .bugs
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect();
        bugs.sort_by_key(|b| b.sequence);
        Ok(bugs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugline_core::{BugStatus, Priority, Severity, WatcherSource};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn bug(project_id: Uuid, sequence: i64) -> Bug {
        Bug {
            id: Uuid::new_v4(),
            project_id,
            sequence,
            title: format!("bug {sequence}"),
            description: String::new(),
            status: BugStatus::New,
            priority: Priority::Medium,
            severity: Severity::Minor,
            reporter_id: Uuid::new_v4(),
            assignee_id: None,
            resolved_at: None,
            custom_fields: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn watcher(bug_id: Uuid, subject_id: Uuid, source: WatcherSource) -> Watcher {
        Watcher {
            bug_id,
            subject_id,
            source,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_with_watchers_is_atomic_pair() {
        let state = Shared::default();
        let repo = MemBugRepository::new(state.clone());
        let b = bug(Uuid::new_v4(), 1);
        let bug_id = b.id;
        let reporter = b.reporter_id;

        repo.insert_with_watchers(b, &[watcher(bug_id, reporter, WatcherSource::Reporter)])
            .await
            .unwrap();

        let guard = state.read().await;
        assert!(guard.bugs.contains_key(&bug_id));
        assert!(guard.watchers.contains_key(&(bug_id, reporter)));
    }

    #[tokio::test]
    async fn test_duplicate_sequence_conflicts() {
        let repo = MemBugRepository::new(Shared::default());
        let project_id = Uuid::new_v4();
        repo.insert_with_watchers(bug(project_id, 1), &[])
            .await
            .unwrap();

        let err = repo
            .insert_with_watchers(bug(project_id, 1), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Same sequence in another project is fine.
        repo.insert_with_watchers(bug(Uuid::new_v4(), 1), &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_preserves_existing_watcher_rows() {
        let state = Shared::default();
        let repo = MemBugRepository::new(state.clone());
        let mut b = bug(Uuid::new_v4(), 1);
        let subject = Uuid::new_v4();
        repo.insert_with_watchers(
            b.clone(),
            &[watcher(b.id, subject, WatcherSource::Explicit)],
        )
        .await
        .unwrap();

        b.assignee_id = Some(subject);
        repo.update_with_watchers(
            b.clone(),
            &[watcher(b.id, subject, WatcherSource::Assignee)],
        )
        .await
        .unwrap();

        let guard = state.read().await;
        // Pre-existing explicit row was not overwritten by the implicit one.
        assert_eq!(
            guard.watchers[&(b.id, subject)].source,
            WatcherSource::Explicit
        );
    }

    #[tokio::test]
    async fn test_fetch_and_delete() {
        let repo = MemBugRepository::new(Shared::default());
        let b = bug(Uuid::new_v4(), 1);
        let id = b.id;
        repo.insert_with_watchers(b, &[]).await.unwrap();

        assert_eq!(repo.fetch(id).await.unwrap().sequence, 1);
        repo.delete(id).await.unwrap();
        assert!(matches!(
            repo.fetch(id).await.unwrap_err(),
            Error::BugNotFound(_)
        ));
        assert!(matches!(
            repo.delete(id).await.unwrap_err(),
            Error::BugNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_for_project_ordered_by_sequence() {
        let repo = MemBugRepository::new(Shared::default());
        let project_id = Uuid::new_v4();
        for seq in [3, 1, 2] {
            repo.insert_with_watchers(bug(project_id, seq), &[])
                .await
                .unwrap();
        }
        let bugs = repo.list_for_project(project_id).await.unwrap();
        let sequences: Vec<i64> = bugs.iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}
