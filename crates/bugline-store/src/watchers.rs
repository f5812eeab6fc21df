//! Watcher repository implementation.

use async_trait::async_trait;
use uuid::Uuid;

use bugline_core::{Error, Result, Watcher, WatcherRepository};

use crate::state::Shared;

/// In-memory implementation of WatcherRepository.
pub struct MemWatcherRepository {
    state: Shared,
}

impl MemWatcherRepository {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

#[async_trait]
impl WatcherRepository for MemWatcherRepository {
    async fn add(&self, watcher: Watcher) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (watcher.bug_id, watcher.subject_id);
        if state.watchers.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "subject {} already watches bug {}",
                watcher.subject_id, watcher.bug_id
            )));
        }
        state.watchers.insert(key, watcher);
        Ok(())
    }

    async fn remove(&self, bug_id: Uuid, subject_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .watchers
            .remove(&(bug_id, subject_id))
            .map(|_| ())
            .ok_or_else(|| {
                Error::NotFound(format!("watcher {subject_id} on bug {bug_id}"))
            })
    }

    async fn list_for_bug(&self, bug_id: Uuid) -> Result<Vec<Watcher>> {
        let state = self.state.read().await;
        let mut watchers: Vec<Watcher> = state
            .watchers
            .values()
            .filter(|w| w.bug_id == bug_id)
            .cloned()
            .collect();
        watchers.sort_by_key(|w| w.created_at);
        Ok(watchers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugline_core::WatcherSource;
    use chrono::Utc;

    fn watcher(bug_id: Uuid, subject_id: Uuid) -> Watcher {
        Watcher {
            bug_id,
            subject_id,
            source: WatcherSource::Explicit,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_pair_conflicts() {
        let repo = MemWatcherRepository::new(Shared::default());
        let bug_id = Uuid::new_v4();
        let subject_id = Uuid::new_v4();

        repo.add(watcher(bug_id, subject_id)).await.unwrap();
        let err = repo.add(watcher(bug_id, subject_id)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Exactly one row exists.
        assert_eq!(repo.list_for_bug(bug_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let repo = MemWatcherRepository::new(Shared::default());
        let err = repo
            .remove(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_add_remove_roundtrip() {
        let repo = MemWatcherRepository::new(Shared::default());
        let bug_id = Uuid::new_v4();
        let subject_id = Uuid::new_v4();
        repo.add(watcher(bug_id, subject_id)).await.unwrap();
        repo.remove(bug_id, subject_id).await.unwrap();
        assert!(repo.list_for_bug(bug_id).await.unwrap().is_empty());
    }
}
