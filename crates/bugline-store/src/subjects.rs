//! Subject repository implementation.

use async_trait::async_trait;
use uuid::Uuid;

use bugline_core::{Result, Subject, SubjectRepository};

use crate::state::Shared;

/// In-memory implementation of SubjectRepository.
pub struct MemSubjectRepository {
    state: Shared,
}

impl MemSubjectRepository {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

#[async_trait]
impl SubjectRepository for MemSubjectRepository {
    async fn insert(&self, subject: Subject) -> Result<()> {
        let mut state = self.state.write().await;
        state.subjects.insert(subject.id, subject);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subject>> {
        let state = self.state.read().await;
        Ok(state.subjects.get(&id).cloned())
    }

    async fn resolve_usernames(&self, usernames: &[String]) -> Result<Vec<Subject>> {
        let state = self.state.read().await;
        let mut resolved: Vec<Subject> = state
            .subjects
            .values()
            .filter(|s| usernames.iter().any(|u| u == &s.username.to_lowercase()))
            .cloned()
            .collect();
        // Deterministic output regardless of map iteration order.
        resolved.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugline_core::Role;

    fn subject(username: &str) -> Subject {
        Subject {
            id: Uuid::new_v4(),
            username: username.to_string(),
            display_name: username.to_string(),
            role: Role::Developer,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = MemSubjectRepository::new(Shared::default());
        let s = subject("alice");
        let id = s.id;
        repo.insert(s).await.unwrap();

        let got = repo.get(id).await.unwrap().unwrap();
        assert_eq!(got.username, "alice");
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_usernames_drops_unknown() {
        let repo = MemSubjectRepository::new(Shared::default());
        repo.insert(subject("alice")).await.unwrap();
        repo.insert(subject("bob")).await.unwrap();

        let resolved = repo
            .resolve_usernames(&["alice".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].username, "alice");
    }

    #[tokio::test]
    async fn test_resolve_matches_lowercased_form() {
        let repo = MemSubjectRepository::new(Shared::default());
        repo.insert(subject("Carol")).await.unwrap();

        // Mention extraction lowercases; resolution matches that form.
        let resolved = repo
            .resolve_usernames(&["carol".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
    }
}
