//! Comment repository implementation.

use async_trait::async_trait;
use uuid::Uuid;

use bugline_core::{Comment, CommentRepository, Result};

use crate::state::Shared;

/// In-memory implementation of CommentRepository.
pub struct MemCommentRepository {
    state: Shared,
}

impl MemCommentRepository {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

#[async_trait]
impl CommentRepository for MemCommentRepository {
    async fn insert(&self, comment: Comment) -> Result<()> {
        let mut state = self.state.write().await;
        state.comments.insert(comment.id, comment);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Comment>> {
        let state = self.state.read().await;
        Ok(state.comments.get(&id).cloned())
    }

    async fn list_for_bug(&self, bug_id: Uuid) -> Result<Vec<Comment>> {
        let state = self.state.read().await;
        let mut comments: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.bug_id == bug_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.created_at);
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment(bug_id: Uuid, body: &str) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            bug_id,
            author_id: Uuid::new_v4(),
            parent_id: None,
            body: body.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_get_list() {
        let repo = MemCommentRepository::new(Shared::default());
        let bug_id = Uuid::new_v4();
        let c = comment(bug_id, "first");
        let id = c.id;
        repo.insert(c).await.unwrap();
        repo.insert(comment(bug_id, "second")).await.unwrap();
        repo.insert(comment(Uuid::new_v4(), "other bug")).await.unwrap();

        assert_eq!(repo.get(id).await.unwrap().unwrap().body, "first");
        assert_eq!(repo.list_for_bug(bug_id).await.unwrap().len(), 2);
    }
}
