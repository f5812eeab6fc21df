//! Project membership repository implementation.

use async_trait::async_trait;
use uuid::Uuid;

use bugline_core::{Error, MembershipRepository, ProjectMembership, Result};

use crate::state::Shared;

/// In-memory implementation of MembershipRepository.
pub struct MemMembershipRepository {
    state: Shared,
}

impl MemMembershipRepository {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

#[async_trait]
impl MembershipRepository for MemMembershipRepository {
    async fn add(&self, membership: ProjectMembership) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (membership.subject_id, membership.project_id);
        state.memberships.insert(key, membership);
        Ok(())
    }

    async fn remove(&self, subject_id: Uuid, project_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .memberships
            .remove(&(subject_id, project_id))
            .map(|_| ())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "membership of {subject_id} on project {project_id}"
                ))
            })
    }

    async fn get(&self, subject_id: Uuid, project_id: Uuid) -> Result<Option<ProjectMembership>> {
        let state = self.state.read().await;
        Ok(state.memberships.get(&(subject_id, project_id)).cloned())
    }

    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<ProjectMembership>> {
        let state = self.state.read().await;
        let mut members: Vec<ProjectMembership> = state
            .memberships
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.created_at);
        Ok(members)
    }
}
