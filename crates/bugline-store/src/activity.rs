//! Activity log repository implementation. Append-only.

use async_trait::async_trait;
use uuid::Uuid;

use bugline_core::{ActivityLogEntry, ActivityRepository, Result};

use crate::state::Shared;

/// In-memory implementation of ActivityRepository.
pub struct MemActivityRepository {
    state: Shared,
}

impl MemActivityRepository {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ActivityRepository for MemActivityRepository {
    async fn append(&self, entry: ActivityLogEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state.activity.entry(entry.bug_id).or_default().push(entry);
        Ok(())
    }

    async fn list_for_bug(&self, bug_id: Uuid) -> Result<Vec<ActivityLogEntry>> {
        let state = self.state.read().await;
        Ok(state.activity.get(&bug_id).cloned().unwrap_or_default())
    }
}
