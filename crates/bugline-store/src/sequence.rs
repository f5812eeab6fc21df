//! Per-project bug sequence allocation.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use bugline_core::{Result, SequenceAllocator};

use crate::state::Shared;

/// In-memory implementation of SequenceAllocator.
///
/// Allocation takes the store's write guard, so two concurrent calls for
/// the same project serialize and never hand out the same value. The
/// counter seeds itself from the highest sequence already present in the
/// bug table, which keeps externally seeded projects gap-free.
pub struct MemSequenceAllocator {
    state: Shared,
}

impl MemSequenceAllocator {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

#[async_trait]
impl SequenceAllocator for MemSequenceAllocator {
    async fn next_sequence(&self, project_id: Uuid) -> Result<i64> {
        let mut state = self.state.write().await;

        let highest_stored = state
            .bugs
            .values()
            .filter(|b| b.project_id == project_id)
            .map(|b| b.sequence)
            .max()
            .unwrap_or(0);
        let highest_allocated = state
            .sequence_counters
            .get(&project_id)
            .copied()
            .unwrap_or(0);

        let next = highest_stored.max(highest_allocated) + 1;
        state.sequence_counters.insert(project_id, next);

        debug!(
            subsystem = "store",
            op = "next_sequence",
            project_id = %project_id,
            sequence = next,
            "allocated bug sequence"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugline_core::{Bug, BugStatus, Priority, Severity};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn seeded_bug(project_id: Uuid, sequence: i64) -> Bug {
        Bug {
            id: Uuid::new_v4(),
            project_id,
            sequence,
            title: String::new(),
            description: String::new(),
            status: BugStatus::New,
            priority: Priority::Low,
            severity: Severity::Minor,
            reporter_id: Uuid::new_v4(),
            assignee_id: None,
            resolved_at: None,
            custom_fields: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_starts_at_one() {
        let allocator = MemSequenceAllocator::new(Shared::default());
        assert_eq!(allocator.next_sequence(Uuid::new_v4()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_seeds_from_stored_bugs() {
        let state = Shared::default();
        let project_id = Uuid::new_v4();
        {
            let mut guard = state.write().await;
            for seq in 1..=5 {
                let b = seeded_bug(project_id, seq);
                guard.bugs.insert(b.id, b);
            }
        }
        let allocator = MemSequenceAllocator::new(state);
        assert_eq!(allocator.next_sequence(project_id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_projects_are_independent() {
        let allocator = MemSequenceAllocator::new(Shared::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(allocator.next_sequence(a).await.unwrap(), 1);
        assert_eq!(allocator.next_sequence(a).await.unwrap(), 2);
        assert_eq!(allocator.next_sequence(b).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_never_collide() {
        let allocator = Arc::new(MemSequenceAllocator::new(Shared::default()));
        let project_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator.next_sequence(project_id).await.unwrap()
            }));
        }

        let mut allocated = Vec::new();
        for handle in handles {
            allocated.push(handle.await.unwrap());
        }
        allocated.sort_unstable();
        // Strictly increasing, no gaps, no duplicates.
        assert_eq!(allocated, (1..=32).collect::<Vec<i64>>());
    }
}
