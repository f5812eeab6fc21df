//! # bugline-store
//!
//! In-memory storage layer for bugline.
//!
//! This crate provides:
//! - Repository implementations for all core entities
//! - The atomic multi-write units the pipeline relies on (bug + implicit
//!   watchers in one unit)
//! - Race-free per-project bug sequence allocation
//!
//! Every repository handle shares one state table behind a `tokio::sync::RwLock`,
//! so a write guard covers cross-entity writes atomically. The store is
//! process-local: a production deployment would put a durable backend behind
//! the same `bugline_core::traits` contracts.
//!
//! ## Example
//!
//! ```rust
//! use bugline_store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     let repo = store.repository();
//!
//!     let seq = repo.sequences.next_sequence(uuid::Uuid::new_v4()).await?;
//!     assert_eq!(seq, 1);
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod bugs;
pub mod comments;
pub mod memberships;
pub mod notifications;
pub mod sequence;
mod state;
pub mod subjects;
pub mod watchers;

use std::sync::Arc;

use bugline_core::Repository;

use crate::state::Shared;

pub use activity::MemActivityRepository;
pub use bugs::MemBugRepository;
pub use comments::MemCommentRepository;
pub use memberships::MemMembershipRepository;
pub use notifications::MemNotificationRepository;
pub use sequence::MemSequenceAllocator;
pub use subjects::MemSubjectRepository;
pub use watchers::MemWatcherRepository;

/// Handle to one in-memory store instance.
///
/// Constructed explicitly at process start and handed down; there is no
/// process-wide singleton. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Shared,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle repository handles over this store for injection into the
    /// pipeline.
    pub fn repository(&self) -> Repository {
        Repository {
            subjects: Arc::new(MemSubjectRepository::new(self.state.clone())),
            memberships: Arc::new(MemMembershipRepository::new(self.state.clone())),
            bugs: Arc::new(MemBugRepository::new(self.state.clone())),
            comments: Arc::new(MemCommentRepository::new(self.state.clone())),
            watchers: Arc::new(MemWatcherRepository::new(self.state.clone())),
            activity: Arc::new(MemActivityRepository::new(self.state.clone())),
            notifications: Arc::new(MemNotificationRepository::new(self.state.clone())),
            sequences: Arc::new(MemSequenceAllocator::new(self.state.clone())),
        }
    }
}
