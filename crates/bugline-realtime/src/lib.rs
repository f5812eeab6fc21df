//! # bugline-realtime
//!
//! Live-connection plumbing for bugline: the presence session registry and
//! the room-scoped broadcaster that delivers mutation events to it.
//!
//! The registry is an explicit room → subscriber-set index with one mpsc
//! channel per connection — no implicit callback registration — which keeps
//! delivery ordering and disconnect cleanup deterministic.

pub mod broadcast;
pub mod presence;

pub use broadcast::RealtimeBroadcaster;
pub use presence::{spawn_sweeper, PresenceConfig, PresenceTracker, SweeperHandle};
