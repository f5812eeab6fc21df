//! # bugline-pipeline
//!
//! The permission-scoped mutation pipeline and its notification fan-out.
//!
//! [`MutationPipeline`] is the single entry point for state changes: it
//! authorizes against project membership and role, validates, persists
//! atomically through the injected [`bugline_core::Repository`], records
//! activity, and propagates the outcome — per-recipient notifications via
//! [`NotificationFanout`], room-scoped events via the realtime broadcaster.

pub mod fanout;
pub mod pipeline;

pub use fanout::{FanoutEvent, NotificationFanout};
pub use pipeline::{MutationOutcome, MutationPipeline};
