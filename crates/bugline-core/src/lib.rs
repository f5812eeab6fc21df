//! # bugline-core
//!
//! Core types, traits, and pure decision logic for the bugline issue
//! tracker: domain models, error taxonomy, room/event envelope, storage
//! capability traits, and the three synchronous components of the mutation
//! pipeline (authorization gate, mention parser, activity recorder).

pub mod activity;
pub mod authz;
pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod mentions;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use authz::{authorize, Action, AuthzContext, Decision, DenialReason, Target};
pub use error::{Error, Result};
pub use events::{EventPayload, PresenceUser, Room, RoomEvent, RoomScope};
pub use mentions::extract_mentions;
pub use models::*;
pub use traits::*;
