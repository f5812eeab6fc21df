//! Centralized default values shared across bugline crates.

/// Attempts the pipeline makes to allocate a bug sequence before
/// surfacing Conflict to the caller.
pub const SEQUENCE_ALLOC_MAX_ATTEMPTS: u32 = 3;

/// Seconds of heartbeat silence after which a presence session is treated
/// as disconnected.
pub const PRESENCE_TIMEOUT_SECS: u64 = 60;

/// Seconds between sweeps of the presence session table.
pub const PRESENCE_SWEEP_INTERVAL_SECS: u64 = 15;

/// Buffered events per live connection before delivery to that connection
/// starts being dropped.
pub const CONNECTION_BUFFER_SIZE: usize = 256;
