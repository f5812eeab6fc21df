//! Structured logging schema and field name constants for bugline.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue (dropped notification batch, full channel) |
//! | INFO  | Lifecycle events, completed mutations |
//! | DEBUG | Decision points, fan-out recipient sets, room membership |
//! | TRACE | Per-connection delivery, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "pipeline", "fanout", "presence", "broadcast", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "create_bug", "fanout", "join_room", "sweep"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Bug UUID being operated on.
pub const BUG_ID: &str = "bug_id";

/// Project UUID scope of the operation.
pub const PROJECT_ID: &str = "project_id";

/// Acting or affected subject UUID.
pub const SUBJECT_ID: &str = "subject_id";

/// Presence session UUID.
pub const SESSION_ID: &str = "session_id";

/// Mutation event UUID (fan-out dedup key).
pub const EVENT_ID: &str = "event_id";

/// Room the operation targets, in textual form.
pub const ROOM: &str = "room";

/// Colon-namespaced event type being delivered.
pub const EVENT_TYPE: &str = "event_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Number of recipients selected by a fan-out.
pub const RECIPIENT_COUNT: &str = "recipient_count";

/// Number of live connections a broadcast reached.
pub const DELIVERY_COUNT: &str = "delivery_count";

/// Allocated bug sequence number.
pub const SEQUENCE: &str = "sequence";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
