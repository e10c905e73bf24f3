//! Metric names recorded by the hubs and sessions.
//!
//! All metrics carry a `hub` label (`chat` or `notifications`).

/// Sessions registered (counter).
pub const SESSIONS_REGISTERED_TOTAL: &str = "relay_sessions_registered_total";
/// Sessions removed by unregister or eviction (counter).
pub const SESSIONS_UNREGISTERED_TOTAL: &str = "relay_sessions_unregistered_total";
/// Live sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "relay_sessions_active";
/// Envelopes enqueued onto session queues by broadcasts (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "relay_broadcast_deliveries_total";
/// Sessions evicted because their queue was full or closed (counter).
pub const EVICTIONS_TOTAL: &str = "relay_evictions_total";
/// Sessions terminated for oversize or malformed frames (counter, labels: reason).
pub const PROTOCOL_VIOLATIONS_TOTAL: &str = "relay_protocol_violations_total";
/// Session lifetime in seconds (histogram).
pub const SESSION_DURATION_SECONDS: &str = "relay_session_duration_seconds";
/// Detached background task failures (counter, labels: task).
pub const BACKGROUND_FAILURES_TOTAL: &str = "relay_background_failures_total";
