//! Session ID generation for connection tracing.
//!
//! Every accepted connection gets an identifier so both copy directions and
//! the health outcome can be correlated in logs.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Counter for short session IDs.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a UUID-based session ID, globally unique.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a short session ID from a process-local counter.
///
/// Format: `conn-{counter}` with the counter zero-padded to 12 hex digits.
pub fn generate_short_session_id() -> String {
    let count = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("conn-{count:012x}")
}

/// Session ID wrapper that can be included in tracing fields.
#[derive(Clone, Debug)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(generate_session_id())
    }

    /// Create the next short session ID.
    pub fn next() -> Self {
        Self(generate_short_session_id())
    }

    /// Get the session ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
