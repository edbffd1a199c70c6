//! Live/idle session tracking from file-write recency.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks which sessions are receiving writes.
///
/// Transitions are reported exactly once: `mark_active` returns true only
/// when the session was not already active, and `sweep` removes and
/// returns sessions whose last write is older than the idle timeout.
pub struct ActivityTracker {
    last_write: HashMap<String, Instant>,
    idle_timeout: Duration,
}

impl ActivityTracker {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { last_write: HashMap::new(), idle_timeout }
    }

    /// Record a write. Returns true when this flips the session to active.
    pub fn mark_active(&mut self, session_id: &str) -> bool {
        self.last_write.insert(session_id.to_string(), Instant::now()).is_none()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.last_write.contains_key(session_id)
    }

    /// Drop and return sessions idle past the timeout.
    pub fn sweep(&mut self) -> Vec<String> {
        let timeout = self.idle_timeout;
        let expired: Vec<String> = self
            .last_write
            .iter()
            .filter(|(_, last)| last.elapsed() >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.last_write.remove(id);
        }
        expired
    }
}
