//! Per-(principal, room) sliding chat window
//!
//! M messages per W seconds, independent of the connection's token bucket.
//! Implemented as a lazily-reset fixed window rather than a true sliding
//! log: cheaper, O(1), and sufficient for the invariant that matters here
//! (accepted messages per window ≤ M).

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Window {
    count: u32,
    started_at: Instant,
}

pub struct ChatWindowLimiter {
    max_messages: u32,
    window: Duration,
    windows: DashMap<(String, u64), Window>,
}

impl ChatWindowLimiter {
    pub fn new(max_messages: u32, window_secs: u64) -> Self {
        Self {
            max_messages,
            window: Duration::from_secs(window_secs),
            windows: DashMap::new(),
        }
    }

    /// `tryChat(principal, room)`. Returns `true` if this message is within
    /// the window's budget and has been counted; `false` if the window is
    /// exhausted (the caller must not broadcast it).
    pub fn try_chat(&self, principal_id: &str, contest_id: u64) -> bool {
        let key = (principal_id.to_string(), contest_id);
        let now = Instant::now();

        let mut entry = self.windows.entry(key).or_insert_with(|| Window {
            count: 0,
            started_at: now,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.count = 0;
            entry.started_at = now;
        }

        if entry.count >= self.max_messages {
            return false;
        }

        entry.count += 1;
        true
    }
}
