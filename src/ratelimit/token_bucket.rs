//! Per-connection token bucket
//!
//! Capacity C, refill rate R/sec. `try_acquire` either takes a token or
//! reports the message should be dropped; it is never blocking and never
//! touches the bucket state of any other connection.

use std::time::Instant;

use parking_lot::Mutex;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single connection's token bucket. Owned by the Connection Registry
/// entry for that connection — there is one instance per live connection,
/// never a shared map, since buckets never need to be looked up by id.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = now;
        }
    }

    /// Take one token if available. Returns `false` without consuming
    /// anything when the bucket is empty — the caller drops the message and
    /// emits `ERROR{code=rate_limit}`.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn tokens(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_starts_full() {
        let bucket = TokenBucket::new(5, 1.0);
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[test]
    fn test_drains_to_empty() {
        let bucket = TokenBucket::new(3, 0.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_refills_over_time() {
        let bucket = TokenBucket::new(2, 1000.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        sleep(Duration::from_millis(5));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let bucket = TokenBucket::new(2, 1000.0);
        sleep(Duration::from_millis(50));
        assert_eq!(bucket.tokens(), 2.0);
    }
}
