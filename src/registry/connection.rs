//! Connection

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Principal;
use crate::core::constants::DEFAULT_OUTBOUND_QUEUE_DEPTH;
use crate::envelope::Envelope;
use crate::ratelimit::TokenBucket;

pub type ConnectionId = Uuid;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A live connection. The hub exclusively owns these;
/// rooms and channel indexes hold only the id, never a strong reference.
pub struct Connection {
    pub id: ConnectionId,
    pub principal: RwLock<Principal>,
    created_at_ms: u64,
    last_activity_ms: AtomicU64,
    pub bucket: TokenBucket,
    channels: RwLock<HashSet<String>>,
    rooms: RwLock<HashSet<u64>>,
    outbound_tx: mpsc::Sender<Envelope>,
    slow_consumer_count: AtomicU32,
    marked_slow_consumer: AtomicBool,
}

impl Connection {
    pub fn new(
        principal: Principal,
        bucket_capacity: u32,
        bucket_refill_per_sec: f64,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(DEFAULT_OUTBOUND_QUEUE_DEPTH);
        let now = now_millis();
        let conn = Arc::new(Self {
            id: Uuid::new_v4(),
            principal: RwLock::new(principal),
            created_at_ms: now,
            last_activity_ms: AtomicU64::new(now),
            bucket: TokenBucket::new(bucket_capacity, bucket_refill_per_sec),
            channels: RwLock::new(HashSet::new()),
            rooms: RwLock::new(HashSet::new()),
            outbound_tx: tx,
            slow_consumer_count: AtomicU32::new(0),
            marked_slow_consumer: AtomicBool::new(false),
        });
        (conn, rx)
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn touch(&self) {
        self.last_activity_ms.store(now_millis(), Ordering::Relaxed);
    }

    pub fn idle_for_ms(&self) -> u64 {
        now_millis().saturating_sub(self.last_activity_ms.load(Ordering::Relaxed))
    }

    pub fn principal_snapshot(&self) -> Principal {
        self.principal.read().clone()
    }

    pub fn channels_snapshot(&self) -> HashSet<String> {
        self.channels.read().clone()
    }

    pub(super) fn add_channel(&self, channel: &str) -> bool {
        self.channels.write().insert(channel.to_string())
    }

    pub(super) fn remove_channel(&self, channel: &str) -> bool {
        self.channels.write().remove(channel)
    }

    pub fn rooms_snapshot(&self) -> HashSet<u64> {
        self.rooms.read().clone()
    }

    pub fn join_room(&self, contest_id: u64) {
        self.rooms.write().insert(contest_id);
    }

    pub fn leave_room(&self, contest_id: u64) {
        self.rooms.write().remove(&contest_id);
    }

    /// Non-blocking enqueue per the Broadcaster's contract: on a
    /// full queue the message is dropped and the slow-consumer counter
    /// ticks; it never blocks the caller on socket I/O.
    pub fn enqueue(&self, envelope: Envelope) -> EnqueueOutcome {
        match self.outbound_tx.try_send(envelope) {
            Ok(()) => {
                self.slow_consumer_count.store(0, Ordering::Relaxed);
                EnqueueOutcome::Sent
            }
            Err(_) => {
                let count = self.slow_consumer_count.fetch_add(1, Ordering::Relaxed) + 1;
                EnqueueOutcome::Dropped { consecutive_drops: count }
            }
        }
    }

    /// Flags this connection for forced teardown with `SlowConsumer` at the
    /// session loop's next check. The outbound queue is already
    /// full by the time a caller sees this, so the close itself cannot ride
    /// the same queue — it is picked up out of band instead.
    pub(super) fn mark_slow_consumer(&self) {
        self.marked_slow_consumer.store(true, Ordering::Relaxed);
    }

    pub fn take_slow_consumer_flag(&self) -> bool {
        self.marked_slow_consumer.swap(false, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Sent,
    Dropped { consecutive_drops: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_has_empty_state() {
        let (conn, _rx) = Connection::new(Principal::guest(), 10, 1.0);
        assert!(conn.channels_snapshot().is_empty());
        assert!(conn.rooms_snapshot().is_empty());
    }

    #[test]
    fn test_enqueue_sends_until_full() {
        let (conn, mut rx) = Connection::new(Principal::guest(), 10, 1.0);
        for _ in 0..DEFAULT_OUTBOUND_QUEUE_DEPTH {
            assert_eq!(conn.enqueue(Envelope::pong()), EnqueueOutcome::Sent);
        }
        match conn.enqueue(Envelope::pong()) {
            EnqueueOutcome::Dropped { consecutive_drops } => assert_eq!(consecutive_drops, 1),
            EnqueueOutcome::Sent => panic!("queue should be full"),
        }
        rx.close();
    }

    #[test]
    fn test_room_membership() {
        let (conn, _rx) = Connection::new(Principal::guest(), 10, 1.0);
        conn.join_room(42);
        assert!(conn.rooms_snapshot().contains(&42));
        conn.leave_room(42);
        assert!(!conn.rooms_snapshot().contains(&42));
    }
}
