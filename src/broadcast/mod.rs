//! Broadcaster (C7)
//!
//! Fans out envelopes to channel subscribers via the Connection Registry.
//! Enqueue is always non-blocking; a full outbound queue drops the message
//! for that one subscriber and, after `slow_consumer_threshold` consecutive
//! drops, the subscriber is reported for disconnection with reason
//! `slow_consumer`. Cross-channel ordering is not preserved;
//! within a channel, delivery to a given subscriber is FIFO because the
//! registry iterates and enqueues synchronously in publish order.

use std::sync::Arc;

use crate::auth::Role;
use crate::envelope::Envelope;
use crate::registry::{Connection, ConnectionId, ConnectionRegistry, EnqueueOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Target<'a> {
    All,
    Role(Role),
    Principal(&'a str),
}

pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    slow_consumer_threshold: u32,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, slow_consumer_threshold: u32) -> Self {
        Self {
            registry,
            slow_consumer_threshold,
        }
    }

    /// `broadcast(channel, envelope)`. Subscribers that cross the
    /// slow-consumer threshold are flagged in the registry for the Hub's
    /// session loop to close out of band, and are also returned here in
    /// case a caller wants to act on them immediately (e.g. logging).
    pub fn broadcast(&self, channel: &str, envelope: Envelope) -> Vec<ConnectionId> {
        self.broadcast_filtered(channel, envelope, Target::All)
    }

    pub fn broadcast_filtered(
        &self,
        channel: &str,
        envelope: Envelope,
        target: Target,
    ) -> Vec<ConnectionId> {
        let filter = move |conn: &Connection| match target {
            Target::All => true,
            Target::Role(role) => conn.principal_snapshot().role == role,
            Target::Principal(id) => conn.principal_snapshot().id == id,
        };

        let flagged: Vec<ConnectionId> = self
            .registry
            .for_each_subscriber(channel, filter, &envelope)
            .into_iter()
            .filter_map(|(id, outcome)| match outcome {
                EnqueueOutcome::Dropped { consecutive_drops }
                    if consecutive_drops >= self.slow_consumer_threshold =>
                {
                    Some(id)
                }
                _ => None,
            })
            .collect();

        for id in &flagged {
            self.registry.mark_for_disconnect(*id);
        }
        flagged
    }
}
