//! Connection Registry (C4)
//!
//! Tracks live connections and the two indexes the router and broadcaster
//! need: connection → channels and channel → connections. Sharded via
//! `dashmap` so unrelated entries proceed in parallel.

pub mod connection;
pub mod topic_table;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

pub use connection::{Connection, ConnectionId, EnqueueOutcome};
use topic_table::AccessPolicy;

use crate::auth::Role;
use crate::envelope::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    AuthRequired,
    ForbiddenRole,
    UnknownTopic,
}

impl DenyReason {
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::AuthRequired => "auth_required",
            DenyReason::ForbiddenRole => "forbidden",
            DenyReason::UnknownTopic => "unknown_topic",
        }
    }
}

pub type SubscribeResult = Result<(), DenyReason>;

pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// channel -> subscriber connection ids
    channel_index: DashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            channel_index: DashMap::new(),
        }
    }

    pub fn register(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id, conn);
    }

    /// Idempotent: unregistering an id not present is a no-op.
    pub fn unregister(&self, id: ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(&id) {
            for channel in conn.channels_snapshot() {
                if let Some(mut subs) = self.channel_index.get_mut(&channel) {
                    subs.remove(&id);
                    if subs.is_empty() {
                        drop(subs);
                        self.channel_index.remove(&channel);
                    }
                }
            }
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|c| c.clone())
    }

    /// Flags a connection for forced teardown with `SlowConsumer`. The
    /// session loop picks this up on its own next tick; it is idempotent
    /// and a no-op for an id that has since disconnected.
    pub fn mark_for_disconnect(&self, id: ConnectionId) {
        if let Some(conn) = self.connections.get(&id) {
            conn.mark_slow_consumer();
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn check_policy(&self, channel: &str, role: Role) -> SubscribeResult {
        match topic_table::policy_for(channel) {
            None => Err(DenyReason::UnknownTopic),
            Some(AccessPolicy::Public) => Ok(()),
            Some(AccessPolicy::Authenticated) => {
                if role == Role::Guest {
                    Err(DenyReason::AuthRequired)
                } else {
                    Ok(())
                }
            }
            Some(AccessPolicy::AdminOnly) => {
                if role.is_admin() {
                    Ok(())
                } else if role == Role::Guest {
                    Err(DenyReason::AuthRequired)
                } else {
                    Err(DenyReason::ForbiddenRole)
                }
            }
        }
    }

    /// `subscribe(conn, channel) → {ok | denied(reason)}`. Enforces the
    /// access policy atomically with the subscription itself.
    pub fn subscribe(&self, id: ConnectionId, channel: &str) -> SubscribeResult {
        let conn = self.connections.get(&id).ok_or(DenyReason::UnknownTopic)?;
        self.check_policy(channel, conn.principal_snapshot().role)?;

        conn.add_channel(channel);
        self.channel_index
            .entry(channel.to_string())
            .or_default()
            .insert(id);
        Ok(())
    }

    /// Idempotent: unsubscribing from a channel not held is a no-op.
    pub fn unsubscribe(&self, id: ConnectionId, channel: &str) {
        if let Some(conn) = self.connections.get(&id) {
            conn.remove_channel(channel);
        }
        if let Some(mut subs) = self.channel_index.get_mut(channel) {
            subs.remove(&id);
            if subs.is_empty() {
                drop(subs);
                self.channel_index.remove(channel);
            }
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channel_index.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    /// Enqueue `envelope` (cloned per recipient) on every current subscriber
    /// of `channel` that passes `filter`. Returns the enqueue outcome for
    /// each recipient so the caller (the Broadcaster) can act on consecutive
    /// drops without a second pass over the subscriber list.
    pub fn for_each_subscriber(
        &self,
        channel: &str,
        mut filter: impl FnMut(&Connection) -> bool,
        envelope: &Envelope,
    ) -> Vec<(ConnectionId, EnqueueOutcome)> {
        let Some(subs) = self.channel_index.get(channel) else {
            return Vec::new();
        };
        let mut outcomes = Vec::new();
        for id in subs.iter() {
            if let Some(conn) = self.connections.get(id) {
                if filter(&conn) {
                    outcomes.push((*id, conn.enqueue(envelope.clone())));
                }
            }
        }
        outcomes
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
