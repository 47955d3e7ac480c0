//! In-process event bus (C1)
//!
//! Domain services and the Service Supervisor publish lifecycle, metric, and
//! incident events here; the Broadcaster and admin-facing handlers subscribe.
//! Single-process only: no pluggable backend, no durable stream topics, no
//! cross-node clustering, no offline delivery — every topic here is a
//! `tokio::sync::broadcast` channel keyed by name and type.

mod error;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

pub use error::BusError;

const DEFAULT_CHANNEL_CAPACITY: usize = crate::core::constants::DEFAULT_BUS_CHANNEL_CAPACITY;

/// Marker for anything that can travel over the bus.
pub trait BusMessage: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> BusMessage for T {}

#[derive(Clone)]
pub struct Publisher<T: BusMessage> {
    tx: broadcast::Sender<T>,
}

impl<T: BusMessage> Publisher<T> {
    /// Publish to every current subscriber. Returns `Ok(n)` with the number
    /// of receivers notified; publishing with zero subscribers is not an error.
    pub fn publish(&self, msg: T) -> Result<usize, BusError> {
        match self.tx.send(msg) {
            Ok(n) => Ok(n),
            Err(_) => Ok(0),
        }
    }
}

pub struct Subscriber<T: BusMessage> {
    rx: broadcast::Receiver<T>,
}

impl<T: BusMessage> Subscriber<T> {
    pub async fn recv(&mut self) -> Result<T, BusError> {
        self.rx.recv().await.map_err(Into::into)
    }
}

struct TopicEntry<T> {
    tx: broadcast::Sender<T>,
}

trait AnyTopic: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: BusMessage> AnyTopic for TopicEntry<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

type TopicMap = HashMap<String, (TypeId, Arc<dyn AnyTopic>)>;

/// Central pub/sub registry. Cheap to clone (wraps an `Arc` internally via
/// its callers), but typically held behind a single `Arc<EventBus>` shared
/// across the hub.
pub struct EventBus {
    topics: RwLock<TopicMap>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    fn get_or_create<T: BusMessage>(&self, name: &str) -> Result<broadcast::Sender<T>, BusError> {
        if let Some((type_id, entry)) = self.topics.read().get(name) {
            if *type_id != TypeId::of::<T>() {
                return Err(BusError::TypeMismatch(name.to_string()));
            }
            return Ok(entry
                .as_any()
                .downcast_ref::<TopicEntry<T>>()
                .expect("type checked above")
                .tx
                .clone());
        }

        let mut topics = self.topics.write();
        if let Some((type_id, entry)) = topics.get(name) {
            if *type_id != TypeId::of::<T>() {
                return Err(BusError::TypeMismatch(name.to_string()));
            }
            return Ok(entry
                .as_any()
                .downcast_ref::<TopicEntry<T>>()
                .expect("type checked above")
                .tx
                .clone());
        }

        let (tx, _rx) = broadcast::channel(self.capacity);
        let entry = Arc::new(TopicEntry { tx: tx.clone() });
        topics.insert(name.to_string(), (TypeId::of::<T>(), entry));
        Ok(tx)
    }

    pub fn publisher<T: BusMessage>(&self, name: &str) -> Result<Publisher<T>, BusError> {
        let tx = self.get_or_create::<T>(name)?;
        Ok(Publisher { tx })
    }

    pub fn subscribe<T: BusMessage>(&self, name: &str) -> Result<Subscriber<T>, BusError> {
        let tx = self.get_or_create::<T>(name)?;
        Ok(Subscriber { rx: tx.subscribe() })
    }

    pub fn publish<T: BusMessage>(&self, name: &str, msg: T) -> Result<usize, BusError> {
        self.publisher(name)?.publish(msg)
    }

    /// Drop all topic senders, closing every outstanding subscriber.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.topics.write().drain().collect();
        tracing::debug!(count = drained.len(), "Event bus topics closed");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
