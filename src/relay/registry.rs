//! Set of currently admitted subscribers.

use super::subscriber::{Subscriber, SubscriberId};
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent set of subscribers keyed by admission id.
///
/// Uses a sharded concurrent map so that connection tasks can admit and remove
/// themselves while a broadcast is running. Broadcasts work on a
/// [`snapshot`](Self::snapshot), never on the live map.
///
/// # Examples
///
/// ```
/// use voltwatch::relay::{Subscriber, SubscriberRegistry};
///
/// let registry = SubscriberRegistry::new();
/// let (subscriber, _stream) = Subscriber::open(None, 16);
/// let subscriber = registry.insert(subscriber);
///
/// assert!(registry.contains(subscriber.id()));
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Add a freshly opened subscriber.
    ///
    /// Takes the subscriber by value: a removed entry can never be put back,
    /// a reconnecting viewer always comes in as a new `Subscriber`.
    pub fn insert(&self, subscriber: Subscriber) -> Arc<Subscriber> {
        let subscriber = Arc::new(subscriber);
        self.subscribers
            .insert(subscriber.id(), Arc::clone(&subscriber));
        metrics::gauge!("voltwatch_subscribers").set(self.subscribers.len() as f64);
        subscriber
    }

    /// Remove a subscriber. Returns `None` if it was already gone.
    pub fn remove(&self, id: SubscriberId) -> Option<Arc<Subscriber>> {
        let removed = self.subscribers.remove(&id).map(|(_, subscriber)| subscriber);
        if removed.is_some() {
            metrics::gauge!("voltwatch_subscribers").set(self.subscribers.len() as f64);
        }
        removed
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn get(&self, id: SubscriberId) -> Option<Arc<Subscriber>> {
        self.subscribers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Stable copy of the current membership for iteration.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Remove and return every subscriber.
    pub fn drain(&self) -> Vec<Arc<Subscriber>> {
        let ids: Vec<SubscriberId> = self.subscribers.iter().map(|entry| *entry.key()).collect();
        let drained = ids.into_iter().filter_map(|id| self.remove(id)).collect();
        metrics::gauge!("voltwatch_subscribers").set(self.subscribers.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
