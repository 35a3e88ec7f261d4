use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use super::message::StreamedMessage;
use super::topic::VehicleKey;

/// Subscriber callback. Each invocation runs on its own task.
pub type Callback = Arc<dyn Fn(StreamedMessage) + Send + Sync>;

/// Token returned by a subscribe call; hand it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: Uuid,
    key: VehicleKey,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &VehicleKey {
        &self.key
    }
}

/// Immutable copy of the registry handed to the streaming manager.
///
/// Every registry change bumps `version`, so a manager can tell which of two
/// snapshots is newer regardless of the order they reach it.
#[derive(Clone, Default)]
pub struct Snapshot {
    version: u64,
    entries: HashMap<VehicleKey, HashMap<Uuid, Callback>>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &VehicleKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Distinct keys with at least one subscriber.
    pub fn keys(&self) -> impl Iterator<Item = &VehicleKey> {
        self.entries.keys()
    }

    pub fn subscriber_count(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    /// Callbacks interested in a message for `vin`: the VIN's own plus the
    /// wildcard subscribers.
    pub fn callbacks_for(&self, vin: &str) -> Vec<Callback> {
        let exact = VehicleKey::vin(vin);
        [&exact, &VehicleKey::AnyVehicle, &VehicleKey::AnyTopic]
            .into_iter()
            .filter_map(|key| self.entries.get(key))
            .flat_map(|callbacks| callbacks.values().cloned())
            .collect()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, callbacks) in &self.entries {
            map.entry(key, &callbacks.len());
        }
        map.finish()
    }
}

/// Key to callbacks map behind a single lock.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Snapshot>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: VehicleKey, callback: Callback) -> (Subscription, Arc<Snapshot>) {
        let id = Uuid::new_v4();
        let mut inner = self.lock();
        inner
            .entries
            .entry(key.clone())
            .or_default()
            .insert(id, callback);
        inner.version += 1;
        (Subscription { id, key }, Arc::new(inner.clone()))
    }

    /// Remove a subscription. `None` when it was not registered.
    pub fn remove(&self, subscription: &Subscription) -> Option<Arc<Snapshot>> {
        let mut inner = self.lock();
        let callbacks = inner.entries.get_mut(&subscription.key)?;
        callbacks.remove(&subscription.id)?;
        if callbacks.is_empty() {
            inner.entries.remove(&subscription.key);
        }
        inner.version += 1;
        Some(Arc::new(inner.clone()))
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::new(self.lock().clone())
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
