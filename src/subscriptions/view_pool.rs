//! Locally cached property views.

use crate::error::{Result, SubscriberResult};
use crate::resolver::{resolve, Resolve};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::selector::PropertySelector;
use super::subscriber::Subscriber;
use super::subscription::Subscription;

type Cache = Arc<RwLock<HashMap<String, Value>>>;

/// Keeps the cache in step with the subscription it belongs to.
struct CacheWriter {
    cache: Cache,
}

impl Subscriber for CacheWriter {
    fn key(&self) -> Option<&str> {
        None
    }

    fn on_set(&self, key: &str, value: &Value) -> SubscriberResult {
        self.cache.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn on_removed(&self, key: &str) -> SubscriberResult {
        self.cache.write().remove(key);
        Ok(())
    }

    fn on_officer_off(&self, _officer: &str) -> SubscriberResult {
        self.cache.write().clear();
        Ok(())
    }
}

/// A subscription that mirrors every key it sees for synchronous reads.
///
/// Register [`ViewPool::subscription`] with an officer. After
/// [`ViewPool::close`] the cache stops changing but stays readable.
///
/// # Example
///
/// ```ignore
/// let view = ViewPool::new("view")?;
/// officer.subscribe(view.subscription())?;
///
/// publisher.publish(vec![PropertyOperation::set("db.port", 3306)]);
/// assert_eq!(view.get_property_value::<i32>("db.port"), Some(3306));
/// assert_eq!(view.get_property_value::<String>("db.port"), Some("3306".into()));
/// ```
pub struct ViewPool {
    subscription: Arc<Subscription>,
    cache: Cache,
}

impl ViewPool {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let cache: Cache = Arc::new(RwLock::new(HashMap::new()));
        let writer = CacheWriter {
            cache: Arc::clone(&cache),
        };
        let subscription = Subscription::with_selector(
            name,
            PropertySelector::Any,
            vec![Arc::new(writer) as Arc<dyn Subscriber>],
        )?;
        Ok(Self {
            subscription: Arc::new(subscription),
            cache,
        })
    }

    /// The subscription to register with officers.
    pub fn subscription(&self) -> Arc<Subscription> {
        Arc::clone(&self.subscription)
    }

    pub fn name(&self) -> &str {
        self.subscription.name()
    }

    /// Raw cached value.
    pub fn get_property(&self, key: &str) -> Option<Value> {
        self.cache.read().get(key).cloned()
    }

    /// Cached value resolved to `T`; `None` if absent or not resolvable.
    pub fn get_property_value<T: Resolve>(&self, key: &str) -> Option<T> {
        self.cache.read().get(key).and_then(resolve::<T>)
    }

    /// Resolved value, or `default` when unavailable.
    pub fn get_or<T: Resolve>(&self, key: &str, default: T) -> T {
        self.get_property_value(key).unwrap_or(default)
    }

    /// Raw value if present and not JSON `null`.
    pub fn get_optional(&self, key: &str) -> Option<Value> {
        self.get_property(key).filter(|v| !v.is_null())
    }

    pub fn contains_property(&self, key: &str) -> bool {
        self.cache.read().contains_key(key)
    }

    /// Snapshot of the cached keys.
    pub fn keys(&self) -> BTreeSet<String> {
        self.cache.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.subscription.is_closed()
    }

    pub fn close(&self) {
        self.subscription.close();
    }
}
