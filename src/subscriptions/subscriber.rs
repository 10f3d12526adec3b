//! Subscriber callbacks.

use crate::error::SubscriberResult;
use crate::resolver::{resolve, Resolve};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Receives property changes for the keys it is interested in.
///
/// Callbacks run synchronously on the thread applying the manifest. An `Err`
/// or a panic is logged by the owning subscription and never reaches the
/// publisher or the other subscribers.
pub trait Subscriber: Send + Sync {
    /// The single key this subscriber watches, or `None` for every key.
    fn key(&self) -> Option<&str>;

    fn on_set(&self, key: &str, value: &Value) -> SubscriberResult;

    fn on_removed(&self, key: &str) -> SubscriberResult;

    /// The officer feeding this subscriber went away.
    ///
    /// Keyed subscribers see a removal of their key. Key-agnostic
    /// subscribers should override this to drop whatever they hold.
    fn on_officer_off(&self, _officer: &str) -> SubscriberResult {
        match self.key() {
            Some(key) => self.on_removed(key),
            None => Ok(()),
        }
    }

    /// Whether this subscriber wants events for `key`.
    fn interested_in(&self, key: &str) -> bool {
        self.key().map_or(true, |k| k == key)
    }
}

type Decode<T> = Box<dyn Fn(&Value) -> Option<T> + Send + Sync>;
type SetHandler<T> = Box<dyn Fn(T) -> SubscriberResult + Send + Sync>;
type RemovedHandler = Box<dyn Fn() -> SubscriberResult + Send + Sync>;

/// A subscriber bound to one key that receives values already decoded to `T`.
///
/// Decoding defaults to [`resolve`]; a custom decode function can be supplied
/// with [`TypedSubscriber::with_decoder`]. When decoding yields `None` the
/// value is unavailable and the removed handler runs instead.
pub struct TypedSubscriber<T> {
    key: String,
    decode: Decode<T>,
    on_set: SetHandler<T>,
    on_removed: RemovedHandler,
}

impl<T: Resolve + 'static> TypedSubscriber<T> {
    /// Subscriber decoding through the resolver.
    pub fn new<S, R>(key: impl Into<String>, on_set: S, on_removed: R) -> Self
    where
        S: Fn(T) -> SubscriberResult + Send + Sync + 'static,
        R: Fn() -> SubscriberResult + Send + Sync + 'static,
    {
        Self::with_decoder(key, resolve::<T>, on_set, on_removed)
    }
}

impl<T: 'static> TypedSubscriber<T> {
    pub fn with_decoder<D, S, R>(key: impl Into<String>, decode: D, on_set: S, on_removed: R) -> Self
    where
        D: Fn(&Value) -> Option<T> + Send + Sync + 'static,
        S: Fn(T) -> SubscriberResult + Send + Sync + 'static,
        R: Fn() -> SubscriberResult + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            decode: Box::new(decode),
            on_set: Box::new(on_set),
            on_removed: Box::new(on_removed),
        }
    }
}

impl<T> Subscriber for TypedSubscriber<T> {
    fn key(&self) -> Option<&str> {
        Some(&self.key)
    }

    fn on_set(&self, key: &str, value: &Value) -> SubscriberResult {
        match (self.decode)(value) {
            Some(decoded) => (self.on_set)(decoded),
            None => {
                debug!(key, %value, "value does not decode to subscriber type");
                (self.on_removed)()
            }
        }
    }

    fn on_removed(&self, _key: &str) -> SubscriberResult {
        (self.on_removed)()
    }
}

impl<T> fmt::Debug for TypedSubscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedSubscriber")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
