//! Named subscriber groups.

use crate::error::{PropagationError, Result, SubscriberError, SubscriberResult};
use crate::types::PropertyOperation;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::selector::PropertySelector;
use super::subscriber::Subscriber;

/// A named group of subscribers fed by one or more officers.
///
/// The selector decides which keys an officer routes here; each member then
/// filters again by its own key. Once closed, `dispatch` is a no-op.
pub struct Subscription {
    name: String,
    selector: PropertySelector,
    subscribers: Vec<Arc<dyn Subscriber>>,
    closed: AtomicBool,
}

impl Subscription {
    /// Create a subscription whose selector is derived from its members.
    ///
    /// If every subscriber watches a single key the selector is the exact set
    /// of those keys; any key-agnostic member widens it to
    /// [`PropertySelector::Any`].
    pub fn new(name: impl Into<String>, subscribers: Vec<Arc<dyn Subscriber>>) -> Result<Self> {
        let selector = derive_selector(&subscribers);
        Self::with_selector(name, selector, subscribers)
    }

    /// Create a subscription with an explicit selector.
    pub fn with_selector(
        name: impl Into<String>,
        selector: PropertySelector,
        subscribers: Vec<Arc<dyn Subscriber>>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PropagationError::BlankName);
        }
        Ok(Self {
            name,
            selector,
            subscribers,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &PropertySelector {
        &self.selector
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver operations to every interested member, in order.
    pub fn dispatch(&self, operations: &[PropertyOperation]) {
        if self.is_closed() {
            return;
        }
        for operation in operations {
            for subscriber in &self.subscribers {
                if !subscriber.interested_in(operation.key()) {
                    continue;
                }
                // Failures are logged inside `invoke`; delivery carries on.
                let _ = match operation {
                    PropertyOperation::Set { key, value } => {
                        self.invoke(key, || subscriber.on_set(key, value))
                    }
                    PropertyOperation::Remove { key } => {
                        self.invoke(key, || subscriber.on_removed(key))
                    }
                };
            }
        }
    }

    /// The named officer disappeared; every member sees a removal.
    pub fn off_officer(&self, officer: &str) {
        if self.is_closed() {
            return;
        }
        debug!(subscription = %self.name, officer, "officer went away");
        for subscriber in &self.subscribers {
            let _ = self.invoke(subscriber.key().unwrap_or("*"), || {
                subscriber.on_officer_off(officer)
            });
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(subscription = %self.name, "subscription closed");
        }
    }

    /// Run one callback, logging and swallowing errors and panics.
    fn invoke<F>(&self, key: &str, callback: F) -> SubscriberResult
    where
        F: FnOnce() -> SubscriberResult,
    {
        match catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(subscription = %self.name, key, error = %e, "subscriber failed");
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(subscription = %self.name, key, panic = %message, "subscriber panicked");
                Err(SubscriberError(message))
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("selector", &self.selector)
            .field("subscribers", &self.subscribers.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn derive_selector(subscribers: &[Arc<dyn Subscriber>]) -> PropertySelector {
    let mut keys = Vec::with_capacity(subscribers.len());
    for subscriber in subscribers {
        match subscriber.key() {
            Some(key) => keys.push(key.to_string()),
            None => return PropertySelector::Any,
        }
    }
    PropertySelector::exact(keys)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "subscriber panicked".to_string()
    }
}
