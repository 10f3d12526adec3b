//! Officers: the merge, ownership and consistency engine.
//!
//! An officer tracks one cursor per registered publisher and applies that
//! publisher's manifests strictly in version order:
//! - a manifest below the cursor is stale and skipped without side effects
//! - a manifest above the cursor triggers catch-up, pulling the missing
//!   manifests from the publisher and applying them oldest first
//! - a manifest at the cursor is applied operation by operation
//!
//! Keys belong to the publisher that created them. Changes are pushed to
//! matching subscriptions on the applying thread.
//!
//! # Example
//!
//! ```ignore
//! let officer = Arc::new(Officer::new("officer")?);
//! let view = ViewPool::new("view")?;
//! officer.subscribe(view.subscription())?;
//!
//! let publisher = Publisher::new("pub")?;
//! publisher.contract(&officer)?;
//! publisher.publish(vec![PropertyOperation::set("db.host", "localhost")]);
//!
//! assert!(view.contains_property("db.host"));
//! ```

mod engine;
mod pool;

pub use engine::Officer;
pub use pool::ManifestFuture;
