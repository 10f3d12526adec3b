//! # Property Propagation
//!
//! An in-process, versioned, single-writer-per-key publish/subscribe engine.
//!
//! ## Core Concepts
//!
//! - **Publishers**: Own an append-only manifest log; every batch gets the next version
//! - **Officers**: Merge manifests into one store, enforce key ownership, close gaps
//! - **Subscriptions**: Named subscriber groups filtered by a selector
//! - **View pools**: Subscriptions that cache everything for synchronous reads
//! - **Resolver**: Coerces raw JSON values into the types readers ask for
//!
//! ## Example
//!
//! ```ignore
//! use propagation::{Officer, PropertyOperation, Publisher, ViewPool};
//! use std::sync::Arc;
//!
//! let officer = Arc::new(Officer::new("officer")?);
//! let view = ViewPool::new("view")?;
//! officer.subscribe(view.subscription())?;
//!
//! let publisher = Publisher::new("pub")?;
//! publisher.contract(&officer)?;
//! publisher.publish(vec![PropertyOperation::set("db.host", "localhost")]);
//! publisher.publish(vec![PropertyOperation::set("db.port", 3306)]);
//!
//! assert_eq!(view.get_property_value::<i32>("db.port"), Some(3306));
//! assert_eq!(view.get_property_value::<String>("db.port"), Some("3306".into()));
//! ```

pub mod config;
pub mod error;
pub mod officer;
pub mod publisher;
pub mod resolver;
pub mod results;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::OfficerConfig;
pub use error::{PropagationError, Result, SubscriberError, SubscriberResult};
pub use officer::{ManifestFuture, Officer};
pub use publisher::{ManifestSource, Publisher};
pub use resolver::{resolve, Resolve};
pub use results::{ManifestResult, ManifestStatus, OperationResult, OperationStatus};
pub use subscriptions::{PropertySelector, Subscriber, Subscription, TypedSubscriber, ViewPool};
pub use types::*;
