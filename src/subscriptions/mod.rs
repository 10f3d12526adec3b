//! Subscriptions: how officers hand property changes to interested code.
//!
//! - [`PropertySelector`] picks the keys an officer routes to a subscription
//! - [`Subscriber`] receives individual set/removed callbacks
//! - [`Subscription`] groups subscribers under a name and isolates their failures
//! - [`ViewPool`] caches everything it sees for synchronous reads
//!
//! # Example
//!
//! ```ignore
//! let port = TypedSubscriber::<i32>::new(
//!     "db.port",
//!     |port| { println!("port is now {port}"); Ok(()) },
//!     || { println!("port removed"); Ok(()) },
//! );
//! let subscription = Arc::new(Subscription::new("db", vec![Arc::new(port)])?);
//! officer.subscribe(subscription)?;
//! ```

mod selector;
mod subscriber;
mod subscription;
mod view_pool;

pub use selector::PropertySelector;
pub use subscriber::{Subscriber, TypedSubscriber};
pub use subscription::Subscription;
pub use view_pool::ViewPool;
