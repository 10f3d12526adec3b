//! Error types for property propagation.

use crate::types::Version;
use thiserror::Error;

/// Main error type for publisher and officer operations.
///
/// Expected domain outcomes (ownership conflicts, stale or gapped manifests)
/// are never reported through this type; they travel inside
/// [`ManifestResult`](crate::ManifestResult) values instead.
#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("Name must not be blank")]
    BlankName,

    #[error("Property key must not be blank")]
    BlankKey,

    #[error("Publisher is closed: {0}")]
    PublisherClosed(String),

    #[error("Officer is closed: {0}")]
    OfficerClosed(String),

    #[error("Publisher already registered: {0}")]
    PublisherExists(String),

    #[error("Version {version:?} out of range (current is {current:?})")]
    VersionOutOfRange { version: Version, current: Version },

    #[error("Invalid version range [{begin:?}, {end:?}) (current is {current:?})")]
    InvalidRange {
        begin: Version,
        end: Version,
        current: Version,
    },

    #[error("Worker pool unavailable: {0}")]
    PoolUnavailable(String),
}

/// Error returned by a subscriber callback.
///
/// Dispatch logs and swallows these; they never reach the publisher.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        SubscriberError(message.into())
    }
}

/// Result type for propagation operations.
pub type Result<T> = std::result::Result<T, PropagationError>;

/// Result type for subscriber callbacks.
pub type SubscriberResult = std::result::Result<(), SubscriberError>;
