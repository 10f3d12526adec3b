//! Core types for property propagation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Position in a publisher's manifest log.
///
/// Versions are zero-based and assigned once; the officer's cursor for a
/// publisher is also expressed as the next expected `Version`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Version(pub u64);

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Version {
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }

    /// Index into a publisher's manifest log.
    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A single mutation carried by a manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PropertyOperation {
    /// Create or overwrite a key.
    Set { key: String, value: Value },

    /// Delete a key.
    Remove { key: String },
}

impl PropertyOperation {
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        PropertyOperation::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        PropertyOperation::Remove { key: key.into() }
    }

    /// The key this operation targets.
    pub fn key(&self) -> &str {
        match self {
            PropertyOperation::Set { key, .. } | PropertyOperation::Remove { key } => key,
        }
    }
}

/// An immutable, versioned batch of operations from one publisher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublisherManifest {
    /// Name of the publisher that produced this batch.
    pub publisher: String,

    /// Position in the publisher's log.
    pub version: Version,

    /// Operations, applied in list order.
    pub operations: Vec<PropertyOperation>,

    /// When the manifest was built.
    pub timestamp: Timestamp,
}

impl PublisherManifest {
    pub fn new(
        publisher: impl Into<String>,
        version: Version,
        operations: Vec<PropertyOperation>,
    ) -> Self {
        Self {
            publisher: publisher.into(),
            version,
            operations,
            timestamp: Timestamp::now(),
        }
    }
}

/// A stored property together with the publisher that owns it.
///
/// The owner is fixed for the lifetime of the key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub key: String,
    pub value: Value,
    pub owner: String,
}

/// Officer statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OfficerStats {
    pub processed_manifests: u64,
    pub property_count: usize,
    pub publisher_count: usize,
    pub subscription_count: usize,
}
