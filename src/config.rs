//! Officer configuration.

use serde::Deserialize;

/// Officer configuration.
///
/// Deserializable so an embedding application can load it alongside its own
/// settings; every field falls back to its default when missing.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OfficerConfig {
    /// Threads serving `receive_async`. Zero is treated as one.
    /// Default: 4
    pub worker_threads: usize,

    /// Prefix for worker thread names (`<prefix>-<officer>-<n>`).
    /// Default: "officer"
    pub thread_name_prefix: String,
}

impl Default for OfficerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            thread_name_prefix: "officer".to_string(),
        }
    }
}

impl OfficerConfig {
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub(crate) fn effective_worker_threads(&self) -> usize {
        self.worker_threads.max(1)
    }
}
