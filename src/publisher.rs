//! Publishers: versioned manifest logs fanned out to contracted officers.

use crate::error::{PropagationError, Result};
use crate::officer::{ManifestFuture, Officer};
use crate::results::ManifestResult;
use crate::types::{PropertyOperation, PublisherManifest, Version};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Read access to a publisher's manifest history.
///
/// Officers hold sources weakly and pull from them to close version gaps.
pub trait ManifestSource: Send + Sync {
    fn name(&self) -> &str;

    /// The version the next manifest will receive.
    fn current_version(&self) -> Version;

    /// Fetch one manifest; valid for `version < current_version()`.
    fn pull(&self, version: Version) -> Result<Arc<PublisherManifest>>;

    /// Fetch manifests in `[begin, end)`, oldest first.
    fn pull_range(&self, begin: Version, end: Version) -> Result<Vec<Arc<PublisherManifest>>>;
}

/// Owns an append-only manifest log and the officers it publishes to.
///
/// Every published manifest is stored at the index equal to its version, so
/// officers that missed some can pull them back.
///
/// # Example
///
/// ```ignore
/// let officer = Arc::new(Officer::new("officer")?);
/// let publisher = Publisher::new("pub")?;
/// publisher.contract(&officer)?;
///
/// let results = publisher.publish(vec![PropertyOperation::set("db.host", "localhost")]);
/// assert_eq!(results[0].status, ManifestStatus::TotalSuccess);
/// ```
pub struct Publisher {
    name: String,

    /// Handle to ourselves, given to officers as a `ManifestSource`.
    me: Weak<Publisher>,

    /// Manifest log; index == version.
    log: RwLock<Vec<Arc<PublisherManifest>>>,

    /// Version the next manifest receives. Advances only after delivery.
    version: AtomicU64,

    officers: RwLock<Vec<Arc<Officer>>>,

    closed: AtomicBool,

    /// Serializes publish and close.
    write_lock: Mutex<()>,
}

impl Publisher {
    pub fn new(name: impl Into<String>) -> Result<Arc<Self>> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PropagationError::BlankName);
        }
        Ok(Arc::new_cyclic(|me| Self {
            name,
            me: me.clone(),
            log: RwLock::new(Vec::new()),
            version: AtomicU64::new(0),
            officers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_version(&self) -> Version {
        Version(self.version.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn officer_count(&self) -> usize {
        self.officers.read().len()
    }

    /// Start publishing to `officer`. Contracting twice is a no-op.
    pub fn contract(&self, officer: &Arc<Officer>) -> Result<()> {
        if self.is_closed() {
            return Err(PropagationError::PublisherClosed(self.name.clone()));
        }
        let source: Arc<dyn ManifestSource> = self
            .me
            .upgrade()
            .ok_or_else(|| PropagationError::PublisherClosed(self.name.clone()))?;
        officer.register_publisher(&source)?;

        let mut officers = self.officers.write();
        if !officers.iter().any(|o| Arc::ptr_eq(o, officer)) {
            officers.push(Arc::clone(officer));
            info!(publisher = %self.name, officer = %officer.name(), "contracted officer");
        }
        Ok(())
    }

    /// Stop publishing to `officer`. Returns whether it was contracted.
    pub fn uncontract(&self, officer: &Arc<Officer>) -> bool {
        let mut officers = self.officers.write();
        let before = officers.len();
        officers.retain(|o| !Arc::ptr_eq(o, officer));
        let removed = officers.len() != before;
        if removed {
            info!(publisher = %self.name, officer = %officer.name(), "uncontracted officer");
        }
        removed
    }

    /// Publish a batch to every contracted officer and wait for each result.
    ///
    /// Returns one result per officer, in contract order. A closed publisher
    /// returns no results and does not advance its version.
    pub fn publish(&self, operations: Vec<PropertyOperation>) -> Vec<ManifestResult> {
        let _lock = self.write_lock.lock();
        if self.is_closed() {
            return Vec::new();
        }

        let manifest = self.append(operations);
        let officers = self.officers.read().clone();
        let results = officers
            .iter()
            .map(|officer| officer.receive(Arc::clone(&manifest)))
            .collect();

        self.version.fetch_add(1, Ordering::AcqRel);
        results
    }

    /// Like [`publish`](Self::publish), but each officer applies the manifest
    /// on its own worker pool.
    pub fn publish_async(&self, operations: Vec<PropertyOperation>) -> Vec<ManifestFuture> {
        let _lock = self.write_lock.lock();
        if self.is_closed() {
            return Vec::new();
        }

        let manifest = self.append(operations);
        let officers = self.officers.read().clone();
        let futures = officers
            .iter()
            .map(|officer| officer.receive_async(Arc::clone(&manifest)))
            .collect();

        self.version.fetch_add(1, Ordering::AcqRel);
        futures
    }

    pub fn pull(&self, version: Version) -> Result<Arc<PublisherManifest>> {
        let current = self.current_version();
        if version >= current {
            return Err(PropagationError::VersionOutOfRange { version, current });
        }
        self.log
            .read()
            .get(version.as_index())
            .cloned()
            .ok_or(PropagationError::VersionOutOfRange { version, current })
    }

    pub fn pull_range(&self, begin: Version, end: Version) -> Result<Vec<Arc<PublisherManifest>>> {
        let current = self.current_version();
        if begin >= end || end > current {
            return Err(PropagationError::InvalidRange {
                begin,
                end,
                current,
            });
        }
        let log = self.log.read();
        log.get(begin.as_index()..end.as_index())
            .map(<[_]>::to_vec)
            .ok_or(PropagationError::InvalidRange {
                begin,
                end,
                current,
            })
    }

    /// Snapshot of every manifest published so far.
    pub fn manifests(&self) -> Vec<Arc<PublisherManifest>> {
        let current = self.current_version().as_index();
        self.log.read().iter().take(current).cloned().collect()
    }

    /// Close the publisher. Officers purge the properties it owned.
    pub fn close(&self) {
        let _lock = self.write_lock.lock();
        if self.is_closed() {
            return;
        }
        let officers = self.officers.read().clone();
        for officer in &officers {
            officer.off_publisher(&self.name);
        }
        self.closed.store(true, Ordering::Release);
        info!(publisher = %self.name, officers = officers.len(), "publisher closed");
    }

    /// Store a new manifest at the current version.
    fn append(&self, operations: Vec<PropertyOperation>) -> Arc<PublisherManifest> {
        let version = self.current_version();
        let manifest = Arc::new(PublisherManifest::new(self.name.clone(), version, operations));
        self.log.write().push(Arc::clone(&manifest));
        debug!(
            publisher = %self.name,
            version = version.0,
            operations = manifest.operations.len(),
            "manifest built"
        );
        manifest
    }
}

impl ManifestSource for Publisher {
    fn name(&self) -> &str {
        Publisher::name(self)
    }

    fn current_version(&self) -> Version {
        Publisher::current_version(self)
    }

    fn pull(&self, version: Version) -> Result<Arc<PublisherManifest>> {
        Publisher::pull(self, version)
    }

    fn pull_range(&self, begin: Version, end: Version) -> Result<Vec<Arc<PublisherManifest>>> {
        Publisher::pull_range(self, begin, end)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("version", &self.current_version())
            .field("officers", &self.officer_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
