//! The officer: merges manifests from many publishers into one property store.

use crate::config::OfficerConfig;
use crate::error::{PropagationError, Result};
use crate::publisher::ManifestSource;
use crate::results::{ManifestResult, ManifestStatus, OperationResult, OperationStatus};
use crate::subscriptions::Subscription;
use crate::types::{OfficerStats, PropertyDefinition, PropertyOperation, PublisherManifest, Version};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::pool::{ManifestFuture, WorkerPool};

/// Registration of one publisher at one officer.
struct PublisherEntry {
    source: Weak<dyn ManifestSource>,
    /// Next expected version. Held for the whole of `receive`, which
    /// serializes manifests from the same publisher.
    cursor: Mutex<Version>,
    /// Copy of the cursor readable without the lock.
    next_version: AtomicU64,
    /// Set under the cursor lock once the publisher has departed.
    departed: AtomicBool,
}

impl PublisherEntry {
    fn new(source: Weak<dyn ManifestSource>) -> Self {
        Self {
            source,
            cursor: Mutex::new(Version(0)),
            next_version: AtomicU64::new(0),
            departed: AtomicBool::new(false),
        }
    }
}

/// A registered subscription.
///
/// Until its replay has been delivered, live notifications for it are
/// queued in `backlog` and flushed afterwards, in arrival order.
struct SubscriptionSlot {
    subscription: Arc<Subscription>,
    backlog: Mutex<Option<Vec<PropertyOperation>>>,
}

impl SubscriptionSlot {
    fn replaying(subscription: Arc<Subscription>) -> Self {
        Self {
            subscription,
            backlog: Mutex::new(Some(Vec::new())),
        }
    }

    fn deliver(&self, operations: Vec<PropertyOperation>) {
        {
            let mut backlog = self.backlog.lock();
            if let Some(queued) = backlog.as_mut() {
                queued.extend(operations);
                return;
            }
        }
        self.subscription.dispatch(&operations);
    }

    /// Flush whatever queued up during replay, then switch to direct delivery.
    fn go_live(&self) {
        loop {
            let pending = {
                let mut backlog = self.backlog.lock();
                match backlog.as_mut() {
                    Some(queued) if !queued.is_empty() => std::mem::take(queued),
                    _ => {
                        *backlog = None;
                        return;
                    }
                }
            };
            self.subscription.dispatch(&pending);
        }
    }
}

/// State shared between the officer handle and its workers.
struct OfficerCore {
    name: String,
    closed: AtomicBool,
    publishers: RwLock<HashMap<String, Arc<PublisherEntry>>>,
    /// Merged store. Ownership check and write happen under one write lock.
    properties: RwLock<HashMap<String, PropertyDefinition>>,
    /// Live subscriptions in registration order.
    subscriptions: RwLock<Vec<Arc<SubscriptionSlot>>>,
    processed: AtomicU64,
}

/// Authoritative store for the publishers registered with it.
///
/// Applies each publisher's manifests strictly in version order: stale
/// manifests are skipped, gaps are closed by pulling the missing manifests
/// from the publisher, and a key may only be changed by the publisher that
/// created it. Applied changes are pushed synchronously to matching
/// subscriptions.
pub struct Officer {
    core: Arc<OfficerCore>,
    pool: Mutex<Option<WorkerPool>>,
}

impl Officer {
    /// Create an officer with the default configuration.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_config(name, OfficerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: OfficerConfig) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PropagationError::BlankName);
        }
        let pool = WorkerPool::new(&name, &config)?;
        Ok(Self {
            core: Arc::new(OfficerCore {
                name,
                closed: AtomicBool::new(false),
                publishers: RwLock::new(HashMap::new()),
                properties: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(Vec::new()),
                processed: AtomicU64::new(0),
            }),
            pool: Mutex::new(Some(pool)),
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Register a publisher with its cursor at zero.
    ///
    /// Re-registering the same source keeps its cursor. A different live
    /// source under an already registered name is rejected.
    pub fn register_publisher(&self, source: &Arc<dyn ManifestSource>) -> Result<()> {
        if self.is_closed() {
            return Err(PropagationError::OfficerClosed(self.core.name.clone()));
        }
        let name = source.name().to_string();
        let mut publishers = self.core.publishers.write();
        if let Some(existing) = publishers.get(&name) {
            if Weak::ptr_eq(&existing.source, &Arc::downgrade(source)) {
                return Ok(());
            }
            if existing.source.strong_count() > 0 {
                return Err(PropagationError::PublisherExists(name));
            }
        }
        publishers.insert(
            name.clone(),
            Arc::new(PublisherEntry::new(Arc::downgrade(source))),
        );
        info!(officer = %self.core.name, publisher = %name, "publisher registered");
        Ok(())
    }

    /// Apply a manifest on the calling thread.
    pub fn receive(&self, manifest: Arc<PublisherManifest>) -> ManifestResult {
        self.core.receive(manifest)
    }

    /// Apply a manifest on the officer's worker pool.
    pub fn receive_async(&self, manifest: Arc<PublisherManifest>) -> ManifestFuture {
        if self.is_closed() {
            return ManifestFuture::ready(self.core.closed_result(manifest));
        }

        let (reply, future) = ManifestFuture::channel();
        let core = Arc::clone(&self.core);
        let job_manifest = Arc::clone(&manifest);
        let submitted = match self.pool.lock().as_ref() {
            Some(pool) => pool
                .submit(Box::new(move || {
                    let _ = reply.send(core.receive(job_manifest));
                }))
                .is_ok(),
            None => false,
        };

        if submitted {
            future
        } else {
            ManifestFuture::ready(self.core.closed_result(manifest))
        }
    }

    /// A publisher departed: purge everything it owns and forget its cursor.
    ///
    /// Not version-gated. A receive already running for the publisher
    /// finishes before the purge; any that start later see it departed.
    /// Each purged key reaches matching subscriptions as a removal.
    pub fn off_publisher(&self, publisher: &str) {
        let entry = self.core.publishers.write().remove(publisher);
        if let Some(entry) = entry {
            let _cursor = entry.cursor.lock();
            entry.departed.store(true, Ordering::Release);
        }

        let removed: Vec<PropertyOperation> = {
            let mut properties = self.core.properties.write();
            let mut keys: Vec<String> = properties
                .values()
                .filter(|d| d.owner == publisher)
                .map(|d| d.key.clone())
                .collect();
            keys.sort();
            for key in &keys {
                properties.remove(key);
            }
            keys.into_iter().map(PropertyOperation::remove).collect()
        };

        info!(
            officer = %self.core.name,
            publisher,
            purged = removed.len(),
            "publisher departed"
        );
        self.core.fan_out(&removed);
    }

    /// Register a subscription and replay current matching state to it.
    pub fn subscribe(&self, subscription: Arc<Subscription>) -> Result<()> {
        if self.is_closed() {
            return Err(PropagationError::OfficerClosed(self.core.name.clone()));
        }

        let slot = Arc::new(SubscriptionSlot::replaying(Arc::clone(&subscription)));
        let replay: Vec<PropertyOperation> = {
            let properties = self.core.properties.read();
            let mut subscriptions = self.core.subscriptions.write();
            if subscriptions
                .iter()
                .any(|s| Arc::ptr_eq(&s.subscription, &subscription))
            {
                return Ok(());
            }
            subscriptions.push(Arc::clone(&slot));

            let mut matching: Vec<&PropertyDefinition> = properties
                .values()
                .filter(|d| subscription.selector().matches(&d.key))
                .collect();
            matching.sort_by(|a, b| a.key.cmp(&b.key));
            matching
                .into_iter()
                .map(|d| PropertyOperation::set(d.key.clone(), d.value.clone()))
                .collect()
        };

        info!(
            officer = %self.core.name,
            subscription = %subscription.name(),
            replayed = replay.len(),
            "subscription registered"
        );
        if !replay.is_empty() {
            subscription.dispatch(&replay);
        }
        slot.go_live();
        Ok(())
    }

    /// Deregister a subscription. Returns whether it was registered.
    pub fn unsubscribe(&self, subscription: &Arc<Subscription>) -> bool {
        let mut subscriptions = self.core.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| !Arc::ptr_eq(&s.subscription, subscription));
        let removed = subscriptions.len() != before;
        if removed {
            debug!(
                officer = %self.core.name,
                subscription = %subscription.name(),
                "subscription removed"
            );
        }
        removed
    }

    pub fn property(&self, key: &str) -> Option<PropertyDefinition> {
        self.core.properties.read().get(key).cloned()
    }

    /// Snapshot of all stored definitions, sorted by key.
    pub fn properties(&self) -> Vec<PropertyDefinition> {
        let mut definitions: Vec<PropertyDefinition> =
            self.core.properties.read().values().cloned().collect();
        definitions.sort_by(|a, b| a.key.cmp(&b.key));
        definitions
    }

    /// Next expected version for a registered publisher.
    pub fn cursor(&self, publisher: &str) -> Option<Version> {
        let entry = self.core.publishers.read().get(publisher).cloned()?;
        Some(Version(entry.next_version.load(Ordering::Acquire)))
    }

    /// Manifests applied so far, including ones recovered by catch-up.
    pub fn processed_manifests(&self) -> u64 {
        self.core.processed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> OfficerStats {
        OfficerStats {
            processed_manifests: self.processed_manifests(),
            property_count: self.core.properties.read().len(),
            publisher_count: self.core.publishers.read().len(),
            subscription_count: self.core.subscriptions.read().len(),
        }
    }

    /// Close the officer.
    ///
    /// Every subscription is told the officer went away and is closed; later
    /// manifests are rejected and the worker pool is shut down after its
    /// queue drains.
    pub fn close(&self) {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let subscriptions = std::mem::take(&mut *self.core.subscriptions.write());
        for slot in &subscriptions {
            slot.subscription.off_officer(&self.core.name);
            slot.subscription.close();
        }

        if let Some(mut pool) = self.pool.lock().take() {
            pool.shutdown();
        }
        info!(
            officer = %self.core.name,
            subscriptions = subscriptions.len(),
            "officer closed"
        );
    }
}

impl std::fmt::Debug for Officer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Officer")
            .field("name", &self.core.name)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

impl OfficerCore {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn closed_result(&self, manifest: Arc<PublisherManifest>) -> ManifestResult {
        ManifestResult::bare(&self.name, manifest, ManifestStatus::Error, "officer is closed")
    }

    fn receive(&self, manifest: Arc<PublisherManifest>) -> ManifestResult {
        if self.is_closed() {
            return self.closed_result(manifest);
        }

        let entry = match self.publishers.read().get(&manifest.publisher).cloned() {
            Some(entry) => entry,
            None => {
                warn!(officer = %self.name, publisher = %manifest.publisher, "manifest from unregistered publisher");
                let description = format!("publisher {} is not registered", manifest.publisher);
                return ManifestResult::bare(&self.name, manifest, ManifestStatus::Error, description);
            }
        };

        let mut cursor = entry.cursor.lock();

        if entry.departed.load(Ordering::Acquire) {
            debug!(officer = %self.name, publisher = %manifest.publisher, "manifest from departed publisher");
            let description = format!("publisher {} has departed", manifest.publisher);
            return ManifestResult::bare(&self.name, manifest, ManifestStatus::Error, description);
        }

        if manifest.version < *cursor {
            debug!(
                officer = %self.name,
                publisher = %manifest.publisher,
                version = manifest.version.0,
                cursor = cursor.0,
                "stale manifest skipped"
            );
            let skipped = manifest
                .operations
                .iter()
                .map(|op| {
                    OperationResult::failure(op.clone(), OperationStatus::Skipped, "stale manifest")
                })
                .collect();
            let description = format!("stale manifest {:?}, expecting {:?}", manifest.version, *cursor);
            return ManifestResult::new(&self.name, manifest, skipped, ManifestStatus::Skip, description);
        }

        if manifest.version > *cursor {
            if let Err(description) = self.catch_up(&entry, &mut cursor, &manifest) {
                warn!(
                    officer = %self.name,
                    publisher = %manifest.publisher,
                    version = manifest.version.0,
                    error = %description,
                    "catch-up failed"
                );
                return ManifestResult::bare(&self.name, manifest, ManifestStatus::Error, description);
            }
        }

        let results = self.apply(&entry, &mut cursor, &manifest);
        let status = ManifestStatus::from_operations(&results);
        let failed = results.iter().filter(|r| !r.status.is_success()).count();
        let description = format!(
            "applied {:?} from {}: {} operations, {} failed",
            manifest.version,
            manifest.publisher,
            results.len(),
            failed
        );
        ManifestResult::new(&self.name, manifest, results, status, description)
    }

    /// Pull and apply everything between the cursor and `manifest`.
    fn catch_up(
        &self,
        entry: &PublisherEntry,
        cursor: &mut Version,
        manifest: &PublisherManifest,
    ) -> std::result::Result<(), String> {
        let source = entry
            .source
            .upgrade()
            .ok_or_else(|| format!("publisher {} is gone", manifest.publisher))?;

        debug!(
            officer = %self.name,
            publisher = %manifest.publisher,
            from = cursor.0,
            to = manifest.version.0,
            "version gap, pulling missing manifests"
        );
        let missing = source
            .pull_range(*cursor, manifest.version)
            .map_err(|e| format!("catch-up pull failed: {e}"))?;
        if missing.is_empty() {
            return Err(format!(
                "catch-up pull returned nothing for [{:?}, {:?})",
                *cursor, manifest.version
            ));
        }

        let mut recovered_versions = Vec::with_capacity(missing.len());
        for recovered in missing {
            if recovered.version != *cursor {
                if !recovered_versions.is_empty() {
                    warn!(
                        officer = %self.name,
                        publisher = %manifest.publisher,
                        applied = ?recovered_versions,
                        "catch-up aborted after partial recovery"
                    );
                }
                return Err(format!(
                    "catch-up returned {:?} while expecting {:?}",
                    recovered.version, *cursor
                ));
            }
            self.apply(entry, cursor, &recovered);
            recovered_versions.push(recovered.version);
        }

        if *cursor != manifest.version {
            warn!(
                officer = %self.name,
                publisher = %manifest.publisher,
                applied = ?recovered_versions,
                "catch-up aborted after partial recovery"
            );
            return Err(format!(
                "catch-up stopped at {:?} short of {:?}",
                *cursor, manifest.version
            ));
        }
        Ok(())
    }

    /// Apply a manifest at the cursor, advance the cursor, and notify.
    fn apply(
        &self,
        entry: &PublisherEntry,
        cursor: &mut Version,
        manifest: &PublisherManifest,
    ) -> Vec<OperationResult> {
        let mut notifications = Vec::with_capacity(manifest.operations.len());
        let results: Vec<OperationResult> = manifest
            .operations
            .iter()
            .map(|op| self.apply_operation(&manifest.publisher, op, &mut notifications))
            .collect();

        *cursor = manifest.version.next();
        entry.next_version.store(cursor.0, Ordering::Release);
        self.processed.fetch_add(1, Ordering::AcqRel);
        debug!(
            officer = %self.name,
            publisher = %manifest.publisher,
            version = manifest.version.0,
            changed = notifications.len(),
            "manifest applied"
        );

        self.fan_out(&notifications);
        results
    }

    fn apply_operation(
        &self,
        publisher: &str,
        operation: &PropertyOperation,
        notifications: &mut Vec<PropertyOperation>,
    ) -> OperationResult {
        if operation.key().trim().is_empty() {
            return OperationResult::failure(
                operation.clone(),
                OperationStatus::ValidationError,
                PropagationError::BlankKey.to_string(),
            );
        }

        let mut properties = self.properties.write();
        match operation {
            PropertyOperation::Set { key, value } => {
                match properties.get_mut(key) {
                    Some(existing) if existing.owner != publisher => {
                        return self.conflict(operation, key, &existing.owner, publisher);
                    }
                    Some(existing) => existing.value = value.clone(),
                    None => {
                        properties.insert(
                            key.clone(),
                            PropertyDefinition {
                                key: key.clone(),
                                value: value.clone(),
                                owner: publisher.to_string(),
                            },
                        );
                    }
                }
            }
            PropertyOperation::Remove { key } => {
                let owner = properties.get(key).map(|d| d.owner.clone());
                match owner {
                    None => {
                        return OperationResult::failure(
                            operation.clone(),
                            OperationStatus::KeyNotFound,
                            format!("no property {key}"),
                        );
                    }
                    Some(owner) if owner != publisher => {
                        return self.conflict(operation, key, &owner, publisher);
                    }
                    Some(_) => {
                        properties.remove(key);
                    }
                }
            }
        }

        notifications.push(operation.clone());
        OperationResult::success(operation.clone())
    }

    fn conflict(
        &self,
        operation: &PropertyOperation,
        key: &str,
        owner: &str,
        publisher: &str,
    ) -> OperationResult {
        warn!(officer = %self.name, key, owner, publisher, "ownership conflict");
        OperationResult::failure(
            operation.clone(),
            OperationStatus::PermissionConflict,
            format!("{key} is owned by {owner}"),
        )
    }

    /// Deliver notifications to every matching live subscription.
    fn fan_out(&self, notifications: &[PropertyOperation]) {
        if notifications.is_empty() {
            return;
        }
        let slots = self.subscriptions.read().clone();
        for slot in slots {
            if slot.subscription.is_closed() {
                continue;
            }
            let matching: Vec<PropertyOperation> = notifications
                .iter()
                .filter(|op| slot.subscription.selector().matches(op.key()))
                .cloned()
                .collect();
            if !matching.is_empty() {
                slot.deliver(matching);
            }
        }
    }
}
