//! Concurrency tests: parallel publishers, racing first writers, async receive.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use propagation::{
    ManifestSource, ManifestStatus, Officer, OfficerConfig, OperationStatus, PropertyOperation,
    Publisher, PublisherManifest, Result, Subscriber, SubscriberError, SubscriberResult,
    Subscription, Version, ViewPool,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const PUBLISHERS: usize = 8;
const MANIFESTS_PER_PUBLISHER: u64 = 200;

fn officer() -> Arc<Officer> {
    Arc::new(Officer::with_config("officer", OfficerConfig::default().with_worker_threads(4)).unwrap())
}

#[test]
fn test_parallel_publishers_all_apply() {
    let officer = officer();
    let view = ViewPool::new("view").unwrap();
    officer.subscribe(view.subscription()).unwrap();

    let handles: Vec<_> = (0..PUBLISHERS)
        .map(|p| {
            let officer = Arc::clone(&officer);
            thread::spawn(move || {
                let publisher = Publisher::new(format!("pub-{p}")).unwrap();
                publisher.contract(&officer).unwrap();
                for i in 0..MANIFESTS_PER_PUBLISHER {
                    let results =
                        publisher.publish(vec![PropertyOperation::set(format!("pub-{p}.counter"), i)]);
                    assert_eq!(results[0].status, ManifestStatus::TotalSuccess);
                }
                publisher
            })
        })
        .collect();
    let publishers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(
        officer.processed_manifests(),
        PUBLISHERS as u64 * MANIFESTS_PER_PUBLISHER
    );
    for p in 0..PUBLISHERS {
        let key = format!("pub-{p}.counter");
        assert_eq!(
            view.get_property_value::<i64>(&key),
            Some(MANIFESTS_PER_PUBLISHER as i64 - 1)
        );
        assert_eq!(
            officer.cursor(&format!("pub-{p}")),
            Some(Version(MANIFESTS_PER_PUBLISHER))
        );
    }
    drop(publishers);
}

#[test]
fn test_racing_first_writers_single_owner() {
    for _ in 0..20 {
        let officer = officer();
        let barrier = Arc::new(Barrier::new(PUBLISHERS));

        let handles: Vec<_> = (0..PUBLISHERS)
            .map(|p| {
                let officer = Arc::clone(&officer);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let publisher = Publisher::new(format!("racer-{p}")).unwrap();
                    publisher.contract(&officer).unwrap();
                    barrier.wait();
                    let results = publisher.publish(vec![PropertyOperation::set("contested", p as i64)]);
                    (publisher, results[0].operation_results[0].status)
                })
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = outcomes
            .iter()
            .filter(|(_, status)| *status == OperationStatus::Success)
            .count();
        assert_eq!(winners, 1);
        let losers = outcomes
            .iter()
            .filter(|(_, status)| *status == OperationStatus::PermissionConflict)
            .count();
        assert_eq!(losers, PUBLISHERS - 1);

        let stored = officer.property("contested").unwrap();
        let (winner, _) = outcomes
            .iter()
            .find(|(_, status)| *status == OperationStatus::Success)
            .unwrap();
        assert_eq!(stored.owner, winner.name());
    }
}

#[test]
fn test_publish_async_converges() {
    let officer = officer();
    let publisher = Publisher::new("pub").unwrap();
    publisher.contract(&officer).unwrap();

    let futures: Vec<_> = (0..100)
        .flat_map(|i| publisher.publish_async(vec![PropertyOperation::set("n", i)]))
        .collect();

    let mut applied = 0;
    for future in futures {
        let result = future.wait_timeout(Duration::from_secs(10)).unwrap();
        match result.status {
            ManifestStatus::TotalSuccess => applied += 1,
            // Already applied through a gap pull by another worker.
            ManifestStatus::Skip => {}
            other => panic!("unexpected status {other:?}"),
        }
    }

    assert!(applied >= 1);
    assert_eq!(officer.cursor("pub"), Some(Version(100)));
    assert_eq!(officer.processed_manifests(), 100);
    assert_eq!(officer.property("n").unwrap().value, serde_json::json!(99));
}

#[test]
fn test_async_and_sync_publishers_mix() {
    let officer = officer();
    let a = Publisher::new("async").unwrap();
    let b = Publisher::new("sync").unwrap();
    a.contract(&officer).unwrap();
    b.contract(&officer).unwrap();

    let mut futures = Vec::new();
    for i in 0..50 {
        futures.extend(a.publish_async(vec![PropertyOperation::set("async.n", i)]));
        b.publish(vec![PropertyOperation::set("sync.n", i)]);
    }
    for future in futures {
        future.wait_timeout(Duration::from_secs(10)).unwrap();
    }

    assert_eq!(officer.cursor("async"), Some(Version(50)));
    assert_eq!(officer.cursor("sync"), Some(Version(50)));
    assert_eq!(officer.processed_manifests(), 100);
}

/// On the first value it sees, publishes a newer one from another thread and
/// waits for that publish to return.
struct Interloper {
    publisher: Arc<Publisher>,
    fired: AtomicBool,
}

impl Subscriber for Interloper {
    fn key(&self) -> Option<&str> {
        Some("k")
    }

    fn on_set(&self, _key: &str, _value: &Value) -> SubscriberResult {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let publisher = Arc::clone(&self.publisher);
            thread::spawn(move || publisher.publish(vec![PropertyOperation::set("k", 2)]))
                .join()
                .map_err(|_| SubscriberError::new("publishing thread panicked"))?;
        }
        Ok(())
    }

    fn on_removed(&self, _key: &str) -> SubscriberResult {
        Ok(())
    }
}

/// Remembers the last value delivered for `k`.
#[derive(Default)]
struct LastValue {
    value: Mutex<Option<Value>>,
}

impl Subscriber for LastValue {
    fn key(&self) -> Option<&str> {
        Some("k")
    }

    fn on_set(&self, _key: &str, value: &Value) -> SubscriberResult {
        *self.value.lock() = Some(value.clone());
        Ok(())
    }

    fn on_removed(&self, _key: &str) -> SubscriberResult {
        *self.value.lock() = None;
        Ok(())
    }
}

#[test]
fn test_update_published_during_replay_arrives_after_it() {
    let officer = officer();
    let publisher = Publisher::new("pub").unwrap();
    publisher.contract(&officer).unwrap();
    publisher.publish(vec![PropertyOperation::set("k", 1)]);

    let last = Arc::new(LastValue::default());
    let subscription = Subscription::new(
        "late",
        vec![
            Arc::new(Interloper {
                publisher: Arc::clone(&publisher),
                fired: AtomicBool::new(false),
            }) as Arc<dyn Subscriber>,
            Arc::clone(&last) as Arc<dyn Subscriber>,
        ],
    )
    .unwrap();
    officer.subscribe(Arc::new(subscription)).unwrap();

    assert_eq!(officer.property("k").unwrap().value, json!(2));
    assert_eq!(*last.value.lock(), Some(json!(2)));
}

/// Manifest source whose range pulls wait for a go-ahead.
struct GatedSource {
    name: String,
    manifests: Vec<Arc<PublisherManifest>>,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl ManifestSource for GatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_version(&self) -> Version {
        Version(self.manifests.len() as u64)
    }

    fn pull(&self, version: Version) -> Result<Arc<PublisherManifest>> {
        Ok(Arc::clone(&self.manifests[version.as_index()]))
    }

    fn pull_range(&self, begin: Version, end: Version) -> Result<Vec<Arc<PublisherManifest>>> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        Ok(self.manifests[begin.as_index()..end.as_index()].to_vec())
    }
}

#[test]
fn test_off_publisher_during_catch_up_leaves_nothing_owned() {
    let officer = officer();
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let source = Arc::new(GatedSource {
        name: "p".to_string(),
        manifests: vec![
            Arc::new(PublisherManifest::new("p", Version(0), vec![PropertyOperation::set("a", 1)])),
            Arc::new(PublisherManifest::new("p", Version(1), vec![PropertyOperation::set("b", 2)])),
        ],
        entered: entered_tx,
        release: release_rx,
    });
    let dyn_source: Arc<dyn ManifestSource> = Arc::clone(&source) as Arc<dyn ManifestSource>;
    officer.register_publisher(&dyn_source).unwrap();

    let receiving = {
        let officer = Arc::clone(&officer);
        let manifest = Arc::clone(&source.manifests[1]);
        thread::spawn(move || officer.receive(manifest))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let departing = {
        let officer = Arc::clone(&officer);
        thread::spawn(move || officer.off_publisher("p"))
    };
    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();

    let result = receiving.join().unwrap();
    departing.join().unwrap();

    assert_eq!(result.status, ManifestStatus::TotalSuccess);
    assert!(officer.properties().is_empty());
    assert_eq!(officer.cursor("p"), None);

    let late = officer.receive(Arc::clone(&source.manifests[1]));
    assert_eq!(late.status, ManifestStatus::Error);
    assert!(officer.properties().is_empty());
}
