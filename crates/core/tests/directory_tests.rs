//! Session directory behaviour: caching, refresh in place and eviction.

mod common;

use common::{node, FakeSelector, RecordingFactory};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::time::Duration;
use svcmesh_core::{SelectOptions, Selector, SessionDirectory};

fn directory(
    selector: &Arc<FakeSelector>,
    factory: &Arc<RecordingFactory>,
) -> Arc<SessionDirectory> {
    let directory = Arc::new(SessionDirectory::new(selector.clone(), factory.clone()));
    selector.set_watcher(directory.eviction_watcher());
    directory
}

#[test]
fn test_resolve_one_is_cached() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    selector.put("chat", node("chat@n1"));
    let directory = directory(&selector, &factory);

    let first = directory.resolve_one("chat", &SelectOptions::default()).unwrap();
    let second = directory.resolve_one("chat", &SelectOptions::default()).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.created_count(), 1);
    assert_eq!(directory.len(), 1);
    assert!(directory.contains("chat@n1"));
}

#[test]
fn test_resolution_refreshes_node_in_place() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    selector.put("chat", node("chat@n1"));
    let directory = directory(&selector, &factory);

    let before = directory.resolve_one("chat", &SelectOptions::default()).unwrap();
    assert_eq!(before.node().meta("zone"), None);

    selector.put("chat", node("chat@n1").with_metadata("zone", "eu"));
    let after = directory.resolve_one("chat", &SelectOptions::default()).unwrap();

    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.node().meta("zone"), Some("eu"));
    assert_eq!(before.node().meta("zone"), Some("eu"));
}

#[test]
fn test_resolve_by_type_materializes_every_node() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    selector.put("chat", node("chat@n1"));
    selector.put("chat", node("chat@n2"));
    let directory = directory(&selector, &factory);

    let sessions = directory.resolve_by_type("chat");
    assert_eq!(sessions.len(), 2);
    assert_eq!(directory.len(), 2);

    let again = directory.resolve_by_type("chat");
    assert_eq!(factory.created_count(), 2);
    assert!(Arc::ptr_eq(&sessions[0], &again[0]));
}

#[test]
fn test_resolve_by_type_unknown_service_is_empty() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    let directory = directory(&selector, &factory);

    assert!(directory.resolve_by_type("missing").is_empty());
    assert!(directory.is_empty());
}

#[test]
fn test_resolve_by_id_falls_back_to_type_scan() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    selector.put("chat", node("chat@n1"));
    selector.put("chat", node("chat@n2"));
    let directory = directory(&selector, &factory);

    let session = directory.resolve_by_id("chat@n2").unwrap();
    assert_eq!(session.node().id, "chat@n2");
    assert_eq!(selector.get_service_calls.load(Ordering::SeqCst), 1);

    // second lookup is served from the cache
    directory.resolve_by_id("chat@n2").unwrap();
    assert_eq!(selector.get_service_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_resolve_by_id_rejects_malformed_ids() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    let directory = directory(&selector, &factory);

    for id in ["chat", "chat@n1@x"] {
        let err = directory.resolve_by_id(id).err().expect("malformed id resolved");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("invalid server id"));
    }
    assert_eq!(selector.get_service_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_evicted_id_is_not_found() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    selector.put("svcA", node("svcA@n1"));
    let directory = directory(&selector, &factory);

    directory.resolve_by_id("svcA@n1").unwrap();
    selector.remove("svcA", "svcA@n1");

    let err = directory.resolve_by_id("svcA@n1").err().expect("evicted node resolved");
    assert!(err.is_not_found());
    assert!(directory.is_empty());
    assert_eq!(factory.released_count(), 1);
}

#[test]
fn test_eviction_is_idempotent() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    selector.put("svcA", node("svcA@n1"));
    let directory = directory(&selector, &factory);

    directory.resolve_by_id("svcA@n1").unwrap();
    let gone = node("svcA@n1");
    directory.evict(&gone);
    directory.evict(&gone);
    selector.notify(&gone);

    let created = factory.created.lock();
    assert_eq!(created[0].release_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_all_empties_cache() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    selector.put("chat", node("chat@n1"));
    selector.put("game", node("game@n1"));
    let directory = directory(&selector, &factory);

    directory.resolve_by_type("chat");
    directory.resolve_by_type("game");
    let mut ids = directory.snapshot();
    ids.sort();
    assert_eq!(ids, vec!["chat@n1".to_string(), "game@n1".to_string()]);

    directory.release_all();
    assert!(directory.is_empty());
    assert_eq!(factory.released_count(), 2);
}

#[test]
fn test_concurrent_first_resolution_creates_one_session() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::slow(Duration::from_millis(20));
    selector.put("chat", node("chat@n1"));
    let directory = directory(&selector, &factory);

    let threads = 8;
    let barrier = Barrier::new(threads);
    let sessions: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    directory.resolve_by_id("chat@n1").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(factory.created_count(), 1);
    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
}

#[test]
fn test_concurrent_resolve_and_evict_on_one_id() {
    let selector = FakeSelector::new();
    let factory = RecordingFactory::new();
    selector.put("svcA", node("svcA@n1"));
    let directory = directory(&selector, &factory);
    let departed = node("svcA@n1");

    let resolvers = 6;
    let evictors = 2;
    let rounds = 400;
    let barrier = Barrier::new(resolvers + evictors);

    std::thread::scope(|scope| {
        for _ in 0..resolvers {
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..rounds {
                    let session = directory.resolve_by_id("svcA@n1").unwrap();
                    assert_eq!(session.node().id, "svcA@n1");
                    assert!(directory.len() <= 1);
                }
            });
        }
        for _ in 0..evictors {
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..rounds {
                    directory.evict(&departed);
                    assert!(directory.len() <= 1);
                }
            });
        }
    });

    // every session ever created is either the single cached one or released
    let created = factory.created_count();
    let released = factory.released_count();
    assert_eq!(created, released + directory.len());
    if let Some(cached) = directory.get("svcA@n1") {
        let live = factory
            .created
            .lock()
            .iter()
            .filter(|s| !s.is_released())
            .count();
        assert_eq!(live, 1);
        assert_eq!(cached.node().id, "svcA@n1");
    }
    let created_sessions = factory.created.lock();
    assert!(created_sessions
        .iter()
        .all(|s| s.release_count.load(Ordering::SeqCst) <= 1));
}
