//! `status()` side effects, notifications, the event log and counters.

mod common;

use std::sync::Arc;

use common::{config, Harness};
use rmap_core::{
    ConsoleLevel, EventLog, ResolutionResult, ResourceMapResolver, StatusLabel, METRICS,
};
use rmap_state::fakes::{
    MemoryIndex, MemoryKeyValueStore, MemoryResourceMapFetcher, MemorySysmetaSource,
};
use rmap_state::{IndexDocument, KeyValueStore};
use serde_json::{json, Value};

// ===========================================================================
// status()
// ===========================================================================

#[tokio::test]
async fn status_with_rm_writes_once_and_notifies_twice() {
    let h = Harness::new();
    let mut all = h.resolver.subscribe();
    let mut scoped = h.resolver.subscribe_pid("obj.1");

    let result = h
        .resolver
        .status("obj.1", StatusLabel::GuessMatch, Some("rm.1"), Value::Null)
        .await;

    assert_eq!(result, ResolutionResult::found("obj.1", "rm.1"));
    assert_eq!(h.storage.writes().len(), 1);

    let event = all.try_recv().unwrap();
    assert_eq!(event.pid, "obj.1");
    assert_eq!(event.label, StatusLabel::GuessMatch);
    assert!(all.try_recv().is_err());
    assert_eq!(scoped.try_recv().unwrap().rm.as_deref(), Some("rm.1"));
    assert!(scoped.try_recv().is_err());
}

#[tokio::test]
async fn status_without_rm_never_writes() {
    let h = Harness::new();
    let result = h
        .resolver
        .status("obj.1", StatusLabel::AllMiss, None, Value::Null)
        .await;
    assert!(!result.success);
    assert!(result.rm.is_none());
    assert!(h.storage.writes().is_empty());
}

#[tokio::test]
async fn scoped_subscriber_sees_only_its_pid_during_resolution() {
    let h = Harness::new();
    h.index
        .insert(IndexDocument::new("obj.1").with_resource_map("rm.1"));
    h.index
        .insert(IndexDocument::new("obj.2").with_resource_map("rm.2"));
    let mut scoped = h.resolver.subscribe_pid("obj.2");
    let mut all = h.resolver.subscribe();

    h.resolver.resolve("obj.1").await;
    h.resolver.resolve("obj.2").await;

    assert_eq!(scoped.try_recv().unwrap().pid, "obj.2");
    assert!(scoped.try_recv().is_err());
    assert_eq!(all.try_recv().unwrap().pid, "obj.1");
    assert_eq!(all.try_recv().unwrap().pid, "obj.2");
}

// ===========================================================================
// Storage maintenance
// ===========================================================================

#[tokio::test]
async fn full_store_is_cleared_and_association_kept() {
    let h = Harness::build(
        config(),
        MemoryIndex::new(),
        MemoryKeyValueStore::with_quota(2),
        MemorySysmetaSource::new(),
        MemoryResourceMapFetcher::new(),
    );
    h.storage.seed("old.1", "rm.old");
    h.storage.seed("old.2", "rm.old");
    h.index
        .insert(IndexDocument::new("obj.new").with_resource_map("rm.new"));

    let result = h.resolver.resolve("obj.new").await;

    assert!(result.success);
    assert_eq!(h.storage.len(), 1);
    assert_eq!(
        h.resolver.check_storage("obj.new").await.rm.as_deref(),
        Some("rm.new")
    );
}

#[tokio::test]
async fn clear_storage_forgets_everything() {
    let h = Harness::new();
    h.storage.seed("obj.1", "rm.1");
    h.resolver.clear_storage().await;
    assert!(h.storage.get_item("obj.1").await.unwrap().is_none());
    assert!(h.resolver.check_storage("obj.1").await.rm.is_none());
}

// ===========================================================================
// Event log
// ===========================================================================

#[tokio::test]
async fn log_is_bounded_per_pid() {
    let h = Harness::with_config(config().with_log_capacity(3, 10));
    for _ in 0..5 {
        h.resolver
            .status("obj.1", StatusLabel::RmFetchError, None, json!({"error": 404}))
            .await;
    }
    h.resolver
        .status("obj.1", StatusLabel::AllMiss, None, Value::Null)
        .await;

    let log = h.resolver.get_log("obj.1").unwrap();
    assert_eq!(log.entries.len(), 3);
    assert_eq!(log.entries.back().unwrap().label, StatusLabel::AllMiss);
}

#[tokio::test]
async fn event_log_can_be_shared_between_resolvers() {
    let log = Arc::new(EventLog::new(10, 10, ConsoleLevel::Off));
    let build = || {
        let index = MemoryIndex::new();
        index.insert(IndexDocument::new("obj.1").with_resource_map("rm.1"));
        ResourceMapResolver::builder(config())
            .index(Arc::new(index))
            .storage(Arc::new(MemoryKeyValueStore::new()))
            .sysmeta(Arc::new(MemorySysmetaSource::new()))
            .fetcher(Arc::new(MemoryResourceMapFetcher::new()))
            .event_log(log.clone())
            .build()
            .unwrap()
    };

    build().resolve("obj.1").await;
    build().resolve("obj.1").await;

    assert_eq!(log.get_log("obj.1").unwrap().entries.len(), 2);
}

#[tokio::test]
async fn unauthorized_is_visible_in_the_log() {
    let h = Harness::new();
    h.resolver
        .status(
            "obj.1",
            StatusLabel::AllMiss,
            None,
            json!({"sysmeta": {"unauthorized": true}}),
        )
        .await;
    let log = h.resolver.get_log("obj.1").unwrap();
    assert!(ResourceMapResolver::check_log_for_unauth(&log));
    assert!(!ResourceMapResolver::check_log_for_multiple_rms(&log));
}

// ===========================================================================
// Counters
// ===========================================================================

#[tokio::test]
async fn resolutions_are_counted() {
    let h = Harness::new();
    let before = METRICS.resolutions();
    h.resolver.resolve("obj.1").await;
    // other tests in this binary may run concurrently
    assert!(METRICS.resolutions() > before);
    assert!(METRICS.verifications() >= 1);
    METRICS.flush();
}
