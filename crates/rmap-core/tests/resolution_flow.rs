//! Strategy ordering, short-circuiting and the end-to-end miss/guess paths.

mod common;

use std::sync::Arc;

use common::{config, Harness};
use rmap_core::{ResolutionResult, StatusLabel, Strategy};
use rmap_state::{IndexDocument, KeyValueStore, SystemMetadata};

// ===========================================================================
// Index
// ===========================================================================

#[tokio::test]
async fn index_hit_short_circuits_every_other_strategy() {
    let h = Harness::new();
    h.index
        .insert(IndexDocument::new("obj.1").with_resource_map("rm.1"));

    let result = h.resolver.resolve("obj.1").await;

    assert_eq!(result, ResolutionResult::found("obj.1", "rm.1"));
    assert!(h.storage.reads().is_empty());
    assert!(h.sysmeta.fetches().is_empty());
    assert!(h.fetcher.fetches().is_empty());
    assert_eq!(
        h.storage.writes(),
        vec![("obj.1".to_string(), "rm.1".to_string())]
    );
    assert_eq!(h.labels("obj.1"), vec![StatusLabel::FoundInIndex]);
}

#[tokio::test]
async fn several_versions_of_one_map_resolve_to_the_current_one() {
    let h = Harness::new();
    h.index.insert(
        IndexDocument::new("obj.1")
            .with_resource_map("rm.v1")
            .with_resource_map("rm.v2"),
    );
    h.sysmeta.insert_chain(&["rm.v1", "rm.v2"]);

    let result = h.resolver.resolve("obj.1").await;

    assert_eq!(result, ResolutionResult::found("obj.1", "rm.v2"));
    assert_eq!(h.labels("obj.1"), vec![StatusLabel::MultiRmMatch]);
}

#[tokio::test]
async fn unrelated_maps_fall_through_and_flag_the_failure() {
    let h = Harness::new();
    h.index.insert(
        IndexDocument::new("obj.1")
            .with_resource_map("rm.a")
            .with_resource_map("rm.b"),
    );
    h.sysmeta.insert(SystemMetadata::new("rm.a"));
    h.sysmeta.insert(SystemMetadata::new("rm.b"));

    let result = h.resolver.resolve("obj.1").await;

    assert!(!result.success);
    assert!(result.multiple_rms);
    let log = h.resolver.get_log("obj.1").unwrap();
    assert!(rmap_core::ResourceMapResolver::check_log_for_multiple_rms(&log));
    let last = log.entries.back().unwrap();
    assert_eq!(last.label, StatusLabel::AllMiss);
    assert_eq!(last.meta["multi_rm"]["not_versions"], true);
}

// ===========================================================================
// Cache
// ===========================================================================

#[tokio::test]
async fn verified_cache_hit_is_a_storage_match() {
    let h = Harness::new();
    h.storage.seed("obj.1", "rm.cached");
    h.map("rm.cached", &["obj.1", "obj.2"]);

    let result = h.resolver.resolve("obj.1").await;

    assert_eq!(result, ResolutionResult::found("obj.1", "rm.cached"));
    assert!(h.sysmeta.fetches().is_empty());
    assert_eq!(
        h.labels("obj.1"),
        vec![StatusLabel::FoundAndValid, StatusLabel::StorageMatch]
    );
}

#[tokio::test]
async fn stale_cache_entry_falls_through_without_eviction() {
    let h = Harness::new();
    h.storage.seed("obj.1", "rm.stale");
    h.map("rm.stale", &["someone.else"]);

    let result = h.resolver.resolve("obj.1").await;

    assert!(!result.success);
    assert_eq!(
        h.storage.get_item("obj.1").await.unwrap().as_deref(),
        Some("rm.stale")
    );
    let labels = h.labels("obj.1");
    assert_eq!(labels.first(), Some(&StatusLabel::FoundButNotValid));
    assert_eq!(labels.last(), Some(&StatusLabel::AllMiss));
}

#[tokio::test]
async fn second_resolution_takes_the_warm_cache_path() {
    let h = Harness::new();
    h.map("resource_map_obj.1", &["obj.1"]);

    let first = h.resolver.resolve("obj.1").await;
    let fetches_after_first = h.fetcher.fetches().len();
    let second = h.resolver.resolve("obj.1").await;

    assert_eq!(first, second);
    assert_eq!(h.labels("obj.1").last(), Some(&StatusLabel::StorageMatch));
    // one verification of the cached map, no new guess
    assert_eq!(h.fetcher.fetches().len(), fetches_after_first + 1);
}

// ===========================================================================
// Revision walk
// ===========================================================================

#[tokio::test]
async fn previous_revision_in_index_leads_to_current_map() {
    let h = Harness::new();
    h.sysmeta.insert_chain(&["obj.v1", "obj.v2"]);
    h.sysmeta.insert_chain(&["rm.v1", "rm.v2"]);
    h.index
        .insert(IndexDocument::new("obj.v1").with_resource_map("rm.v1"));
    h.map("rm.v2", &["obj.v2"]);

    let result = h.resolver.resolve("obj.v2").await;

    assert_eq!(result, ResolutionResult::found("obj.v2", "rm.v2"));
    assert_eq!(
        h.labels("obj.v2"),
        vec![StatusLabel::FoundAndValid, StatusLabel::SysmetaMatch]
    );
    assert!(!h.fetcher.fetches().contains(&"resource_map_obj.v2".to_string()));
}

#[tokio::test]
async fn unauthorized_sysmeta_stops_resolution() {
    let h = Harness::new();
    h.sysmeta.insert(SystemMetadata::new("obj.1"));
    h.sysmeta.deny("obj.1");
    h.map("resource_map_obj.1", &["obj.1"]);

    let result = h.resolver.resolve("obj.1").await;

    assert!(!result.success);
    assert!(result.unauthorized);
    assert!(h.fetcher.fetches().is_empty(), "guess must not run");
    assert_eq!(h.labels("obj.1"), vec![StatusLabel::Unauthorized]);
}

// ===========================================================================
// Guess and end-to-end
// ===========================================================================

#[tokio::test]
async fn guess_succeeds_after_every_other_miss() {
    let h = Harness::new();
    h.map("resource_map_objPid", &["objPid"]);

    let result = h.resolver.resolve("objPid").await;

    assert_eq!(result, ResolutionResult::found("objPid", "resource_map_objPid"));
    assert_eq!(h.fetcher.fetches(), vec!["resource_map_objPid"]);
    assert_eq!(
        h.storage.get_item("objPid").await.unwrap().as_deref(),
        Some("resource_map_objPid")
    );
}

#[tokio::test]
async fn total_miss_writes_nothing() {
    let h = Harness::new();

    let result = h.resolver.resolve("objPid").await;

    assert_eq!(result, ResolutionResult::missing("objPid"));
    assert!(h.storage.writes().is_empty());
    let log = h.resolver.get_log("objPid").unwrap();
    let last = log.entries.back().unwrap();
    assert_eq!(last.label, StatusLabel::AllMiss);
    assert_eq!(last.meta["guessed_pid"], "resource_map_objPid");
}

#[tokio::test]
async fn guess_pid_verifies_exactly_the_candidate() {
    let h = Harness::new();
    assert_eq!(h.resolver.guess_pid("obj.9").await, None);
    assert_eq!(h.fetcher.fetches(), vec!["resource_map_obj.9"]);

    h.map("resource_map_obj.9", &["obj.9"]);
    assert_eq!(
        h.resolver.guess_pid("obj.9").await.as_deref(),
        Some("resource_map_obj.9")
    );
}

#[tokio::test]
async fn failed_fetch_is_a_verification_failure() {
    let h = Harness::new();
    h.fetcher.set_status("resource_map_obj.1", 500);

    let result = h.resolver.resolve("obj.1").await;

    assert!(!result.success);
    assert_eq!(
        h.labels("obj.1"),
        vec![StatusLabel::RmFetchError, StatusLabel::AllMiss]
    );
}

// ===========================================================================
// Configuration
// ===========================================================================

#[tokio::test]
async fn strategy_order_is_configurable() {
    let h = Harness::with_config(config().with_strategies(vec![Strategy::Guess]));
    h.index
        .insert(IndexDocument::new("obj.1").with_resource_map("rm.1"));
    h.map("resource_map_obj.1", &["obj.1"]);

    let result = h.resolver.resolve("obj.1").await;

    assert_eq!(result.rm.as_deref(), Some("resource_map_obj.1"));
    assert!(h.index.queries().is_empty());
    assert!(h.storage.reads().is_empty());
}

#[tokio::test]
async fn concurrent_resolutions_share_the_cache() {
    let h = Harness::new();
    for i in 0..8 {
        h.map(&format!("resource_map_obj.{i}"), &[format!("obj.{i}").as_str()]);
    }
    let storage = h.storage.clone();
    let resolver = Arc::new(h.resolver);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve(&format!("obj.{i}")).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert!(result.success);
        assert_eq!(result.pid, format!("obj.{i}"));
    }
    assert_eq!(storage.len(), 8);
}
