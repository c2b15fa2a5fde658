// tests/feed_filter.rs
//
// Feed filter engine: page filtering, backfill, selection and startup restore


use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use groupfeed::SelectOutcome;
use groupfeed::config::FilterConfig;
use groupfeed::feed::FilterStats;
use groupfeed::store::{CURRENT_GROUP_ID, CURRENT_GROUP_NAME, KeyValueStore, MemoryStore};
use groupfeed::tasks::backfill::BackfillPolicy;

use test_helpers::{
    Harness, MockRelationApi, ObserverEvent, authors, feed_item, feed_page, test_config,
};

fn two_member_group() -> MockRelationApi {
    MockRelationApi::new()
        .with_members(1, "friends", &["10", "20"])
        .with_members(2, "ghosts", &[])
        .with_group(3, "others", 30, 5)
}

// ============================================================================
// Filtering
// ============================================================================

#[tokio::test]
async fn test_keeps_only_member_items_in_order() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    let out = h.engine.on_feed_page(feed_page(&[10, 30, 20], true, "o1")).await;

    assert_eq!(authors(&out), vec!["10", "20"]);
    assert_eq!(out["data"]["has_more"], json!(true));
    assert_eq!(out["data"]["offset"], json!("o1"));
    assert_eq!(out["ttl"], json!(1));
    assert_eq!(
        h.engine.stats().await,
        FilterStats {
            total_seen: 3,
            total_shown: 2
        }
    );
}

#[tokio::test]
async fn test_stats_accumulate_across_pages() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    h.engine.on_feed_page(feed_page(&[10, 30], true, "a")).await;
    h.engine.on_feed_page(feed_page(&[20, 20, 31], true, "b")).await;

    let stats = h.engine.stats().await;
    assert_eq!(stats.total_seen, 5);
    assert_eq!(stats.total_shown, 3);
    assert_eq!(stats.filtered_out(), 2);
    assert!(h.engine.status_line().await.contains("shown 3 item(s), filtered out 2"));
}

#[tokio::test]
async fn test_items_without_author_are_dropped() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    let mut page = feed_page(&[10], true, "a");
    page["data"]["items"]
        .as_array_mut()
        .unwrap()
        .push(json!({"id_str": "ad", "modules": {}}));

    let out = h.engine.on_feed_page(page).await;
    assert_eq!(authors(&out), vec!["10"]);
    assert_eq!(out["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_string_and_numeric_ids_compare_equal() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    let mut page = feed_page(&[], true, "a");
    page["data"]["items"] = json!([
        {"modules": {"module_author": {"mid": "20"}}},
        {"modules": {"module_author": {"mid": 10}}}
    ]);

    let out = h.engine.on_feed_page(page).await;
    assert_eq!(authors(&out), vec!["20", "10"]);
}

#[tokio::test]
async fn test_no_group_passes_page_through() {
    let h = Harness::new(two_member_group());
    h.engine.initialize().await;

    let page = feed_page(&[10, 30], true, "a");
    let out = h.engine.on_feed_page(page.clone()).await;

    assert_eq!(out, page);
    assert_eq!(h.engine.stats().await, FilterStats::default());
}

#[tokio::test]
async fn test_malformed_response_passes_through() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    for raw in [
        json!({"code": -352, "message": "风控校验失败", "data": {"items": [feed_item(30)]}}),
        json!({"code": 0, "data": null}),
        json!({"code": 0, "data": {"has_more": true}}),
        json!("not even an object"),
    ] {
        assert_eq!(h.engine.on_feed_page(raw.clone()).await, raw);
    }
    assert_eq!(h.engine.stats().await, FilterStats::default());
    assert_eq!(h.trigger.fired(), 0);
}

// ============================================================================
// Backfill
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_page_substitutes_placeholder_and_schedules() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    let mids: Vec<i64> = (100..150).collect();
    let out = h.engine.on_feed_page(feed_page(&mids, true, "o")).await;

    let items = out["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0], feed_item(100));

    let state = h.engine.backfill_state().await;
    assert_eq!(state.consecutive_empty, 1);
    assert!(state.loading);
    assert_eq!(h.observer.count(&ObserverEvent::Loading(true)), 1);

    tokio::time::sleep(Duration::from_millis(105)).await;
    assert_eq!(h.trigger.fired(), 0);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.trigger.fired(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_upstream_page_schedules_continuation() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    let out = h.engine.on_feed_page(feed_page(&[], true, "o")).await;

    assert!(out["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(out["data"]["has_more"], json!(true));
    let state = h.engine.backfill_state().await;
    assert_eq!(state.consecutive_empty, 1);
    assert!(state.loading);
    assert_eq!(h.observer.count(&ObserverEvent::Loading(true)), 1);
    assert_eq!(h.engine.stats().await, FilterStats::default());

    tokio::time::sleep(Duration::from_millis(115)).await;
    assert_eq!(h.trigger.fired(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_upstream_page_after_placeholder_keeps_backfilling() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    h.engine.on_feed_page(feed_page(&[30], true, "a")).await;
    let out = h.engine.on_feed_page(feed_page(&[], true, "b")).await;

    assert!(out["data"]["items"].as_array().unwrap().is_empty());
    let state = h.engine.backfill_state().await;
    assert_eq!(state.consecutive_empty, 2);
    assert!(state.loading);
    assert_eq!(h.observer.count(&ObserverEvent::Loading(true)), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.trigger.fired(), 2);

    let out = h.engine.on_feed_page(feed_page(&[10], true, "c")).await;
    assert_eq!(authors(&out), vec!["10"]);
    let state = h.engine.backfill_state().await;
    assert_eq!(state.consecutive_empty, 0);
    assert!(!state.loading);
    assert_eq!(h.observer.count(&ObserverEvent::Loading(false)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_feed_after_placeholder_clears_loading() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    h.engine.on_feed_page(feed_page(&[30], true, "a")).await;
    let out = h.engine.on_feed_page(feed_page(&[31], false, "")).await;

    assert!(authors(&out).is_empty());
    let state = h.engine.backfill_state().await;
    assert!(state.terminal);
    assert!(!state.loading);
    assert_eq!(h.observer.count(&ObserverEvent::Loading(false)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delay_grows_with_consecutive_empty_pages() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    h.engine.on_feed_page(feed_page(&[30], true, "a")).await;
    h.engine.on_feed_page(feed_page(&[31], true, "b")).await;
    h.engine.on_feed_page(feed_page(&[32], true, "c")).await;
    assert_eq!(h.engine.backfill_state().await.consecutive_empty, 3);

    // continuations at 110, 120 and 130ms
    tokio::time::sleep(Duration::from_millis(115)).await;
    assert_eq!(h.trigger.fired(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.trigger.fired(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_match_resets_consecutive_counter() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    h.engine.on_feed_page(feed_page(&[30], true, "a")).await;
    h.engine.on_feed_page(feed_page(&[31], true, "b")).await;
    let out = h.engine.on_feed_page(feed_page(&[31, 10], true, "c")).await;

    assert_eq!(authors(&out), vec!["10"]);
    let state = h.engine.backfill_state().await;
    assert_eq!(state.consecutive_empty, 0);
    assert!(!state.loading);
    assert_eq!(h.observer.count(&ObserverEvent::Loading(false)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_feed_stops_backfill() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    let out = h.engine.on_feed_page(feed_page(&[30, 31], false, "")).await;
    assert!(authors(&out).is_empty());
    assert_eq!(out["data"]["has_more"], json!(false));
    assert!(h.engine.backfill_state().await.terminal);

    // a later empty page in the same session still schedules nothing
    let out = h.engine.on_feed_page(feed_page(&[32], true, "x")).await;
    assert!(authors(&out).is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.trigger.fired(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cap_exhausts_session() {
    let config = FilterConfig {
        backfill: BackfillPolicy {
            max_consecutive: 3,
            ..BackfillPolicy::default()
        },
        ..test_config()
    };
    let h = Harness::build(two_member_group(), Arc::new(MemoryStore::new()), config);
    h.select(1).await;

    for offset in ["a", "b", "c"] {
        let out = h.engine.on_feed_page(feed_page(&[30], true, offset)).await;
        assert_eq!(out["data"]["items"].as_array().unwrap().len(), 1);
    }

    let out = h.engine.on_feed_page(feed_page(&[30], true, "d")).await;
    assert!(out["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(out["data"]["has_more"], json!(false));

    let state = h.engine.backfill_state().await;
    assert!(state.exhausted);
    assert!(!state.loading);
    assert_eq!(h.observer.count(&ObserverEvent::Exhausted), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.trigger.fired(), 3);

    // exhaustion sticks until the session changes
    let out = h.engine.on_feed_page(feed_page(&[31], true, "e")).await;
    assert!(out["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(h.observer.count(&ObserverEvent::Exhausted), 1);

    h.select(1).await;
    assert!(!h.engine.backfill_state().await.exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_continuation_dropped_after_clear() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    h.engine.on_feed_page(feed_page(&[30], true, "a")).await;
    h.engine.clear_filter().await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.trigger.fired(), 0);
    assert!(!h.engine.backfill_state().await.loading);
    assert_eq!(h.observer.count(&ObserverEvent::Loading(false)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_continuation_dropped_after_reselect() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    h.engine.on_feed_page(feed_page(&[30], true, "a")).await;
    h.select(3).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.trigger.fired(), 0);
    assert_eq!(h.engine.backfill_state().await.consecutive_empty, 0);
}

// ============================================================================
// Selection
// ============================================================================

#[tokio::test]
async fn test_select_persists_and_notifies() {
    let h = Harness::new(two_member_group());
    h.engine.initialize().await;

    let outcome = h.engine.select_group(1, "friends").await.unwrap();

    assert_eq!(
        outcome,
        SelectOutcome::Selected {
            members: 2,
            complete: true
        }
    );
    assert_eq!(h.store.get(CURRENT_GROUP_ID), Some(json!(1)));
    assert_eq!(h.store.get(CURRENT_GROUP_NAME), Some(json!("friends")));
    assert_eq!(h.engine.active_group().await.unwrap().name, "friends");
    assert!(h.engine.is_filtering().await);
    assert_eq!(h.observer.count(&ObserverEvent::Group(Some(1))), 1);
}

#[tokio::test]
async fn test_select_always_refetches_members() {
    let h = Harness::new(two_member_group());
    h.select(1).await;
    h.select(1).await;

    assert_eq!(h.api.page_calls(), 2);
}

#[tokio::test]
async fn test_select_resets_stats_and_advances_generation() {
    let h = Harness::new(two_member_group());
    h.select(1).await;
    let first = h.engine.generation();
    h.engine.on_feed_page(feed_page(&[10, 30], true, "a")).await;

    h.select(3).await;

    assert!(h.engine.generation() > first);
    assert_eq!(h.engine.stats().await, FilterStats::default());
    assert_eq!(h.engine.active_group().await.unwrap().id, 3);
}

#[tokio::test]
async fn test_select_empty_group_keeps_previous_session() {
    let h = Harness::new(two_member_group());
    h.select(1).await;
    let generation = h.engine.generation();

    let outcome = h.engine.select_group(2, "ghosts").await.unwrap();

    assert_eq!(outcome, SelectOutcome::Empty);
    assert_eq!(h.engine.active_group().await.unwrap().id, 1);
    assert_eq!(h.engine.generation(), generation);
    assert_eq!(h.store.get(CURRENT_GROUP_ID), Some(json!(1)));
}

#[tokio::test]
async fn test_select_with_partial_members_still_activates() {
    let h = Harness::new(MockRelationApi::new().with_group(5, "big", 1, 120));
    h.api.fail_page(5, 3);
    h.engine.initialize().await;

    let outcome = h.engine.select_group(5, "big").await.unwrap();

    assert_eq!(
        outcome,
        SelectOutcome::Selected {
            members: 100,
            complete: false
        }
    );
    assert!(h.engine.is_filtering().await);
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_select_supersedes_it() {
    let h = Harness::new(two_member_group().with_delay(Duration::from_millis(200)));
    h.engine.initialize().await;

    let engine = h.engine.clone();
    let select = tokio::spawn(async move { engine.select_group(1, "friends").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.engine.clear_filter().await.unwrap();

    assert_eq!(select.await.unwrap().unwrap(), SelectOutcome::Superseded);
    assert!(h.engine.active_group().await.is_none());
    assert!(h.store.get(CURRENT_GROUP_ID).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_later_select_wins() {
    let h = Harness::new(two_member_group().with_delay(Duration::from_millis(200)));
    h.engine.initialize().await;

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.select_group(1, "friends").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let outcome = h.engine.select_group(3, "others").await.unwrap();

    assert!(matches!(outcome, SelectOutcome::Selected { members: 5, .. }));
    assert_eq!(first.await.unwrap().unwrap(), SelectOutcome::Superseded);
    assert_eq!(h.engine.active_group().await.unwrap().id, 3);
    assert_eq!(h.store.get(CURRENT_GROUP_ID), Some(json!(3)));
}

#[tokio::test]
async fn test_clear_restores_pass_through() {
    let h = Harness::new(two_member_group());
    h.select(1).await;
    h.engine.on_feed_page(feed_page(&[10, 30], true, "a")).await;

    h.engine.clear_filter().await.unwrap();

    let page = feed_page(&[10, 30], true, "b");
    assert_eq!(h.engine.on_feed_page(page.clone()).await, page);
    assert_eq!(h.engine.stats().await, FilterStats::default());
    assert!(h.engine.active_group().await.is_none());
    assert!(h.store.get(CURRENT_GROUP_ID).is_none());
    assert!(h.store.get(CURRENT_GROUP_NAME).is_none());
    assert_eq!(h.observer.events().last(), Some(&ObserverEvent::Group(None)));
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn test_initialize_restores_saved_group() {
    let store = Arc::new(MemoryStore::new());
    store.set(CURRENT_GROUP_ID, json!(1)).unwrap();
    store.set(CURRENT_GROUP_NAME, json!("friends")).unwrap();
    let h = Harness::build(two_member_group(), store, test_config());

    assert!(!h.engine.is_ready());
    h.engine.initialize().await;

    assert!(h.engine.is_ready());
    let group = h.engine.active_group().await.unwrap();
    assert_eq!(group.id, 1);
    assert_eq!(group.name, "friends");
    let out = h.engine.on_feed_page(feed_page(&[30, 20], true, "a")).await;
    assert_eq!(authors(&out), vec!["20"]);
}

#[tokio::test]
async fn test_initialize_drops_saved_group_without_members() {
    let store = Arc::new(MemoryStore::new());
    store.set(CURRENT_GROUP_ID, json!(2)).unwrap();
    store.set(CURRENT_GROUP_NAME, json!("ghosts")).unwrap();
    let h = Harness::build(two_member_group(), store, test_config());

    h.engine.initialize().await;

    assert!(h.engine.is_ready());
    assert!(h.engine.active_group().await.is_none());
    assert!(h.store.get(CURRENT_GROUP_ID).is_none());
    assert!(h.store.get(CURRENT_GROUP_NAME).is_none());
}

#[tokio::test]
async fn test_initialize_runs_once() {
    let store = Arc::new(MemoryStore::new());
    store.set(CURRENT_GROUP_ID, json!(1)).unwrap();
    let h = Harness::build(two_member_group(), store, test_config());

    h.engine.initialize().await;
    h.engine.initialize().await;

    assert_eq!(h.api.page_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pages_wait_for_initialization() {
    let store = Arc::new(MemoryStore::new());
    store.set(CURRENT_GROUP_ID, json!(1)).unwrap();
    let h = Harness::build(
        two_member_group().with_delay(Duration::from_millis(300)),
        store,
        test_config(),
    );

    let engine = h.engine.clone();
    let page = tokio::spawn(async move { engine.on_feed_page(feed_page(&[10, 30], true, "a")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!page.is_finished());

    let init = h.engine.spawn_initialize();
    let out = page.await.unwrap();
    init.await.unwrap();

    // judged against the restored group, not passed through
    assert_eq!(authors(&out), vec!["10"]);
}

#[tokio::test(start_paused = true)]
async fn test_pages_are_handled_in_arrival_order() {
    let h = Harness::new(two_member_group());
    h.select(1).await;

    let mut handles = Vec::new();
    for n in 0..4 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.on_feed_page(feed_page(&[30 + n], true, "x")).await
        }));
        tokio::task::yield_now().await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let state = h.engine.backfill_state().await;
    assert_eq!(state.consecutive_empty, 4);
    assert_eq!(h.engine.stats().await.total_seen, 4);
}
