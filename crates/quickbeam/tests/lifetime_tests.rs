//! Retain, release and autorelease tests

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use quickbeam::*;

fn runtime_with_delay(delay: Duration) -> Runtime {
    Runtime::with_config(RuntimeConfig::with_autorelease_delay(delay))
}

/// Poll `cond` until it holds or `limit` passes.
fn eventually(limit: Duration, cond: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

// ═══════════════════════════════════════════════════════════════════════
// External Count
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_retain_release_pair() {
    let rt = Runtime::new();
    let arr = rt.new_array();
    rt.retain(&arr, None);
    rt.zero_lifetime(&arr);

    assert!(arr.is_alive());
    assert_eq!(arr.external_count(), 1);
    assert_eq!(arr.internal_count(), 0);

    rt.release(&arr);
    assert!(!arr.is_alive());
    assert!(!rt.is_exists(arr.handle()));
}

#[test]
fn test_over_release_is_ignored() {
    let rt = Runtime::new();
    let arr = rt.new_array();
    rt.retain(&arr, None);
    rt.retain(&arr, None);
    for _ in 0..10 {
        rt.release(&arr);
    }

    // The birth claim is still there
    assert!(arr.is_alive());
    assert_eq!(arr.external_count(), 0);
    assert_eq!(arr.internal_count(), 1);
}

#[test]
fn test_edge_keeps_released_object_alive() {
    let rt = Runtime::new();
    let parent = rt.new_map();
    let child = rt.new_array();
    rt.retain(&parent, None);
    parent.set("child", &child);
    rt.zero_lifetime(&child);
    assert!(child.is_alive());
    assert_eq!(child.internal_count(), 1);

    parent.remove("child");
    assert!(!child.is_alive());
}

#[test]
fn test_dead_object_cannot_be_revived() {
    let rt = Runtime::new();
    let arr = rt.new_array();
    rt.zero_lifetime(&arr);
    assert!(!arr.is_alive());

    rt.retain(&arr, None);
    assert_eq!(arr.external_count(), 0);
    assert!(!rt.is_exists(arr.handle()));

    let holder = rt.new_array();
    holder.push(&arr);
    assert_eq!(holder.value_type(0), ValueType::None);
}

// ═══════════════════════════════════════════════════════════════════════
// Autorelease
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_new_object_dies_after_delay() {
    let rt = runtime_with_delay(Duration::from_millis(30));
    let arr = rt.new_array();
    assert!(arr.is_alive());
    assert!(eventually(Duration::from_secs(5), || !arr.is_alive()));
    assert_eq!(rt.object_count(), 0);
}

#[test]
fn test_autorelease_drops_one_retain_later() {
    let rt = runtime_with_delay(Duration::from_millis(30));
    let arr = rt.new_array();
    rt.retain(&arr, None);
    rt.retain(&arr, None);
    rt.autorelease(&arr);
    assert_eq!(arr.external_count(), 2);

    assert!(eventually(Duration::from_secs(5), || arr.external_count() == 1));
    assert!(arr.is_alive());

    rt.autorelease(&arr);
    assert!(eventually(Duration::from_secs(5), || !arr.is_alive()));
}

#[test]
fn test_referenced_object_outlives_its_grace() {
    let rt = runtime_with_delay(Duration::from_millis(30));
    let root = rt.database();
    let child = rt.new_map();
    root.set("child", &child);

    assert!(eventually(Duration::from_secs(5), || rt.pending_autoreleases() == 0));
    assert!(child.is_alive());
    assert!(root.is_alive());
}

#[test]
fn test_dropping_runtime_stops_worker() {
    let rt = runtime_with_delay(Duration::from_secs(60));
    let arr = rt.new_array();
    rt.retain(&arr, Some("owner"));
    let clone = rt.clone();
    drop(rt);
    assert!(arr.is_alive());
    drop(clone);
    assert!(!arr.is_alive());
}

// ═══════════════════════════════════════════════════════════════════════
// Tags, Pools and the Database Root
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_release_objects_with_tag_frees_owner_objects() {
    let rt = Runtime::new();
    let owned: Vec<Arc<Object>> = (0..3).map(|_| rt.new_map()).collect();
    for obj in &owned {
        rt.retain(obj, Some("myMod"));
        rt.zero_lifetime(obj);
    }
    let other = rt.new_map();
    rt.retain(&other, Some("otherMod"));

    assert_eq!(rt.release_objects_with_tag("MYMOD"), 0);
    assert_eq!(rt.release_objects_with_tag("myMod"), 3);
    assert!(owned.iter().all(|obj| !obj.is_alive()));
    assert!(other.is_alive());
}

#[test]
fn test_release_and_retain_swaps_holders() {
    let rt = Runtime::new();
    let first = rt.new_array();
    let held = rt.release_and_retain(None, Some(&first), None);
    assert!(held.is_some_and(|h| Arc::ptr_eq(&h, &first)));
    assert_eq!(first.external_count(), 1);

    let cleared = rt.release_and_retain(Some(&first), None, None);
    assert!(cleared.is_none());
    assert_eq!(first.external_count(), 0);
}

#[test]
fn test_pool_keeps_object_until_cleaned() {
    let rt = runtime_with_delay(Duration::from_secs(60));
    let obj = rt.new_map();
    assert!(rt.add_to_pool(&obj, "frame"));
    assert!(rt.add_to_pool(&obj, "frame"));
    rt.zero_lifetime(&obj);
    assert_eq!(rt.collect_garbage(), 0);
    assert!(obj.is_alive());

    let members = rt.solve_obj(&rt.database(), ".__tempPools.frame");
    assert_eq!(members.map(|m| m.count()), Some(2));

    rt.clean_pool("frame");
    rt.collect_garbage();
    assert!(!obj.is_alive());
}

#[test]
fn test_database_root_survives_collection() {
    let rt = runtime_with_delay(Duration::from_secs(60));
    let db = rt.database();
    rt.zero_lifetime(&db);
    assert_eq!(rt.collect_garbage(), 0);
    assert!(db.is_alive());
    assert!(rt.has_database());

    rt.set_database(None);
    rt.zero_lifetime(&db);
    assert!(!db.is_alive());
}
