//! Array and map behaviour tests

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use quickbeam::*;

// ═══════════════════════════════════════════════════════════════════════
// Arrays
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_sort_mixed_numbers() {
    let rt = Runtime::new();
    let arr = rt.array_from_values([Value::Int(100), Value::Float(2.0)]);
    arr.sort();
    assert_eq!(arr.value_type(0), ValueType::Float);
    assert_eq!(arr.value_type(1), ValueType::Int);
    assert_eq!(arr.get_int(1, 0), 100);
}

#[test]
fn test_sort_orders_kinds() {
    let rt = Runtime::new();
    let child = rt.new_map();
    let arr = rt.array_from_values([
        Value::string("b"),
        Value::object(&child),
        Value::Form(FormId(7)),
        Value::Int(3),
        Value::None,
        Value::string("a"),
    ]);
    arr.sort();
    let kinds: Vec<ValueType> = arr.items().iter().map(Value::value_type).collect();
    assert_eq!(
        kinds,
        vec![
            ValueType::None,
            ValueType::Int,
            ValueType::Form,
            ValueType::Object,
            ValueType::String,
            ValueType::String,
        ]
    );
    assert_eq!(arr.get_str(4, ""), "a");
}

#[test]
fn test_unique_is_idempotent() {
    let rt = Runtime::new();
    let arr = rt.array_from_values([
        Value::Int(3),
        Value::string("x"),
        Value::Int(1),
        Value::Int(3),
        Value::string("x"),
        Value::None,
    ]);
    arr.unique();
    let once = arr.items();
    assert_eq!(
        once,
        vec![Value::None, Value::Int(1), Value::Int(3), Value::string("x")]
    );
    arr.unique();
    assert_eq!(arr.items(), once);
}

#[test]
fn test_unique_near_float_precision_limit() {
    let rt = Runtime::new();
    let arr = rt.array_from_values([
        Value::Int(16_777_217),
        Value::Float(16_777_216.0),
        Value::Int(16_777_216),
    ]);
    arr.unique();
    assert_eq!(arr.count(), 2);
    assert_eq!(arr.value_type(0), ValueType::Float);
    assert_eq!(arr.get_int(1, 0), 16_777_217);

    let reversed = rt.array_from_values([
        Value::Int(16_777_216),
        Value::Float(16_777_216.0),
        Value::Int(16_777_217),
    ]);
    reversed.unique();
    assert_eq!(reversed.items(), vec![Value::Int(16_777_216), Value::Int(16_777_217)]);
}

#[test]
fn test_negative_indices() {
    let rt = Runtime::new();
    let arr = rt.array_from_values([1, 2, 3]);
    assert_eq!(arr.get_int(-1, 0), 3);
    assert_eq!(arr.get_int(-3, 0), 1);
    assert_eq!(arr.get_int(-4, 99), 99);
    assert_eq!(arr.get_int(3, 99), 99);

    assert!(arr.insert(0, -1));
    assert_eq!(arr.get_int(-1, 99), 0);
    assert!(arr.insert(9, 0));
    assert_eq!(
        arr.items(),
        vec![Value::Int(9), Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(0)]
    );
    assert!(!arr.insert(5, 10));
}

#[test]
fn test_set_only_replaces_existing_items() {
    let rt = Runtime::new();
    let arr = rt.array_from_values([1]);
    assert!(arr.set(0, "one"));
    assert!(!arr.set(1, "two"));
    assert_eq!(arr.count(), 1);
    assert_eq!(arr.get_str(0, ""), "one");
}

#[test]
fn test_find_erase_and_swap() {
    let rt = Runtime::new();
    let arr = rt.array_from_values([5, 6, 5, 7]);
    assert_eq!(arr.find(5, 0), 0);
    assert_eq!(arr.find(5, 1), 2);
    assert_eq!(arr.find(5, -2), 2);
    assert_eq!(arr.find(6, -3), 1);
    assert_eq!(arr.find(8, 0), -1);

    assert!(arr.swap_items(0, -1));
    assert_eq!(arr.get_int(0, 0), 7);

    assert!(!arr.erase_range(2, 1));
    assert!(arr.erase_range(1, 2));
    assert_eq!(arr.items(), vec![Value::Int(7), Value::Int(5)]);

    assert!(arr.remove(-1));
    assert!(!arr.remove(4));
    assert_eq!(arr.count(), 1);
}

#[test]
fn test_add_from_array() {
    let rt = Runtime::new();
    let target = rt.array_from_values([1, 4]);
    let source = rt.array_from_values([2, 3]);
    assert!(target.add_from_array(&source, 1));
    assert_eq!(
        target.items(),
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
    );
    assert!(!target.add_from_array(&target, -1));
    assert!(!target.add_from_array(&rt.new_map(), -1));
    assert_eq!(target.count(), 4);
}

// ═══════════════════════════════════════════════════════════════════════
// Maps
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_string_keys_are_case_insensitive() {
    let rt = Runtime::new();
    let map = rt.new_map();
    map.set("ACDC", 1);
    assert_eq!(map.get_int("acdc", 0), 1);
    assert!(map.has_key("AcDc"));

    map.set("acdc", 2);
    assert_eq!(map.count(), 1);
    assert_eq!(map.get_int("ACDC", 0), 2);
    assert_eq!(map.all_keys(), vec![Value::string("ACDC")]);

    assert!(map.remove("aCdC"));
    assert!(map.is_empty());
}

#[test]
fn test_next_key_iteration() {
    let rt = Runtime::new();
    let map = rt.new_map();
    for key in ["one", "two", "three"] {
        map.set(key, key);
    }
    let mut keys = Vec::new();
    let mut current = map.next_key(None);
    while let Some(key) = current {
        let text = key.as_str().map(str::to_owned).unwrap_or_default();
        current = map.next_key(Some(Key::Str(&text)));
        keys.push(text);
    }
    assert_eq!(keys, vec!["one", "two", "three"]);

    let ints = rt.new_int_map();
    ints.set(10, 1);
    ints.set(-5, 1);
    assert_eq!(ints.next_key(None), Some(Value::Int(-5)));
    assert_eq!(ints.next_key(Some(Key::Int(-5))), Some(Value::Int(10)));
    assert_eq!(ints.next_key(Some(Key::Int(10))), None);
}

#[test]
fn test_form_map_keys() {
    let rt = Runtime::new();
    let map = rt.new_form_map();
    assert!(map.set(FormId(0x14), "player"));
    assert!(!map.set(FormId::ZERO, "nothing"));
    assert!(!map.set("string key", 1));
    assert_eq!(map.get_str(FormId(0x14), ""), "player");
    assert_eq!(map.value_type(FormId(0x15)), ValueType::NoValue);
}

#[test]
fn test_add_pairs() {
    let rt = Runtime::new();
    let target = rt.new_map();
    target.set("a", 1);
    let source = rt.new_map();
    source.set("A", 10);
    source.set("b", 20);

    assert!(target.add_pairs(&source, false));
    assert_eq!(target.get_int("a", 0), 1);
    assert_eq!(target.get_int("b", 0), 20);

    assert!(target.add_pairs(&source, true));
    assert_eq!(target.get_int("a", 0), 10);

    assert!(!target.add_pairs(&rt.new_int_map(), true));
    assert!(!target.add_pairs(&target, true));
}

// ═══════════════════════════════════════════════════════════════════════
// Self-reference and Concurrency
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_self_insertion_does_not_deadlock() {
    let rt = Runtime::new();
    let map = rt.new_map();
    assert!(map.set("me", &map));
    assert!(!map.add_pairs(&map, true));
    assert!(map.get_obj("me").is_some_and(|m| Arc::ptr_eq(&m, &map)));

    let arr = rt.new_array();
    assert!(arr.push(&arr));
    assert!(arr.set(0, &arr));
    assert!(!arr.add_from_array(&arr, -1));
    arr.clear();
    assert!(arr.is_alive());
}

#[test]
fn test_opposite_merges_do_not_deadlock() {
    let rt = Runtime::new();
    let a = rt.new_map();
    let b = rt.new_map();
    a.set("a", 1);
    b.set("b", 2);

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..2_000 {
                a.add_pairs(&b, true);
            }
        });
        s.spawn(|| {
            for _ in 0..2_000 {
                b.add_pairs(&a, true);
            }
        });
    });
    assert_eq!(a.count(), 2);
    assert_eq!(b.count(), 2);
}

#[test]
fn test_copies() {
    let rt = Runtime::new();
    let root = rt.new_map();
    let shared = rt.new_array();
    root.set("b", &shared);
    root.set("c", &shared);

    let shallow = rt.shallow_copy(&root);
    assert!(shallow.get_obj("b").is_some_and(|b| Arc::ptr_eq(&b, &shared)));

    let deep = rt.deep_copy(&root);
    let (b, c) = (deep.get("b").unwrap(), deep.get("c").unwrap());
    assert!(b.is_same_object(&c));
    assert!(!b.is_same_object(&root.get("b").unwrap()));
}
