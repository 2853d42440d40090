use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::event::ValueStore;

fn sample() -> ValueStore {
    let mut store = ValueStore::new();
    store.set_value("zeta", 1);
    store.set_value("alpha", "a");
    store.set_value("nested", json!({ "list": [1, 2, { "deep": true }] }));
    store
}

#[test]
fn test_set_then_get_round_trips() {
    let mut store = ValueStore::new();
    store.set_value("name", "relay");
    assert_eq!(store.get_value("name"), Some(json!("relay")));

    store.set_value("name", "again");
    assert_eq!(store.get_value("name"), Some(json!("again")));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_missing_key_without_resolver_is_none() {
    let store = ValueStore::new();
    assert_eq!(store.get_value("absent"), None);
    assert!(!store.has_value("absent"));
    assert!(store.is_empty());
}

#[test]
fn test_resolver_computes_absent_key() {
    let store = ValueStore::new().with_resolver("isReady", |store| {
        Some(Value::Bool(store.has_raw_value("started")))
    });
    assert_eq!(store.get_value("isReady"), Some(json!(false)));
    assert!(store.has_value("isReady"));
    assert!(!store.has_raw_value("isReady"));

    let mut store = store;
    store.set_value("started", true);
    assert_eq!(store.get_value("isReady"), Some(json!(true)));
}

#[test]
fn test_stored_value_wins_over_resolver() {
    let mut store = ValueStore::new().with_resolver("count", |_| Some(json!(0)));
    store.set_value("count", 7);
    assert_eq!(store.get_value("count"), Some(json!(7)));
}

#[test]
fn test_predicate_resolver_wins_over_stored_value() {
    let mut store = ValueStore::new()
        .with_resolver("isReady", |store| Some(Value::Bool(store.has_raw_value("started"))))
        .with_resolver("isolated", |_| Some(json!("computed")));
    store.set_value("isReady", "stale");
    store.set_value("isolated", "stored");

    assert_eq!(store.get_value("isReady"), Some(json!(false)));
    assert_eq!(store.raw_value("isReady"), Some(&json!("stale")));
    assert_eq!(store.get_value("isolated"), Some(json!("stored")));
}

#[test]
fn test_predicate_key_falls_back_when_resolver_yields_nothing() {
    let mut store = ValueStore::new().with_resolver("isDone", |_| None);
    assert_eq!(store.get_value("isDone"), None);
    store.set_value("isDone", true);
    assert_eq!(store.get_value("isDone"), Some(json!(true)));
}

#[test]
fn test_on_set_hook_sees_every_write() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let mut store = ValueStore::new().with_on_set(move |key, value| {
        seen_clone.lock().unwrap().push((key.to_string(), value.clone()));
    });

    store.set_value("a", 1);
    store.set_value("b", "two");
    store.merge(vec![("c".to_string(), json!(3))]);

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!("two")),
            ("c".to_string(), json!(3)),
        ]
    );
}

#[test]
fn test_export_is_key_sorted() {
    let exported = sample().export();
    let keys: Vec<&String> = exported.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["alpha", "nested", "zeta"]);
}

#[test]
fn test_export_import_is_lossless() {
    let original = sample();
    let exported = original.export();

    let mut restored = ValueStore::new();
    let values: BTreeMap<String, Value> = serde_json::from_value(exported).unwrap();
    restored.import(values);

    assert_eq!(restored.values(), original.values());
    assert_eq!(
        restored.get_value("nested"),
        Some(json!({ "list": [1, 2, { "deep": true }] }))
    );
}

#[test]
fn test_serde_round_trip_flattens_values() {
    let original = sample();
    let text = serde_json::to_string(&original).unwrap();
    assert!(text.starts_with("{\"alpha\""));

    let decoded: ValueStore = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded.values(), original.values());
}

#[test]
fn test_get_as_deserializes() {
    let mut store = ValueStore::new();
    store.set_value("ids", json!([3, 1, 2]));
    let ids: Vec<u32> = store.get_as("ids").unwrap();
    assert_eq!(ids, vec![3, 1, 2]);
    assert_eq!(store.get_as::<String>("ids"), None);
}

#[test]
fn test_remove_value() {
    let mut store = sample();
    assert_eq!(store.remove_value("alpha"), Some(json!("a")));
    assert_eq!(store.remove_value("alpha"), None);
    assert_eq!(store.len(), 2);
}
