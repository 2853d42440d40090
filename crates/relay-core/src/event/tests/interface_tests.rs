use std::sync::Arc;

use serde_json::json;

use crate::event::{
    Callback, EventSystemError, InterfaceManager, SubscriberInterface, SubscriberKey, SubscriptionSpec,
};
use crate::event::SubscriptionSpec::{List, OnlyOnce, Priority};

/// Declares whatever subscriptions it is built with
struct Declarer {
    declarations: Vec<(String, SubscriptionSpec)>,
}

impl Declarer {
    fn new(declarations: Vec<(&str, SubscriptionSpec)>) -> Arc<dyn SubscriberInterface> {
        Arc::new(Self {
            declarations: declarations
                .into_iter()
                .map(|(name, spec)| (name.to_string(), spec))
                .collect(),
        })
    }
}

impl SubscriberInterface for Declarer {
    fn name(&self) -> &str {
        "Declarer"
    }

    fn subscriptions(&self) -> Vec<(String, SubscriptionSpec)> {
        self.declarations.clone()
    }
}

fn m(name: &str) -> SubscriptionSpec {
    SubscriptionSpec::from(name)
}

fn method_of(key: &SubscriberKey) -> &str {
    match key {
        SubscriberKey::Method { method, .. } => method,
        other => panic!("expected a method key, got {:?}", other),
    }
}

#[test]
fn test_bare_method_name_uses_defaults() {
    let owner = Declarer::new(vec![("boot", "onBoot".into())]);
    let map = InterfaceManager::normalize(&owner).unwrap();

    let entries = &map["boot"];
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].priority, 0);
    assert!(!entries[0].only_once);
    assert_eq!(method_of(&entries[0].subscriber.key()), "onBoot");
}

#[test]
fn test_direct_callable() {
    let callback = Callback::simple(|_| {});
    let owner = Declarer::new(vec![("boot", callback.clone().into())]);
    let map = InterfaceManager::normalize(&owner).unwrap();
    assert_eq!(&map["boot"][0].subscriber.key(), callback.key());
}

#[test]
fn test_list_fields_match_by_kind_not_position() {
    let a = Declarer::new(vec![("x", List(vec![m("handle"), OnlyOnce(true), Priority(5)]))]);
    let b = Declarer::new(vec![("x", List(vec![m("handle"), Priority(5), OnlyOnce(true)]))]);
    let c = Declarer::new(vec![("x", List(vec![Priority(5), OnlyOnce(true), m("handle")]))]);

    for owner in [a, b, c] {
        let map = InterfaceManager::normalize(&owner).unwrap();
        let entry = &map["x"][0];
        assert_eq!(entry.priority, 5);
        assert!(entry.only_once);
        assert_eq!(method_of(&entry.subscriber.key()), "handle");
    }
}

#[test]
fn test_list_of_lists_declares_several_subscribers() {
    let owner = Declarer::new(vec![(
        "output",
        List(vec![
            List(vec![m("first"), Priority(10)]),
            List(vec![m("second")]),
            List(vec![m("third"), OnlyOnce(true)]),
        ]),
    )]);
    let map = InterfaceManager::normalize(&owner).unwrap();
    let entries = &map["output"];

    assert_eq!(entries.len(), 3);
    assert_eq!(method_of(&entries[0].subscriber.key()), "first");
    assert_eq!(entries[0].priority, 10);
    assert_eq!(entries[1].priority, 0);
    assert!(entries[2].only_once);
}

#[test]
fn test_repeated_event_names_accumulate() {
    let owner = Declarer::new(vec![("boot", "one".into()), ("boot", "two".into())]);
    let map = InterfaceManager::normalize(&owner).unwrap();
    assert_eq!(map["boot"].len(), 2);
}

#[test]
fn test_malformed_shapes_name_event_and_owner() {
    let cases: Vec<SubscriptionSpec> = vec![
        Priority(3),
        OnlyOnce(true),
        List(Vec::new()),
        List(vec![Priority(5), OnlyOnce(true)]),
        List(vec![m("a"), m("b")]),
        List(vec![m("a"), Priority(1), Priority(2)]),
        List(vec![List(vec![m("a")]), m("b")]),
        List(vec![List(vec![Priority(5)])]),
    ];

    for spec in cases {
        let description = spec.describe();
        let owner = Declarer::new(vec![("broken", spec)]);
        match InterfaceManager::normalize(&owner) {
            Err(EventSystemError::InvalidSubscription { event_name, owner, reason }) => {
                assert_eq!(event_name, "broken");
                assert_eq!(owner, "Declarer");
                assert!(reason.contains(&description), "{} should mention {}", reason, description);
            }
            other => panic!("{} should be rejected, got {:?}", description, other.map(|m| m.len())),
        }
    }
}

#[test]
fn test_spec_from_json() {
    let spec = SubscriptionSpec::from_value(&json!(["log", 10, true])).unwrap();
    let owner = Declarer::new(vec![("boot", spec)]);
    let entry = &InterfaceManager::normalize(&owner).unwrap()["boot"][0];
    assert_eq!(entry.priority, 10);
    assert!(entry.only_once);

    let nested = SubscriptionSpec::from_value(&json!([["a"], ["b", -1]])).unwrap();
    let owner = Declarer::new(vec![("boot", nested)]);
    assert_eq!(InterfaceManager::normalize(&owner).unwrap()["boot"].len(), 2);
}

#[test]
fn test_spec_from_json_rejects_non_callables() {
    for value in [json!(null), json!({ "method": "log" }), json!(1.5)] {
        let err = SubscriptionSpec::from_value(&value).unwrap_err();
        assert!(matches!(err, EventSystemError::InvalidSubscriber { .. }));
    }
}

#[test]
fn test_default_handle_reports_unknown_method() {
    let manager = crate::event::Manager::new();
    manager
        .add_subscriber_interface(Declarer::new(vec![("x", m("missing"))]))
        .unwrap();

    let err = manager.publish("x", None, Default::default()).unwrap_err();
    match err {
        crate::kernel::error::Error::EventSystem(EventSystemError::UnknownMethod { owner, method }) => {
            assert_eq!(owner, "Declarer");
            assert_eq!(method, "missing");
        }
        other => panic!("expected an unknown method error, got {:?}", other),
    }
}
