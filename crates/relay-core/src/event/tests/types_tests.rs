use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::event::{Event, LifecycleEvent, Payload, ValueStore};

#[derive(Debug, PartialEq)]
struct Request {
    path: String,
}

#[test]
fn test_event_defaults() {
    let event = Event::default();
    assert!(event.subject().is_none());
    assert!(event.is_empty());
    assert!(!event.is_propagation_stopped());
    assert_eq!(event.return_value(), None);
}

#[test]
fn test_event_subject_downcast() {
    let subject = Arc::new(Request { path: "/".to_string() });
    let event = Event::new(Some(subject), Payload::new());

    let request = event.subject_as::<Request>().expect("subject should downcast");
    assert_eq!(request.path, "/");
    assert!(event.subject_as::<String>().is_none());
}

#[test]
fn test_event_payload_is_mutable_through_deref() {
    let mut values = BTreeMap::new();
    values.insert("count".to_string(), json!(1));
    let mut event = Event::with_values(values);

    event.set_value("count", 2);
    event.set_value("extra", "x");

    assert_eq!(event.get_value("count"), Some(json!(2)));
    assert_eq!(event.into_store().len(), 2);
}

#[test]
fn test_stop_propagation_is_sticky() {
    let mut event = Event::default();
    event.stop_propagation();
    event.stop_propagation();
    assert!(event.is_propagation_stopped());
}

#[test]
fn test_return_slot_is_opt_in() {
    let mut event = Event::default();
    assert!(!event.attach_return(json!("answer")));
    assert!(!event.has_raw_value("return"));

    let mut event = Event::default().with_return_slot();
    assert!(event.attach_return(json!("answer")));
    assert_eq!(event.return_value(), Some(&json!("answer")));
}

#[test]
fn test_return_slot_keeps_first_meaningful_answer() {
    let mut event = Event::default().with_return_slot();
    assert!(!event.attach_return(json!(null)));
    assert!(event.attach_return(json!(42)));
    assert!(!event.attach_return(json!(43)));
    assert_eq!(event.return_value(), Some(&json!(42)));
}

#[test]
fn test_return_slot_treats_empty_values_as_unset() {
    for empty in [json!(false), json!(""), json!([]), json!({})] {
        let mut payload = Payload::new();
        payload.insert("return".to_string(), empty.clone());
        let mut event = Event::with_values(payload);
        assert!(event.attach_return(json!("filled")), "{} should count as empty", empty);
    }

    let mut payload = Payload::new();
    payload.insert("return".to_string(), json!(0));
    let mut event = Event::with_values(payload);
    assert!(!event.attach_return(json!("filled")));
}

#[test]
fn test_with_store_keeps_resolvers() {
    let store = ValueStore::new().with_resolver("computed", |_| Some(json!("yes")));
    let event = Event::with_store(None, store);
    assert_eq!(event.get_value("computed"), Some(json!("yes")));
}

#[test]
fn test_lifecycle_event_names() {
    assert_eq!(LifecycleEvent::Bootstrap.name(), "bootstrap");
    assert_eq!(LifecycleEvent::Config.to_string(), "config");
    assert_eq!(LifecycleEvent::Output.name(), "output");
    assert_eq!(LifecycleEvent::Shutdown.to_string(), "shutdown");
}
