use crate::event::EventSystemError;
use crate::kernel::error::Error;

#[test]
fn test_invalid_subscriber_names_actual_type() {
    let err = EventSystemError::InvalidSubscriber {
        actual: "integer 5".to_string(),
    };
    assert_eq!(err.to_string(), "Expected a callable or closure factory, got integer 5");
}

#[test]
fn test_invalid_subscription_names_event_and_owner() {
    let err = EventSystemError::InvalidSubscription {
        event_name: "output".to_string(),
        owner: "Console".to_string(),
        reason: "unsupported subscription shape: integer 3".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("'output'"));
    assert!(msg.contains("Console"));
    assert!(msg.contains("integer 3"));
}

#[test]
fn test_unknown_dispatch_frame_display() {
    let err = EventSystemError::UnknownDispatchFrame { index: 3, depth: 1 };
    assert_eq!(err.to_string(), "No dispatch frame at index 3 (stack depth 1)");
}

#[test]
fn test_event_error_converts_into_kernel_error() {
    let err: Error = EventSystemError::UnknownMethod {
        owner: "Console".to_string(),
        method: "nope".to_string(),
    }
    .into();
    assert!(matches!(err, Error::EventSystem(EventSystemError::UnknownMethod { .. })));
    assert_eq!(err.to_string(), "Event system error: Console has no subscriber method 'nope'");
}
