use crate::config::ConfigError;
use crate::kernel::error::{Error, KernelLifecyclePhase};
use crate::promise::{PromiseError, Reason};

#[test]
fn test_from_str_and_string() {
    assert!(matches!(Error::from("plain"), Error::Other(ref m) if m == "plain"));
    assert!(matches!(Error::from("owned".to_string()), Error::Other(ref m) if m == "owned"));
}

#[test]
fn test_lifecycle_error_display() {
    let err = Error::KernelLifecycleError {
        phase: KernelLifecyclePhase::Start,
        component_name: Some("TaskQueue".to_string()),
        message: "Component failed during Start".to_string(),
        source: Some(Box::new(Error::from("inner"))),
    };
    assert_eq!(err.to_string(), "Kernel lifecycle error during Start: Component failed during Start");
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_config_error_converts() {
    let err: Error = ConfigError::UnsupportedFormat {
        path: "relay.ini".to_string(),
    }
    .into();
    assert_eq!(err.to_string(), "Configuration error: Unsupported config format for 'relay.ini'");
}

#[test]
fn test_rejection_reason_converts_to_promise_error() {
    let err: Error = Reason::value("nope").into();
    match err {
        Error::Promise(PromiseError::Rejected { reason }) => assert_eq!(reason, "nope"),
        other => panic!("unexpected error: {:?}", other),
    }

    let err: Error = Reason::from(PromiseError::Cancelled).into();
    assert!(matches!(err, Error::Promise(PromiseError::Cancelled)));
}

#[test]
fn test_kernel_error_converts_back_into_reason() {
    let reason = Reason::from(Error::Promise(PromiseError::AlreadyResolving));
    assert!(matches!(reason.as_error(), Some(PromiseError::AlreadyResolving)));

    let reason = Reason::from(Error::from("subscriber failed"));
    assert!(matches!(reason.as_error(), Some(PromiseError::HandlerFailed(m)) if m.contains("subscriber failed")));
}
