//! # Relay Core Event System Errors
//!
//! Defines error types specific to the Relay event system.
//!
//! This module includes [`EventSystemError`], the enum covering failures that
//! can occur while registering subscribers, normalizing subscription maps
//! declared by a [`SubscriberInterface`](crate::event::SubscriberInterface),
//! materializing closure factories, or inspecting the live dispatch stack.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventSystemError {
    #[error("Expected a callable or closure factory, got {actual}")]
    InvalidSubscriber {
        actual: String,
    },

    #[error("Invalid subscription for event '{event_name}' declared by {owner}: {reason}")]
    InvalidSubscription {
        event_name: String,
        owner: String,
        reason: String,
    },

    #[error("Closure factory subscribed to '{event_name}' did not yield a callable: {reason}")]
    MaterializationFailed {
        event_name: String,
        reason: String,
    },

    #[error("{owner} has no subscriber method '{method}'")]
    UnknownMethod {
        owner: String,
        method: String,
    },

    #[error("No dispatch frame at index {index} (stack depth {depth})")]
    UnknownDispatchFrame {
        index: usize,
        depth: usize,
    },
}
