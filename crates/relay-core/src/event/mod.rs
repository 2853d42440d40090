//! # Relay Core Event System
//!
//! Priority-ordered, re-entrant publish/subscribe.
//!
//! - [`ValueStore`](store::ValueStore): ordered payload map with computed fields.
//! - [`Event`](types::Event): subject, payload and propagation flag.
//! - [`Subscriber`](subscriber::Subscriber): a direct [`Callback`](subscriber::Callback)
//!   or a lazily constructed [`ClosureFactory`](subscriber::ClosureFactory).
//! - [`InterfaceManager`](interface::InterfaceManager): normalizes the
//!   subscription maps declared by a [`SubscriberInterface`](interface::SubscriberInterface).
//! - [`Manager`](manager::Manager): storage, priority sorting and dispatch.
pub mod error;
pub mod interface;
pub mod manager;
pub mod store;
pub mod subscriber;
pub mod types;

/// Re-export important types
pub use error::EventSystemError;
pub use interface::{InterfaceManager, SubscriberInterface, Subscription, SubscriptionMap, SubscriptionSpec};
pub use manager::{EventComponent, Manager};
pub use store::ValueStore;
pub use subscriber::{Callback, ClosureFactory, Materialized, Subscriber, SubscriberKey, SubscriberRecord};
pub use types::{Event, LifecycleEvent, Payload, Subject};

// Test module declaration
#[cfg(test)]
mod tests;
