//! # Relay Core
//!
//! Synchronous publish/subscribe dispatch with re-entrant, mutation-safe
//! iteration, plus a promise engine driven by a cooperative task queue.
//!
//! - [`event`]: the [`Manager`], [`Event`] and subscriber types.
//! - [`promise`]: [`Promise`], [`TaskQueue`] and the aggregate combinators.
//! - [`config`]: [`RelayConfig`] loading.
//! - [`kernel`]: the [`Application`] lifecycle and the crate-wide error type.
pub mod config;
pub mod event;
pub mod kernel;
pub mod promise;

pub use config::{ConfigFormat, RelayConfig};
pub use event::{
    Callback, ClosureFactory, Event, EventSystemError, LifecycleEvent, Manager, Materialized, Payload,
    Subscriber, SubscriberInterface, SubscriptionSpec, ValueStore,
};
pub use kernel::Application;
pub use kernel::error::{Error as KernelError, Result};
pub use promise::{Promise, PromiseError, PromiseState, Reason, Resolution, TaskQueue, Thenable};
