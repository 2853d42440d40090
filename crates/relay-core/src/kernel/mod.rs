//! # Relay Core Kernel
//!
//! Wires the event manager and the task queue into an application with a
//! managed lifecycle.
//!
//! ## Key Responsibilities & Components:
//!
//! - **Application Bootstrapping**: [`Application`](bootstrap::Application)
//!   initializes and starts its components, then publishes the `bootstrap`
//!   lifecycle event.
//! - **Component Lifecycle**: the [`KernelComponent`](component::KernelComponent)
//!   trait, implemented by the event and queue components.
//! - **Core Constants**: names, environment variables and defaults in `constants`.
//! - **Error Handling**: the crate-wide [`Error`](error::Error) and `Result` alias.
pub mod bootstrap;
pub mod component;
pub mod constants;
pub mod error;

pub use bootstrap::Application;
pub use component::KernelComponent;
pub use error::{Error, KernelLifecyclePhase, Result};

#[cfg(test)]
mod tests;
