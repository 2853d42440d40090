//! # Relay Core Promises
//!
//! A deferred value with `pending`, `fulfilled` and `rejected` states,
//! chained with [`Promise::then`] and driven by a cooperative [`TaskQueue`].
//!
//! ## Key Components
//!
//! - **[`Promise`]**: settlement, adoption of nested promises and
//!   [`Thenable`]s, `wait` and `cancel`.
//! - **[`TaskQueue`]**: FIFO trampoline that runs continuations; a process
//!   default is available from [`queue::global`].
//! - **Combinators**: [`all`], [`some`], [`any`], [`settle`], [`unwrap`] and the
//!   underlying [`Each`] iterator.
//! - **Errors**: [`PromiseError`] and the rejection [`Reason`].
pub mod combinators;
pub mod deferred;
pub mod error;
pub mod queue;

pub use combinators::{Each, all, all_keyed, any, inspect, inspect_all, settle, some, unwrap};
pub use deferred::{
    CancelFn, HandlerResult, Inspection, OnFulfilled, OnRejected, Promise, PromiseState, Resolution, Thenable,
    WaitFn, task,
};
pub use error::{PromiseError, Reason};
pub use queue::{QueueComponent, ShutdownGuard, TaskQueue};
