//! # Aggregate Promises
//!
//! [`Each`] walks a (possibly lazy) sequence of promises with an optional
//! concurrency limit and reports every settlement to callbacks. The
//! combinators [`all`], [`some`], [`any`] and [`settle`] are built on it;
//! their outputs follow input order, never completion order.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::promise::deferred::{Inspection, Promise};
use crate::promise::error::{PromiseError, Reason};
use crate::promise::queue::{self, TaskQueue};

/// Called with `(value, index, aggregate)` when an input fulfills
pub type EachFulfilled = Box<dyn FnMut(Value, usize, &Promise) -> Result<(), Reason> + Send>;

/// Called with `(reason, index, aggregate)` when an input rejects
pub type EachRejected = Box<dyn FnMut(Reason, usize, &Promise) -> Result<(), Reason> + Send>;

type PromiseIter = Box<dyn Iterator<Item = Promise> + Send>;

/// Builder for an aggregate promise over a sequence of promises.
///
/// The aggregate fulfills with `null` once the sequence is exhausted and
/// every input has settled, unless a callback settles it first. A callback
/// returning `Err` rejects the aggregate.
pub struct Each {
    promises: PromiseIter,
    limit: Option<usize>,
    queue: Option<Arc<TaskQueue>>,
    on_fulfilled: Option<EachFulfilled>,
    on_rejected: Option<EachRejected>,
}

impl Each {
    pub fn new<I>(promises: I) -> Self
    where
        I: IntoIterator<Item = Promise>,
        I::IntoIter: Send + 'static,
    {
        Self {
            promises: Box::new(promises.into_iter()),
            limit: None,
            queue: None,
            on_fulfilled: None,
            on_rejected: None,
        }
    }

    /// Keep at most `limit` inputs pending at once; the sequence is pulled lazily
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    /// Queue of the aggregate promise; defaults to the global queue
    pub fn queue(mut self, queue: Arc<TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn on_fulfilled<F>(mut self, f: F) -> Self
    where
        F: FnMut(Value, usize, &Promise) -> Result<(), Reason> + Send + 'static,
    {
        self.on_fulfilled = Some(Box::new(f));
        self
    }

    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: FnMut(Reason, usize, &Promise) -> Result<(), Reason> + Send + 'static,
    {
        self.on_rejected = Some(Box::new(f));
        self
    }

    /// Start iterating and return the aggregate promise
    pub fn promise(self) -> Promise {
        let queue = self.queue.unwrap_or_else(queue::global);
        let state = Arc::new(EachState {
            cursor: Mutex::new(Cursor {
                promises: Some(self.promises),
                next_index: 0,
                pending: BTreeMap::new(),
            }),
            callbacks: Mutex::new(Callbacks {
                on_fulfilled: self.on_fulfilled,
                on_rejected: self.on_rejected,
            }),
            limit: self.limit,
        });

        let waiting = state.clone();
        let cancelling = state.clone();
        let aggregate = Promise::with_queue(queue)
            .with_wait_fn(move |aggregate| {
                waiting.wait(aggregate);
                Ok(())
            })
            .with_cancel_fn(move |_| {
                cancelling.cancel_pending();
                Ok(())
            });

        state.refill(&aggregate);
        state.finish_if_done(&aggregate);
        aggregate
    }
}

impl fmt::Debug for Each {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Each")
            .field("limit", &self.limit)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

struct Cursor {
    /// `None` once the sequence is exhausted
    promises: Option<PromiseIter>,
    next_index: usize,
    pending: BTreeMap<usize, Promise>,
}

struct Callbacks {
    on_fulfilled: Option<EachFulfilled>,
    on_rejected: Option<EachRejected>,
}

struct EachState {
    cursor: Mutex<Cursor>,
    callbacks: Mutex<Callbacks>,
    limit: Option<usize>,
}

enum Settled {
    Fulfilled(Value),
    Rejected(Reason),
}

impl EachState {
    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.callbacks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pull the next input unless the limit is reached or the sequence is done
    fn next_input(&self) -> Option<(usize, Promise)> {
        let mut cursor = self.cursor();
        if self.limit.is_some_and(|limit| cursor.pending.len() >= limit) {
            return None;
        }
        let promise = match cursor.promises.as_mut().and_then(Iterator::next) {
            Some(promise) => promise,
            None => {
                cursor.promises = None;
                return None;
            }
        };
        let index = cursor.next_index;
        cursor.next_index += 1;
        cursor.pending.insert(index, promise.clone());
        Some((index, promise))
    }

    fn refill(self: &Arc<Self>, aggregate: &Promise) {
        while aggregate.is_pending() {
            let Some((index, promise)) = self.next_input() else {
                break;
            };
            let on_value = (self.clone(), aggregate.clone());
            let on_reason = (self.clone(), aggregate.clone());
            promise.then_both(
                move |value| {
                    on_value.0.step(index, Settled::Fulfilled(value), &on_value.1);
                    Ok(Value::Null)
                },
                move |reason| {
                    on_reason.0.step(index, Settled::Rejected(reason), &on_reason.1);
                    Ok(Value::Null)
                },
            );
        }
    }

    fn step(self: &Arc<Self>, index: usize, settled: Settled, aggregate: &Promise) {
        self.cursor().pending.remove(&index);
        if aggregate.is_settled() {
            return;
        }
        let outcome = {
            let mut callbacks = self.callbacks();
            match settled {
                Settled::Fulfilled(value) => match callbacks.on_fulfilled.as_mut() {
                    Some(f) => f(value, index, aggregate),
                    None => Ok(()),
                },
                Settled::Rejected(reason) => match callbacks.on_rejected.as_mut() {
                    Some(f) => f(reason, index, aggregate),
                    None => Ok(()),
                },
            }
        };
        if let Err(reason) = outcome {
            if let Err(e) = aggregate.reject(reason) {
                log::debug!("Aggregate promise already settled: {}", e);
            }
            return;
        }
        self.refill(aggregate);
        self.finish_if_done(aggregate);
    }

    fn finish_if_done(&self, aggregate: &Promise) {
        let done = {
            let cursor = self.cursor();
            cursor.promises.is_none() && cursor.pending.is_empty()
        };
        if done && aggregate.is_pending() {
            if let Err(e) = aggregate.resolve(Value::Null) {
                log::debug!("Aggregate promise already settled: {}", e);
            }
        }
    }

    /// Wait on pending inputs in index order until the aggregate settles
    fn wait(self: &Arc<Self>, aggregate: &Promise) {
        loop {
            aggregate.queue().run();
            if aggregate.is_settled() {
                return;
            }
            let next = self.cursor().pending.values().next().cloned();
            match next {
                Some(promise) => {
                    promise.wait_settled();
                }
                None => {
                    self.refill(aggregate);
                    self.finish_if_done(aggregate);
                    if self.cursor().pending.is_empty() {
                        aggregate.queue().run();
                        return;
                    }
                }
            }
        }
    }

    fn cancel_pending(&self) {
        let pending: Vec<Promise> = {
            let mut cursor = self.cursor();
            cursor.promises = None;
            cursor.pending.values().cloned().collect()
        };
        for promise in pending {
            promise.cancel();
        }
    }
}

fn queue_of(promises: &[Promise]) -> Arc<TaskQueue> {
    promises.first().map_or_else(queue::global, |p| p.queue().clone())
}

/// Fulfill with every value in input order; reject with the first rejection
pub fn all(promises: Vec<Promise>) -> Promise {
    let queue = queue_of(&promises);
    let total = promises.len();
    let results = Arc::new(Mutex::new(vec![Value::Null; total]));
    let collected = results.clone();
    let aggregate = Each::new(promises)
        .queue(queue)
        .on_fulfilled(move |value, index, _| {
            let mut results = collected.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            results[index] = value;
            Ok(())
        })
        .on_rejected(|reason, _, aggregate| {
            if let Err(e) = aggregate.reject(reason) {
                log::debug!("Aggregate promise already settled: {}", e);
            }
            Ok(())
        })
        .promise();
    aggregate.then(move |_| {
        let results = std::mem::take(&mut *results.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        Ok(Value::Array(results))
    })
}

/// Like [`all`] for keyed inputs; fulfills with an object under the same keys
pub fn all_keyed(promises: Vec<(String, Promise)>) -> Promise {
    let (keys, promises): (Vec<String>, Vec<Promise>) = promises.into_iter().unzip();
    all(promises).then(move |values| {
        let values = match values {
            Value::Array(values) => values,
            other => vec![other],
        };
        Ok(Value::Object(keys.into_iter().zip(values).collect()))
    })
}

/// Fulfill once `count` inputs fulfill, with their values in input order.
///
/// Rejects with [`PromiseError::Aggregate`] carrying every rejection when
/// `count` can no longer be reached.
pub fn some(count: usize, promises: Vec<Promise>) -> Promise {
    let queue = queue_of(&promises);
    let total = promises.len();
    let values = Arc::new(Mutex::new(BTreeMap::<usize, Value>::new()));
    let reasons = Arc::new(Mutex::new(BTreeMap::<usize, Reason>::new()));

    let fulfilled = values.clone();
    let rejected = reasons.clone();
    let aggregate = Each::new(promises)
        .queue(queue)
        .on_fulfilled(move |value, index, aggregate| {
            let mut values = fulfilled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if values.len() >= count {
                return Ok(());
            }
            values.insert(index, value);
            if values.len() >= count {
                drop(values);
                if let Err(e) = aggregate.resolve(Value::Null) {
                    log::debug!("Aggregate promise already settled: {}", e);
                }
            }
            Ok(())
        })
        .on_rejected(move |reason, index, _| {
            let mut reasons = rejected.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            reasons.insert(index, reason);
            // Unreachable once fewer than `count` inputs remain able to fulfill
            if reasons.len() + count > total {
                let reasons = std::mem::take(&mut *reasons);
                return Err(not_enough(reasons));
            }
            Ok(())
        })
        .promise();

    aggregate.then(move |_| {
        let values = values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if values.len() < count {
            let reasons = std::mem::take(&mut *reasons.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
            return Err(not_enough(reasons));
        }
        Ok(Value::Array(values.values().cloned().collect()))
    })
}

fn not_enough(reasons: BTreeMap<usize, Reason>) -> Reason {
    PromiseError::Aggregate {
        message: "Not enough promises to fulfill count".to_string(),
        reasons: reasons.into_values().collect(),
    }
    .into()
}

/// First fulfilled value; rejects only when every input rejects
pub fn any(promises: Vec<Promise>) -> Promise {
    some(1, promises).then(|values| {
        Ok(match values {
            Value::Array(mut values) if !values.is_empty() => values.swap_remove(0),
            other => other,
        })
    })
}

/// Never rejects; fulfills with a `{state, value|reason}` descriptor per input
pub fn settle(promises: Vec<Promise>) -> Promise {
    let queue = queue_of(&promises);
    let total = promises.len();
    let results = Arc::new(Mutex::new(vec![Value::Null; total]));
    let on_value = results.clone();
    let on_reason = results.clone();
    Each::new(promises)
        .queue(queue)
        .on_fulfilled(move |value, index, _| {
            on_value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())[index] =
                Inspection::Fulfilled(value).to_value();
            Ok(())
        })
        .on_rejected(move |reason, index, _| {
            on_reason.lock().unwrap_or_else(|poisoned| poisoned.into_inner())[index] =
                Inspection::Rejected(reason).to_value();
            Ok(())
        })
        .promise()
        .then(move |_| {
            let results = std::mem::take(&mut *results.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
            Ok(Value::Array(results))
        })
}

/// Wait on `promise` and describe its settlement, without failing
pub fn inspect(promise: &Promise) -> Inspection {
    promise.wait_settled()
}

/// [`inspect`] every promise, in input order
pub fn inspect_all(promises: &[Promise]) -> Vec<Inspection> {
    promises.iter().map(inspect).collect()
}

/// Wait on every promise in order and return the values.
///
/// Stops at the first rejection and returns its reason.
pub fn unwrap(promises: &[Promise]) -> Result<Vec<Value>, Reason> {
    promises.iter().map(Promise::wait).collect()
}
