use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Value, json};

use crate::promise::error::{PromiseError, Reason};
use crate::promise::queue::{self, TaskQueue};

/// Settlement state of a promise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled => "fulfilled",
            PromiseState::Rejected => "rejected",
        })
    }
}

/// What a handler produces; `Err` rejects the derived promise
pub type HandlerResult = Result<Resolution, Reason>;

/// Boxed fulfillment handler
pub type OnFulfilled = Box<dyn FnOnce(Value) -> HandlerResult + Send>;

/// Boxed rejection handler
pub type OnRejected = Box<dyn FnOnce(Reason) -> HandlerResult + Send>;

/// Called by `wait` on a pending promise; expected to settle it
pub type WaitFn = Box<dyn FnOnce(&Promise) -> Result<(), Reason> + Send>;

/// Called by `cancel` on a pending promise
pub type CancelFn = Box<dyn FnOnce(&Promise) -> Result<(), Reason> + Send>;

/// A promise-like value from another implementation.
///
/// Resolving a [`Promise`] with a thenable makes the promise adopt the
/// thenable's eventual outcome.
pub trait Thenable: Send + Sync {
    /// Register continuations; each is called at most once
    fn then(&self, on_fulfilled: Box<dyn FnOnce(Value) + Send>, on_rejected: Box<dyn FnOnce(Reason) + Send>);

    /// Block until settled, if the implementation can
    fn wait(&self) {}

    fn cancel(&self) {}
}

/// Value a promise can be resolved with
pub enum Resolution {
    Value(Value),
    Promise(Promise),
    Thenable(Arc<dyn Thenable>),
}

impl Resolution {
    pub fn value(value: impl Into<Value>) -> Self {
        Resolution::Value(value.into())
    }
}

impl From<Value> for Resolution {
    fn from(value: Value) -> Self {
        Resolution::Value(value)
    }
}

impl From<Promise> for Resolution {
    fn from(promise: Promise) -> Self {
        Resolution::Promise(promise)
    }
}

impl From<()> for Resolution {
    fn from(_: ()) -> Self {
        Resolution::Value(Value::Null)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Resolution::Promise(p) => f.debug_tuple("Promise").field(p).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable"),
        }
    }
}

/// Snapshot of a promise's state and result
#[derive(Debug, Clone)]
pub enum Inspection {
    Pending,
    Fulfilled(Value),
    Rejected(Reason),
}

impl Inspection {
    pub fn state(&self) -> PromiseState {
        match self {
            Inspection::Pending => PromiseState::Pending,
            Inspection::Fulfilled(_) => PromiseState::Fulfilled,
            Inspection::Rejected(_) => PromiseState::Rejected,
        }
    }

    /// `{"state": ..., "value"|"reason": ...}` descriptor
    pub fn to_value(&self) -> Value {
        match self {
            Inspection::Pending => json!({ "state": "pending" }),
            Inspection::Fulfilled(v) => json!({ "state": "fulfilled", "value": v }),
            Inspection::Rejected(r) => json!({ "state": "rejected", "reason": r.to_value() }),
        }
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Fulfilled(Value),
    Rejected(Reason),
}

impl Outcome {
    fn state(&self) -> PromiseState {
        match self {
            Outcome::Fulfilled(_) => PromiseState::Fulfilled,
            Outcome::Rejected(_) => PromiseState::Rejected,
        }
    }

    fn same_as(&self, other: &Outcome) -> bool {
        match (self, other) {
            (Outcome::Fulfilled(a), Outcome::Fulfilled(b)) => a == b,
            (Outcome::Rejected(a), Outcome::Rejected(b)) => a.same_as(b),
            _ => false,
        }
    }
}

/// Source a pending promise is adopting the outcome of
#[derive(Clone)]
enum Follow {
    Promise(Promise),
    Thenable(Arc<dyn Thenable>),
}

impl Follow {
    fn same_as(&self, other: &Follow) -> bool {
        match (self, other) {
            (Follow::Promise(a), Follow::Promise(b)) => a.same(b),
            (Follow::Thenable(a), Follow::Thenable(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

struct Handler {
    derived: Promise,
    on_fulfilled: Option<OnFulfilled>,
    on_rejected: Option<OnRejected>,
    /// `derived` is adopting this promise's outcome
    adopting: bool,
}

#[derive(Default)]
struct Inner {
    outcome: Option<Outcome>,
    follows: Option<Follow>,
    handlers: Vec<Handler>,
    wait_fn: Option<WaitFn>,
    cancel_fn: Option<CancelFn>,
    /// Ancestors to wait on when this promise has no wait function
    wait_list: Vec<Promise>,
}

/// A deferred value.
///
/// Continuations registered with [`then`](Promise::then) never run inline:
/// settlement schedules them on the promise's [`TaskQueue`], which runs when
/// drained explicitly or by [`wait`](Promise::wait).
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Mutex<Inner>>,
    queue: Arc<TaskQueue>,
}

impl Promise {
    /// Pending promise on the global queue
    pub fn new() -> Self {
        Self::with_queue(queue::global())
    }

    /// Pending promise on `queue`
    pub fn with_queue(queue: Arc<TaskQueue>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            queue,
        }
    }

    /// Attach the function `wait` calls while the promise is pending
    pub fn with_wait_fn<F>(self, wait_fn: F) -> Self
    where
        F: FnOnce(&Promise) -> Result<(), Reason> + Send + 'static,
    {
        self.lock().wait_fn = Some(Box::new(wait_fn));
        self
    }

    /// Attach the function `cancel` calls while the promise is pending
    pub fn with_cancel_fn<F>(self, cancel_fn: F) -> Self
    where
        F: FnOnce(&Promise) -> Result<(), Reason> + Send + 'static,
    {
        self.lock().cancel_fn = Some(Box::new(cancel_fn));
        self
    }

    /// Already-fulfilled promise on the global queue
    pub fn fulfilled(value: impl Into<Value>) -> Self {
        Self::fulfilled_in(queue::global(), value)
    }

    pub fn fulfilled_in(queue: Arc<TaskQueue>, value: impl Into<Value>) -> Self {
        let promise = Self::with_queue(queue);
        promise.lock().outcome = Some(Outcome::Fulfilled(value.into()));
        promise
    }

    /// Already-rejected promise on the global queue
    pub fn rejected(reason: impl Into<Reason>) -> Self {
        Self::rejected_in(queue::global(), reason)
    }

    pub fn rejected_in(queue: Arc<TaskQueue>, reason: impl Into<Reason>) -> Self {
        let promise = Self::with_queue(queue);
        promise.lock().outcome = Some(Outcome::Rejected(reason.into()));
        promise
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Whether both handles refer to the same promise
    pub fn same(&self, other: &Promise) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> PromiseState {
        self.lock()
            .outcome
            .as_ref()
            .map_or(PromiseState::Pending, Outcome::state)
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.state() == PromiseState::Fulfilled
    }

    pub fn is_rejected(&self) -> bool {
        self.state() == PromiseState::Rejected
    }

    /// Current state and result, without waiting
    pub fn inspect(&self) -> Inspection {
        match &self.lock().outcome {
            None => Inspection::Pending,
            Some(Outcome::Fulfilled(v)) => Inspection::Fulfilled(v.clone()),
            Some(Outcome::Rejected(r)) => Inspection::Rejected(r.clone()),
        }
    }

    /// Fulfill the promise, or adopt the outcome of a promise or thenable.
    ///
    /// Resolving again with the same value is a no-op; any other second
    /// settlement is an error.
    pub fn resolve(&self, value: impl Into<Resolution>) -> Result<(), PromiseError> {
        match value.into() {
            Resolution::Value(v) => self.settle(Outcome::Fulfilled(v), false),
            Resolution::Promise(p) => self.follow(Follow::Promise(p)),
            Resolution::Thenable(t) => self.follow(Follow::Thenable(t)),
        }
    }

    /// Reject the promise. Rejecting again with the same reason is a no-op.
    pub fn reject(&self, reason: impl Into<Reason>) -> Result<(), PromiseError> {
        self.settle(Outcome::Rejected(reason.into()), false)
    }

    fn settle(&self, outcome: Outcome, adopted: bool) -> Result<(), PromiseError> {
        let (handlers, released) = {
            let mut inner = self.lock();
            if let Some(current) = &inner.outcome {
                if current.same_as(&outcome) {
                    return Ok(());
                }
                return Err(if current.state() == outcome.state() {
                    PromiseError::AlreadySettled { state: current.state() }
                } else {
                    PromiseError::StateConflict {
                        from: current.state(),
                        to: outcome.state(),
                    }
                });
            }
            if inner.follows.is_some() && !adopted {
                return Err(PromiseError::AlreadyResolving);
            }
            inner.outcome = Some(outcome.clone());
            let released = (
                inner.follows.take(),
                inner.wait_fn.take(),
                inner.cancel_fn.take(),
                std::mem::take(&mut inner.wait_list),
            );
            (std::mem::take(&mut inner.handlers), released)
        };
        // Captured closures and ancestors are dropped outside the lock.
        drop(released);
        log::trace!("Promise settled as {} with {} handler(s)", outcome.state(), handlers.len());
        if !handlers.is_empty() {
            self.queue.add(move || {
                for handler in handlers {
                    call_handler(handler, outcome.clone());
                }
            });
        }
        Ok(())
    }

    /// Settle from an adopted source or a failed wait, ignoring conflicts
    fn force(&self, outcome: Outcome) {
        if let Err(e) = self.settle(outcome, true) {
            log::debug!("Ignored settlement of an already settled promise: {}", e);
        }
    }

    fn follow(&self, target: Follow) -> Result<(), PromiseError> {
        if let Follow::Promise(p) = &target {
            if p.follows_chain_reaches(self) {
                return Err(PromiseError::SelfResolution);
            }
        }
        {
            let mut inner = self.lock();
            if let Some(current) = &inner.outcome {
                return Err(match current.state() {
                    PromiseState::Rejected => PromiseError::StateConflict {
                        from: PromiseState::Rejected,
                        to: PromiseState::Fulfilled,
                    },
                    state => PromiseError::AlreadySettled { state },
                });
            }
            match &inner.follows {
                Some(existing) if existing.same_as(&target) => return Ok(()),
                Some(_) => return Err(PromiseError::AlreadyResolving),
                None => inner.follows = Some(target.clone()),
            }
        }
        match target {
            Follow::Promise(source) => source.attach(Handler {
                derived: self.clone(),
                on_fulfilled: None,
                on_rejected: None,
                adopting: true,
            }),
            Follow::Thenable(thenable) => {
                let on_value = self.clone();
                let on_reason = self.clone();
                thenable.then(
                    Box::new(move |value| on_value.force(Outcome::Fulfilled(value))),
                    Box::new(move |reason| on_reason.force(Outcome::Rejected(reason))),
                );
            }
        }
        Ok(())
    }

    /// Whether following the adoption chain from `self` reaches `target`
    fn follows_chain_reaches(&self, target: &Promise) -> bool {
        let mut current = self.clone();
        loop {
            if current.same(target) {
                return true;
            }
            let next = match &current.lock().follows {
                Some(Follow::Promise(p)) => p.clone(),
                _ => return false,
            };
            current = next;
        }
    }

    /// Queue `handler` now if settled, otherwise on settlement
    fn attach(&self, handler: Handler) {
        let mut inner = self.lock();
        match inner.outcome.clone() {
            None => inner.handlers.push(handler),
            Some(outcome) => {
                drop(inner);
                self.queue.add(move || call_handler(handler, outcome));
            }
        }
    }

    /// Chain a fulfillment handler; rejections pass through
    pub fn then<F, R>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Result<R, Reason> + Send + 'static,
        R: Into<Resolution>,
    {
        self.then_with(
            Some(Box::new(move |v: Value| -> HandlerResult { on_fulfilled(v).map(Into::into) })),
            None,
        )
    }

    /// Chain both handlers
    pub fn then_both<F, G, R1, R2>(&self, on_fulfilled: F, on_rejected: G) -> Promise
    where
        F: FnOnce(Value) -> Result<R1, Reason> + Send + 'static,
        G: FnOnce(Reason) -> Result<R2, Reason> + Send + 'static,
        R1: Into<Resolution>,
        R2: Into<Resolution>,
    {
        self.then_with(
            Some(Box::new(move |v: Value| -> HandlerResult { on_fulfilled(v).map(Into::into) })),
            Some(Box::new(move |r: Reason| -> HandlerResult { on_rejected(r).map(Into::into) })),
        )
    }

    /// Chain a rejection handler; values pass through
    pub fn otherwise<G, R>(&self, on_rejected: G) -> Promise
    where
        G: FnOnce(Reason) -> Result<R, Reason> + Send + 'static,
        R: Into<Resolution>,
    {
        self.then_with(
            None,
            Some(Box::new(move |r: Reason| -> HandlerResult { on_rejected(r).map(Into::into) })),
        )
    }

    /// Chain optional boxed handlers.
    ///
    /// The derived promise settles with the handler's result, or with this
    /// promise's outcome when the matching handler is absent. Cancelling the
    /// derived promise cancels this one.
    pub fn then_with(&self, on_fulfilled: Option<OnFulfilled>, on_rejected: Option<OnRejected>) -> Promise {
        let parent = self.clone();
        let derived = Promise::with_queue(self.queue.clone()).with_cancel_fn(move |_| {
            parent.cancel();
            Ok(())
        });
        let handler = Handler {
            derived: derived.clone(),
            on_fulfilled,
            on_rejected,
            adopting: false,
        };

        let mut inner = self.lock();
        match inner.outcome.clone() {
            None => {
                let mut wait_list = inner.wait_list.clone();
                wait_list.push(self.clone());
                inner.handlers.push(handler);
                drop(inner);
                derived.lock().wait_list = wait_list;
            }
            Some(outcome) => {
                drop(inner);
                derived.lock().wait_list.push(self.clone());
                self.queue.add(move || call_handler(handler, outcome));
            }
        }
        derived
    }

    /// Wait for settlement and unwrap the result.
    ///
    /// A rejection is returned as `Err`.
    pub fn wait(&self) -> Result<Value, Reason> {
        match self.wait_settled() {
            Inspection::Fulfilled(value) => Ok(value),
            Inspection::Rejected(reason) => Err(reason),
            Inspection::Pending => Err(PromiseError::WaitFailed(
                "Invoking the wait callback did not resolve the promise".to_string(),
            )
            .into()),
        }
    }

    /// Wait for settlement without unwrapping; never fails
    pub fn wait_settled(&self) -> Inspection {
        self.wait_if_pending();
        self.inspect()
    }

    fn wait_if_pending(&self) {
        let (wait_fn, follows, wait_list) = {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return;
            }
            (
                inner.wait_fn.take(),
                inner.follows.clone(),
                std::mem::take(&mut inner.wait_list),
            )
        };

        let already_following = follows.is_some();
        if let Some(wait_fn) = wait_fn {
            if let Err(reason) = wait_fn(self) {
                if self.is_pending() {
                    self.force(Outcome::Rejected(reason));
                } else {
                    log::warn!("Wait function failed after the promise settled: {}", reason);
                }
            }
        } else if let Some(follow) = follows {
            match follow {
                Follow::Promise(source) => source.wait_if_pending(),
                Follow::Thenable(thenable) => thenable.wait(),
            }
        } else if !wait_list.is_empty() {
            for ancestor in wait_list {
                ancestor.wait_if_pending();
            }
        } else {
            self.force(Outcome::Rejected(
                PromiseError::WaitFailed(
                    "Cannot wait on a promise that has no internal wait function. \
                     You must provide a wait function when constructing the promise to be able to wait on it."
                        .to_string(),
                )
                .into(),
            ));
        }

        // The wait callback may have resolved this promise with another pending one
        if !already_following && self.is_pending() {
            let adopted = self.lock().follows.clone();
            match adopted {
                Some(Follow::Promise(source)) => source.wait_if_pending(),
                Some(Follow::Thenable(thenable)) => thenable.wait(),
                None => {}
            }
        }

        self.queue.run();

        if self.is_pending() {
            self.force(Outcome::Rejected(
                PromiseError::WaitFailed("Invoking the wait callback did not resolve the promise".to_string())
                    .into(),
            ));
        }
    }

    /// Cancel a pending promise.
    ///
    /// Runs the cancel function if one is attached (a derived promise's
    /// cancel function cancels its parent), then rejects with
    /// [`PromiseError::Cancelled`] if still pending.
    pub fn cancel(&self) {
        let cancel_fn = {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return;
            }
            inner.wait_fn = None;
            inner.wait_list.clear();
            inner.cancel_fn.take()
        };
        if let Some(cancel_fn) = cancel_fn {
            if let Err(reason) = cancel_fn(self) {
                self.force(Outcome::Rejected(reason));
            }
        }
        if self.is_pending() {
            log::debug!("Promise cancelled");
            self.force(Outcome::Rejected(PromiseError::Cancelled.into()));
        }
    }
}

fn call_handler(handler: Handler, outcome: Outcome) {
    let Handler {
        derived,
        on_fulfilled,
        on_rejected,
        adopting,
    } = handler;
    if derived.is_settled() {
        return;
    }
    if adopting {
        derived.force(outcome);
        return;
    }
    let result = match outcome {
        Outcome::Fulfilled(value) => match on_fulfilled {
            Some(f) => guarded(move || f(value)),
            None => Ok(Resolution::Value(value)),
        },
        Outcome::Rejected(reason) => match on_rejected {
            Some(f) => guarded(move || f(reason)),
            None => Err(reason),
        },
    };
    let settled = match result {
        Ok(resolution) => derived.resolve(resolution),
        Err(reason) => derived.reject(reason),
    };
    if let Err(e) = settled {
        derived.force(Outcome::Rejected(e.into()));
    }
}

/// Run a handler, turning a panic into a rejection
fn guarded(f: impl FnOnce() -> HandlerResult) -> HandlerResult {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(PromiseError::HandlerPanicked(panic_message(payload.as_ref())).into()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Promise")
            .field("state", &inner.outcome.as_ref().map_or(PromiseState::Pending, Outcome::state))
            .field("following", &inner.follows.is_some())
            .field("handlers", &inner.handlers.len())
            .field("has_wait_fn", &inner.wait_fn.is_some())
            .field("has_cancel_fn", &inner.cancel_fn.is_some())
            .finish()
    }
}

impl Thenable for Promise {
    fn then(&self, on_fulfilled: Box<dyn FnOnce(Value) + Send>, on_rejected: Box<dyn FnOnce(Reason) + Send>) {
        self.then_with(
            Some(Box::new(move |value: Value| -> HandlerResult {
                on_fulfilled(value);
                Ok(Resolution::Value(Value::Null))
            })),
            Some(Box::new(move |reason: Reason| -> HandlerResult {
                on_rejected(reason);
                Ok(Resolution::Value(Value::Null))
            })),
        );
    }

    fn wait(&self) {
        self.wait_if_pending();
    }

    fn cancel(&self) {
        Promise::cancel(self);
    }
}

/// Run `task` on `queue` and expose its result as a promise.
///
/// Waiting on the returned promise drains the queue.
pub fn task<F, R>(queue: Arc<TaskQueue>, task: F) -> Promise
where
    F: FnOnce() -> Result<R, Reason> + Send + 'static,
    R: Into<Resolution>,
{
    let promise = Promise::with_queue(queue.clone()).with_wait_fn(|p| {
        p.queue().run();
        Ok(())
    });
    let target = promise.clone();
    queue.add(move || {
        if target.is_settled() {
            return;
        }
        let settled = match guarded(move || -> HandlerResult { task().map(Into::into) }) {
            Ok(resolution) => target.resolve(resolution),
            Err(reason) => target.reject(reason),
        };
        if let Err(e) = settled {
            target.force(Outcome::Rejected(e.into()));
        }
    });
    promise
}
