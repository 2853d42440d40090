use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde_json::Value;

use crate::event::store::ValueStore;
use crate::kernel::constants::RETURN_KEY;

/// Opaque reference to whatever published an event
pub type Subject = Arc<dyn Any + Send + Sync>;

/// Event payload passed to `Manager::publish`
pub type Payload = BTreeMap<String, Value>;

/// An event: a subject, a mutable payload and a propagation flag.
///
/// Subscribers communicate back to the publisher by mutating the payload.
/// Stopping propagation prevents the remaining subscribers of the current
/// publish from running.
#[derive(Clone, Default)]
pub struct Event {
    subject: Option<Subject>,
    store: ValueStore,
    propagation_stopped: bool,
}

impl Event {
    /// Create an event with a subject and initial payload
    pub fn new(subject: Option<Subject>, values: Payload) -> Self {
        Self {
            subject,
            store: ValueStore::from_values(values),
            propagation_stopped: false,
        }
    }

    /// Create an event with a payload and no subject
    pub fn with_values(values: Payload) -> Self {
        Self::new(None, values)
    }

    /// Create an event around a preconfigured store (resolvers, hooks)
    pub fn with_store(subject: Option<Subject>, store: ValueStore) -> Self {
        Self {
            subject,
            store,
            propagation_stopped: false,
        }
    }

    /// Declare an empty `return` slot so subscriber return values are captured
    pub fn with_return_slot(mut self) -> Self {
        if !self.store.has_raw_value(RETURN_KEY) {
            self.store.set_value(RETURN_KEY, Value::Null);
        }
        self
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    /// Downcast the subject to a concrete type
    pub fn subject_as<T: Any>(&self) -> Option<&T> {
        self.subject.as_ref().and_then(|s| s.downcast_ref::<T>())
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Value captured in the `return` slot, if any
    pub fn return_value(&self) -> Option<&Value> {
        self.store.raw_value(RETURN_KEY).filter(|v| !v.is_null())
    }

    /// Store `value` into the `return` slot if the slot is declared and empty.
    ///
    /// Returns whether the value was attached.
    pub(crate) fn attach_return(&mut self, value: Value) -> bool {
        if value.is_null() {
            return false;
        }
        match self.store.raw_value(RETURN_KEY) {
            Some(current) if is_empty_value(current) => {
                self.store.set_value(RETURN_KEY, value);
                true
            }
            _ => false,
        }
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn into_store(self) -> ValueStore {
        self.store
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

impl Deref for Event {
    type Target = ValueStore;

    fn deref(&self) -> &ValueStore {
        &self.store
    }
}

impl DerefMut for Event {
    fn deref_mut(&mut self) -> &mut ValueStore {
        &mut self.store
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("has_subject", &self.subject.is_some())
            .field("values", self.store.values())
            .field("propagation_stopped", &self.propagation_stopped)
            .finish()
    }
}

/// Lifecycle events published by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Application has started
    Bootstrap,
    /// Configuration has been loaded
    Config,
    /// Output is about to be written
    Output,
    /// Application is shutting down
    Shutdown,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Bootstrap => "bootstrap",
            LifecycleEvent::Config => "config",
            LifecycleEvent::Output => "output",
            LifecycleEvent::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
