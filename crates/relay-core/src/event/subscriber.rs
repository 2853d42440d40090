use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::event::error::EventSystemError;
use crate::event::interface::{SubscriberInterface, SubscriptionSpec};
use crate::event::manager::Manager;
use crate::event::types::Event;
use crate::kernel::error::Result;

/// Signature of every subscriber callable.
///
/// A non-null return value is attached to the event's `return` slot when the
/// event declares one.
pub type CallbackFn = dyn Fn(&mut Event, &str, &Manager) -> Result<Option<Value>> + Send + Sync;

/// Builds the real subscriber on first dispatch
pub type FactoryFn = dyn Fn() -> Result<Materialized> + Send + Sync;

/// Identity of a subscriber, used by `unsubscribe`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriberKey {
    Callback(usize),
    Method { owner: usize, method: String },
    Factory(usize),
}

fn address<T: ?Sized>(ptr: *const T) -> usize {
    ptr as *const () as usize
}

/// A shareable subscriber callable
#[derive(Clone)]
pub struct Callback {
    key: SubscriberKey,
    func: Arc<CallbackFn>,
}

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Event, &str, &Manager) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        let func: Arc<CallbackFn> = Arc::new(f);
        Self {
            key: SubscriberKey::Callback(address(Arc::as_ptr(&func))),
            func,
        }
    }

    /// Helper for subscribers that only touch the event
    pub fn simple<F>(f: F) -> Self
    where
        F: Fn(&mut Event) + Send + Sync + 'static,
    {
        Self::new(move |event, _, _| {
            f(event);
            Ok(None)
        })
    }

    /// Bind `method` of a subscriber interface object.
    ///
    /// Two bindings of the same method on the same object share an identity.
    pub fn method(owner: Arc<dyn SubscriberInterface>, method: impl Into<String>) -> Self {
        let method = method.into();
        let key = SubscriberKey::Method {
            owner: address(Arc::as_ptr(&owner)),
            method: method.clone(),
        };
        let func: Arc<CallbackFn> = Arc::new(
            move |event: &mut Event, event_name: &str, manager: &Manager| {
                owner.handle(&method, event, event_name, manager)
            },
        );
        Self { key, func }
    }

    pub fn key(&self) -> &SubscriberKey {
        &self.key
    }

    pub fn call(&self, event: &mut Event, event_name: &str, manager: &Manager) -> Result<Option<Value>> {
        (self.func)(event, event_name, manager)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("key", &self.key).finish_non_exhaustive()
    }
}

/// What a closure factory produces
pub enum Materialized {
    /// A ready callable
    Callback(Callback),
    /// An object whose method (named by the factory) becomes the callable
    Object(Arc<dyn SubscriberInterface>),
}

/// Deferred construction of a subscriber.
///
/// The factory runs on the first dispatch that reaches the subscriber; the
/// manager then stores the materialized callable in place of the factory.
#[derive(Clone)]
pub struct ClosureFactory {
    factory: Arc<FactoryFn>,
    method: Option<String>,
}

impl ClosureFactory {
    /// Factory yielding a callable directly
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Materialized> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            method: None,
        }
    }

    /// Factory yielding an object; `method` is bound on it
    pub fn with_method<F>(factory: F, method: impl Into<String>) -> Self
    where
        F: Fn() -> Result<Materialized> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            method: Some(method.into()),
        }
    }

    pub fn key(&self) -> SubscriberKey {
        SubscriberKey::Factory(address(Arc::as_ptr(&self.factory)))
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub(crate) fn materialize(&self, event_name: &str) -> Result<Callback> {
        let product = (self.factory)()?;
        match (product, &self.method) {
            (Materialized::Callback(callback), None) => Ok(callback),
            (Materialized::Object(object), Some(method)) => Ok(Callback::method(object, method.clone())),
            (Materialized::Callback(_), Some(method)) => Err(EventSystemError::MaterializationFailed {
                event_name: event_name.to_string(),
                reason: format!("factory returned a callable but method '{}' was requested", method),
            }
            .into()),
            (Materialized::Object(object), None) => Err(EventSystemError::MaterializationFailed {
                event_name: event_name.to_string(),
                reason: format!("factory returned {} without a method name", object.name()),
            }
            .into()),
        }
    }
}

impl fmt::Debug for ClosureFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureFactory")
            .field("key", &self.key())
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// A subscriber as registered with the manager
#[derive(Debug, Clone)]
pub enum Subscriber {
    Callback(Callback),
    Lazy(ClosureFactory),
}

impl Subscriber {
    pub fn key(&self) -> SubscriberKey {
        match self {
            Subscriber::Callback(c) => c.key().clone(),
            Subscriber::Lazy(factory) => factory.key(),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Subscriber::Lazy(_))
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), EventSystemError> {
        match self {
            Subscriber::Lazy(factory) => match factory.method() {
                Some(method) if method.trim().is_empty() => Err(EventSystemError::InvalidSubscriber {
                    actual: "closure factory with an empty method name".to_string(),
                }),
                _ => Ok(()),
            },
            Subscriber::Callback(_) => Ok(()),
        }
    }
}

impl From<Callback> for Subscriber {
    fn from(callback: Callback) -> Self {
        Subscriber::Callback(callback)
    }
}

impl From<ClosureFactory> for Subscriber {
    fn from(factory: ClosureFactory) -> Self {
        Subscriber::Lazy(factory)
    }
}

impl TryFrom<SubscriptionSpec> for Subscriber {
    type Error = EventSystemError;

    fn try_from(spec: SubscriptionSpec) -> std::result::Result<Self, Self::Error> {
        match spec {
            SubscriptionSpec::Callable(subscriber) => Ok(subscriber),
            other => Err(EventSystemError::InvalidSubscriber {
                actual: other.describe(),
            }),
        }
    }
}

/// Subscriber with its dispatch metadata, as stored by the manager
#[derive(Debug, Clone)]
pub struct SubscriberRecord {
    pub subscriber: Subscriber,
    pub priority: i32,
    pub only_once: bool,
    /// Identity at subscribe time; survives materialization
    pub(crate) key: SubscriberKey,
    pub(crate) seq: u64,
}

impl SubscriberRecord {
    pub fn key(&self) -> &SubscriberKey {
        &self.key
    }
}
