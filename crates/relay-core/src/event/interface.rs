use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::event::error::EventSystemError;
use crate::event::manager::Manager;
use crate::event::subscriber::{Callback, ClosureFactory, Subscriber};
use crate::event::types::Event;
use crate::kernel::error::Result;

/// An object that declares its own subscriptions.
///
/// Method names used in [`SubscriptionSpec::Method`] are dispatched through
/// [`SubscriberInterface::handle`].
pub trait SubscriberInterface: Send + Sync + 'static {
    /// Name used in error messages
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Event name to subscription spec, in declaration order
    fn subscriptions(&self) -> Vec<(String, SubscriptionSpec)>;

    /// Invoke the subscriber method `method`
    fn handle(
        &self,
        method: &str,
        _event: &mut Event,
        _event_name: &str,
        _manager: &Manager,
    ) -> Result<Option<Value>> {
        Err(EventSystemError::UnknownMethod {
            owner: self.name().to_string(),
            method: method.to_string(),
        }
        .into())
    }
}

/// Declarative description of one or more subscriptions for an event.
///
/// Inside a list, fields are recognised by kind rather than position:
/// `[method, true, 5]` and `[method, 5, true]` are equivalent.
#[derive(Clone)]
pub enum SubscriptionSpec {
    /// Method of the declaring object
    Method(String),
    /// Direct callable or closure factory
    Callable(Subscriber),
    /// Priority field of a list entry
    Priority(i32),
    /// Only-once field of a list entry
    OnlyOnce(bool),
    /// A single entry's fields, or a list of entries
    List(Vec<SubscriptionSpec>),
}

impl SubscriptionSpec {
    /// Parse a spec from JSON (strings, integers, booleans and arrays)
    pub fn from_value(value: &Value) -> std::result::Result<Self, EventSystemError> {
        match value {
            Value::String(method) => Ok(SubscriptionSpec::Method(method.clone())),
            Value::Bool(flag) => Ok(SubscriptionSpec::OnlyOnce(*flag)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|p| i32::try_from(p).ok())
                .map(SubscriptionSpec::Priority)
                .ok_or_else(|| EventSystemError::InvalidSubscriber {
                    actual: format!("number {}", n),
                }),
            Value::Array(items) => items
                .iter()
                .map(SubscriptionSpec::from_value)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(SubscriptionSpec::List),
            Value::Null => Err(EventSystemError::InvalidSubscriber {
                actual: "null".to_string(),
            }),
            Value::Object(_) => Err(EventSystemError::InvalidSubscriber {
                actual: "object".to_string(),
            }),
        }
    }

    /// Short description of the spec's kind, for error messages
    pub fn describe(&self) -> String {
        match self {
            SubscriptionSpec::Method(m) => format!("method name '{}'", m),
            SubscriptionSpec::Callable(Subscriber::Callback(_)) => "callable".to_string(),
            SubscriptionSpec::Callable(Subscriber::Lazy(_)) => "closure factory".to_string(),
            SubscriptionSpec::Priority(p) => format!("integer {}", p),
            SubscriptionSpec::OnlyOnce(b) => format!("boolean {}", b),
            SubscriptionSpec::List(items) => format!("list of {} item(s)", items.len()),
        }
    }
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionSpec::List(items) => f.debug_list().entries(items).finish(),
            other => f.write_str(&other.describe()),
        }
    }
}

impl From<&str> for SubscriptionSpec {
    fn from(method: &str) -> Self {
        SubscriptionSpec::Method(method.to_string())
    }
}

impl From<String> for SubscriptionSpec {
    fn from(method: String) -> Self {
        SubscriptionSpec::Method(method)
    }
}

impl From<i32> for SubscriptionSpec {
    fn from(priority: i32) -> Self {
        SubscriptionSpec::Priority(priority)
    }
}

impl From<bool> for SubscriptionSpec {
    fn from(only_once: bool) -> Self {
        SubscriptionSpec::OnlyOnce(only_once)
    }
}

impl From<Callback> for SubscriptionSpec {
    fn from(callback: Callback) -> Self {
        SubscriptionSpec::Callable(Subscriber::Callback(callback))
    }
}

impl From<ClosureFactory> for SubscriptionSpec {
    fn from(factory: ClosureFactory) -> Self {
        SubscriptionSpec::Callable(Subscriber::Lazy(factory))
    }
}

impl From<Vec<SubscriptionSpec>> for SubscriptionSpec {
    fn from(items: Vec<SubscriptionSpec>) -> Self {
        SubscriptionSpec::List(items)
    }
}

/// A normalized subscription, ready for `Manager::subscribe`
#[derive(Debug, Clone)]
pub struct Subscription {
    pub subscriber: Subscriber,
    pub priority: i32,
    pub only_once: bool,
}

/// Normalized subscriptions keyed by event name
pub type SubscriptionMap = BTreeMap<String, Vec<Subscription>>;

/// Turns a [`SubscriberInterface`]'s declarations into subscriptions
pub struct InterfaceManager;

impl InterfaceManager {
    /// Normalize every declared subscription of `owner`.
    ///
    /// Fails on the first malformed spec, naming the event and the owner.
    pub fn normalize(owner: &Arc<dyn SubscriberInterface>) -> std::result::Result<SubscriptionMap, EventSystemError> {
        let mut normalized = SubscriptionMap::new();
        for (event_name, spec) in owner.subscriptions() {
            let description = spec.describe();
            let entries = Self::normalize_spec(owner, spec).ok_or_else(|| {
                EventSystemError::InvalidSubscription {
                    event_name: event_name.clone(),
                    owner: owner.name().to_string(),
                    reason: format!("unsupported subscription shape: {}", description),
                }
            })?;
            normalized.entry(event_name).or_default().extend(entries);
        }
        Ok(normalized)
    }

    fn normalize_spec(owner: &Arc<dyn SubscriberInterface>, spec: SubscriptionSpec) -> Option<Vec<Subscription>> {
        match spec {
            SubscriptionSpec::Method(_) | SubscriptionSpec::Callable(_) => {
                Self::entry(owner, vec![spec]).map(|entry| vec![entry])
            }
            SubscriptionSpec::List(items) if items.is_empty() => None,
            SubscriptionSpec::List(items) => {
                if items.iter().all(|item| matches!(item, SubscriptionSpec::List(_))) {
                    items
                        .into_iter()
                        .map(|item| match item {
                            SubscriptionSpec::List(fields) => Self::entry(owner, fields),
                            _ => None,
                        })
                        .collect()
                } else {
                    Self::entry(owner, items).map(|entry| vec![entry])
                }
            }
            SubscriptionSpec::Priority(_) | SubscriptionSpec::OnlyOnce(_) => None,
        }
    }

    /// Match one entry's fields by kind; each kind may appear at most once.
    fn entry(owner: &Arc<dyn SubscriberInterface>, fields: Vec<SubscriptionSpec>) -> Option<Subscription> {
        let mut subscriber = None;
        let mut priority = None;
        let mut only_once = None;
        for field in fields {
            match field {
                SubscriptionSpec::Method(method) if subscriber.is_none() => {
                    subscriber = Some(Subscriber::Callback(Callback::method(owner.clone(), method)));
                }
                SubscriptionSpec::Callable(callable) if subscriber.is_none() => {
                    subscriber = Some(callable);
                }
                SubscriptionSpec::Priority(p) if priority.is_none() => priority = Some(p),
                SubscriptionSpec::OnlyOnce(b) if only_once.is_none() => only_once = Some(b),
                _ => return None,
            }
        }
        Some(Subscription {
            subscriber: subscriber?,
            priority: priority.unwrap_or(0),
            only_once: only_once.unwrap_or(false),
        })
    }
}
