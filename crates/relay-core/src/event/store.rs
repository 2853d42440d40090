use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Computes a value for a key that has no stored value
pub type Resolver = Arc<dyn Fn(&ValueStore) -> Option<Value> + Send + Sync>;

/// Hook invoked after every `set_value`
pub type SetHook = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Ordered key/value container with computed-field fallback.
///
/// Stored values win over resolvers: a resolver registered for `key` is only
/// consulted when nothing has been stored under `key`. Full exports are
/// sorted by key.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ValueStore {
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    resolvers: HashMap<String, Resolver>,
    #[serde(skip)]
    on_set: Option<SetHook>,
}

impl ValueStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from an existing map
    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Register a computed-field resolver for `key`
    pub fn with_resolver<F>(mut self, key: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(&ValueStore) -> Option<Value> + Send + Sync + 'static,
    {
        self.resolvers.insert(key.into(), Arc::new(resolver));
        self
    }

    /// Register the hook called after each `set_value`
    pub fn with_on_set<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.on_set = Some(Arc::new(hook));
        self
    }

    /// Get a value, falling back to the key's resolver when nothing is stored.
    ///
    /// Predicate keys (`isFoo`) ask their resolver first, even over a stored value.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let resolver = self.resolvers.get(key);
        if is_predicate_key(key) {
            if let Some(computed) = resolver.and_then(|resolver| resolver(self)) {
                return Some(computed);
            }
        }
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        resolver.and_then(|resolver| resolver(self))
    }

    /// Borrow the stored value, ignoring resolvers
    pub fn raw_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a value deserialized into `T`
    pub fn get_as<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.get_value(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Upsert a value and run the `on_set` hook
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(hook) = &self.on_set {
            hook(&key, &value);
        }
        self.values.insert(key, value);
    }

    /// Upsert every entry of `values`
    pub fn merge(&mut self, values: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in values {
            self.set_value(key, value);
        }
    }

    /// Remove a stored value
    pub fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Check whether a value is stored or computable for `key`
    pub fn has_value(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.resolvers.contains_key(key)
    }

    /// Check whether a value is stored for `key`
    pub fn has_raw_value(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// All stored values, sorted by key
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Replace all stored values (hook is not run)
    pub fn import(&mut self, values: BTreeMap<String, Value>) {
        self.values = values;
    }

    /// Export all stored values as a JSON object
    pub fn export(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut resolvers: Vec<&String> = self.resolvers.keys().collect();
        resolvers.sort();
        f.debug_struct("ValueStore")
            .field("values", &self.values)
            .field("resolvers", &resolvers)
            .field("has_on_set", &self.on_set.is_some())
            .finish()
    }
}

impl From<BTreeMap<String, Value>> for ValueStore {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self::from_values(values)
    }
}

/// `isFoo`-style key: `is` followed by an uppercase letter
fn is_predicate_key(key: &str) -> bool {
    key.strip_prefix("is")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_uppercase())
}
