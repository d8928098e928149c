//! Dynamic Object Model
//!
//! Tracked state is made of [`PlainObject`]s: shared, identity-keyed maps from
//! string keys to [`Value`]s. Cloning a `PlainObject` yields another handle to
//! the same object, so identity survives clones and nesting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::observer::Observed;

/// Identity of a tracked object.
///
/// Every [`PlainObject`] and [`Tracked`](super::Tracked) cell gets one. The
/// dependency tracker records edges between these IDs and computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// A value stored in a [`PlainObject`].
#[derive(Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// A nested object, not wrapped.
    Object(PlainObject),
    /// A nested object that is already behind a proxy.
    Observed(Observed),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for objects and proxies.
    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Observed(_))
    }

    /// Strict equality: primitives by value, objects by identity.
    ///
    /// `Float` follows IEEE rules, so `NaN` never equals itself.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.id() == b.id(),
            (Value::Observed(a), Value::Observed(b)) => a == b,
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The proxy, if this value was returned wrapped.
    pub fn as_observed(&self) -> Option<&Observed> {
        match self {
            Value::Observed(observed) => Some(observed),
            _ => None,
        }
    }

    /// The underlying object, whether wrapped or not.
    pub fn as_object(&self) -> Option<&PlainObject> {
        match self {
            Value::Object(object) => Some(object),
            Value::Observed(observed) => Some(observed.target()),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(object) => write!(f, "Object(#{})", object.id().raw()),
            Value::Observed(observed) => write!(f, "Observed(#{})", observed.id().raw()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<PlainObject> for Value {
    fn from(value: PlainObject) -> Self {
        Value::Object(value)
    }
}

impl From<Observed> for Value {
    fn from(value: Observed) -> Self {
        Value::Observed(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// A shared, mutable, identity-keyed map of fields.
///
/// Reads and writes on a `PlainObject` are raw: they are never tracked. Go
/// through [`Runtime::observe`](super::Runtime::observe) to get an
/// instrumented [`Observed`] handle.
#[derive(Clone, Default)]
pub struct PlainObject {
    id: ObjectId,
    fields: Arc<RwLock<IndexMap<String, Value>>>,
}

impl PlainObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.write().insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Read a field without tracking. Missing keys read as `Null`.
    pub fn get_raw(&self, key: &str) -> Value {
        self.fields.read().get(key).cloned().unwrap_or_default()
    }

    /// Write a field without notifying anyone.
    pub fn set_raw(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.write().insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.fields.read().keys().cloned().collect()
    }

    /// Write `value` unless it equals the current one. Returns whether the
    /// object changed.
    pub(crate) fn replace_if_changed(&self, key: &str, value: Value) -> bool {
        let mut fields = self.fields.write();

        let unchanged = match fields.get(key) {
            Some(current) => current.same_as(&value),
            None => value.is_null(),
        };
        if unchanged {
            return false;
        }

        fields.insert(key.to_owned(), value);
        true
    }

    pub(crate) fn remove(&self, key: &str) -> Option<Value> {
        self.fields.write().shift_remove(key)
    }
}

impl<K, V> FromIterator<(K, V)> for PlainObject
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let fields = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        Self {
            id: ObjectId::new(),
            fields: Arc::new(RwLock::new(fields)),
        }
    }
}

impl PartialEq for PlainObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PlainObject {}

impl fmt::Debug for PlainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainObject")
            .field("id", &self.id)
            .field("fields", &*self.fields.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity_and_fields() {
        let a = PlainObject::new().with("count", 1);
        let b = a.clone();

        b.set_raw("count", 2);
        assert_eq!(a.get_raw("count").as_int(), Some(2));
        assert_eq!(a, b);
        assert_ne!(a, PlainObject::new());
    }

    #[test]
    fn strict_equality_rules() {
        let object = PlainObject::new();

        assert!(Value::from(1).same_as(&Value::Int(1)));
        assert!(!Value::from(1).same_as(&Value::Float(1.0)));
        assert!(Value::from("a").same_as(&Value::from(String::from("a"))));
        assert!(!Value::Float(f64::NAN).same_as(&Value::Float(f64::NAN)));
        assert!(Value::Object(object.clone()).same_as(&Value::Object(object)));
        assert!(!Value::Object(PlainObject::new()).same_as(&Value::Object(PlainObject::new())));
    }

    #[test]
    fn replace_if_changed_suppresses_equal_writes() {
        let object = PlainObject::new().with("count", 0);

        assert!(!object.replace_if_changed("count", Value::Int(0)));
        assert!(object.replace_if_changed("count", Value::Int(1)));
        assert!(!object.replace_if_changed("missing", Value::Null));
        assert!(!object.contains_key("missing"));
    }

    #[test]
    fn builds_from_iterator() {
        let object: PlainObject = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(object.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(object.len(), 2);
    }
}
