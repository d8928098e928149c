//! Object Observer
//!
//! [`Observed`] is the instrumented view of a [`PlainObject`]: every read is
//! reported to the dependency tracker and every effective write is reported
//! as a change. [`ObjectObserver`] caches one proxy per object identity.
//!
//! # Nested Objects
//!
//! An object read out of an observed object is wrapped lazily: only while a
//! computation is tracking, since nothing could depend on it otherwise. An
//! object that already has a proxy always comes back as that proxy.

use std::fmt;

use dashmap::DashMap;

use super::runtime::WeakRuntime;
use super::value::{ObjectId, PlainObject, Value};

/// Instrumented handle to a [`PlainObject`].
///
/// Obtained from [`Runtime::observe`](super::Runtime::observe). Once the
/// runtime is dropped, reads and writes pass through untracked.
#[derive(Clone)]
pub struct Observed {
    target: PlainObject,
    runtime: WeakRuntime,
}

impl Observed {
    pub(crate) fn new(target: PlainObject, runtime: WeakRuntime) -> Self {
        Self { target, runtime }
    }

    /// Identity of the underlying object.
    pub fn id(&self) -> ObjectId {
        self.target.id()
    }

    /// The underlying object. Access through it is not tracked.
    pub fn target(&self) -> &PlainObject {
        &self.target
    }

    /// Read a field, recording a dependency on this object.
    pub fn get(&self, key: &str) -> Value {
        let value = self.target.get_raw(key);

        let Some(runtime) = self.runtime.upgrade() else {
            return value;
        };
        runtime.track_read(self.id());

        match value {
            Value::Object(object) => runtime.wrap_nested(object),
            other => other,
        }
    }

    /// Write a field. Writes of a value equal to the current one are
    /// dropped and notify nobody.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if !self.target.replace_if_changed(key, value.into()) {
            return;
        }

        if let Some(runtime) = self.runtime.upgrade() {
            runtime.notify_changed(self.id());
        }
    }

    /// Whether the object has `key`, recording a dependency on this object.
    pub fn has(&self, key: &str) -> bool {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track_read(self.id());
        }

        self.target.contains_key(key)
    }

    /// Remove `key` if the object has it, returning the removed value.
    ///
    /// Records a dependency when the key exists. A missing key is a
    /// successful no-op. Deleting does not notify dependents.
    pub fn delete(&self, key: &str) -> Option<Value> {
        if !self.target.contains_key(key) {
            return None;
        }

        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track_read(self.id());
        }

        self.target.remove(key)
    }
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Observed {}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("target", &self.target)
            .finish()
    }
}

/// Cache of proxies, one per object identity.
#[derive(Default)]
pub(crate) struct ObjectObserver {
    proxies: DashMap<ObjectId, Observed>,
}

impl ObjectObserver {
    /// The cached proxy for `object`, creating it on first use.
    pub(crate) fn observe(&self, runtime: &WeakRuntime, object: &PlainObject) -> Observed {
        self.proxies
            .entry(object.id())
            .or_insert_with(|| Observed::new(object.clone(), runtime.clone()))
            .clone()
    }

    pub(crate) fn cached(&self, id: ObjectId) -> Option<Observed> {
        self.proxies.get(&id).map(|entry| entry.value().clone())
    }

    pub(crate) fn unobserve(&self, id: ObjectId) -> bool {
        self.proxies.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.proxies.len()
    }
}
