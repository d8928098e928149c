//! Watcher Implementation
//!
//! A Watcher watches the value returned by a function and calls a callback
//! when that value changes.
//!
//! # How Watchers Work
//!
//! 1. When created, the watcher evaluates its function immediately, under
//!    tracking, to capture its value and initial dependencies.
//!
//! 2. When a dependency changes, the watcher enqueues itself in the update
//!    scheduler. Nothing runs synchronously.
//!
//! 3. When flushed, the watcher clears its old dependencies, re-evaluates and
//!    tracks new ones. If the value changed it calls `callback(new, old)`.
//!
//! # Change Detection
//!
//! Values compare through [`WatchedValue`]. Composite values (objects,
//! proxies, vectors) are never considered unchanged, since a shallow check
//! cannot prove their contents are the same. Callbacks therefore do not
//! guarantee the data truly changed.
//!
//! # Lazy Watchers
//!
//! A lazy watcher flushes with [`UpdateOrder::Otherwise`], after normal
//! watchers, components and directives of the same context, so it observes
//! already stable state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::context::TrackingScope;
use super::observer::Observed;
use super::runtime::{Runtime, WeakRuntime};
use super::tracker::Computation;
use super::value::{PlainObject, Value};
use crate::error::Result;
use crate::queue::{Updatable, UpdatableContext, UpdatableId, UpdateOrder};

/// Values a watcher can produce.
pub trait WatchedValue: Clone + Send + Sync + 'static {
    /// Whether `self` may be treated as identical to `previous`, so the
    /// watcher callback can be skipped.
    fn is_unchanged_from(&self, previous: &Self) -> bool;
}

macro_rules! impl_watched_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WatchedValue for $ty {
                fn is_unchanged_from(&self, previous: &Self) -> bool {
                    self == previous
                }
            }
        )*
    };
}

impl_watched_by_eq!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str, Arc<str>,
);

impl<T: WatchedValue> WatchedValue for Option<T> {
    fn is_unchanged_from(&self, previous: &Self) -> bool {
        match (self, previous) {
            (None, None) => true,
            (Some(current), Some(previous)) => current.is_unchanged_from(previous),
            _ => false,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> WatchedValue for Vec<T> {
    fn is_unchanged_from(&self, _previous: &Self) -> bool {
        false
    }
}

impl WatchedValue for Value {
    fn is_unchanged_from(&self, previous: &Self) -> bool {
        !self.is_composite() && self.same_as(previous)
    }
}

impl WatchedValue for PlainObject {
    fn is_unchanged_from(&self, _previous: &Self) -> bool {
        false
    }
}

impl WatchedValue for Observed {
    fn is_unchanged_from(&self, _previous: &Self) -> bool {
        false
    }
}

/// Truthiness, used by [`WatcherGroup::watch_until`](super::WatcherGroup::watch_until).
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

macro_rules! impl_truthy_nonzero {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Truthy for $ty {
                fn is_truthy(&self) -> bool {
                    *self != 0
                }
            }
        )*
    };
}

impl_truthy_nonzero!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl Truthy for f32 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for f64 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for &str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Truthy> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().is_some_and(Truthy::is_truthy)
    }
}

impl Truthy for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => f.is_truthy(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Observed(_) => true,
        }
    }
}

type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
type Callback<T> = Box<dyn Fn(&T, Option<&T>) + Send + Sync>;

pub(crate) struct WatcherInner<T: WatchedValue> {
    id: UpdatableId,
    getter: Getter<T>,
    callback: Callback<T>,
    /// Only used to determine update order.
    context: Option<Arc<dyn UpdatableContext>>,
    order: UpdateOrder,
    connected: AtomicBool,
    /// Last value returned from the getter.
    value: RwLock<T>,
    runtime: WeakRuntime,
    weak_self: Weak<WatcherInner<T>>,
}

/// Lifecycle operations a watcher group needs, independent of the value type.
pub(crate) trait Member: Computation {
    fn connect(&self);
    fn disconnect(&self);
}

impl<T: WatchedValue> WatcherInner<T> {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn evaluate(&self) -> T {
        let computation: Weak<dyn Computation> = self.weak_self.clone();
        evaluate(&self.runtime, self.id, computation, &self.getter)
    }
}

fn evaluate<T>(
    runtime: &WeakRuntime,
    id: UpdatableId,
    computation: Weak<dyn Computation>,
    getter: &Getter<T>,
) -> T {
    match runtime.upgrade() {
        Some(runtime) => {
            let _scope = TrackingScope::enter(runtime.tracker(), id, computation);
            getter()
        }
        None => getter(),
    }
}

impl<T: WatchedValue> Updatable for WatcherInner<T> {
    fn updatable_id(&self) -> UpdatableId {
        self.id
    }

    fn update_immediately(&self) -> Result<()> {
        // A disconnected watcher must not re-evaluate, or it would collect
        // dependencies again.
        if !self.is_connected() {
            return Ok(());
        }

        let new_value = self.evaluate();

        let old_value = {
            let mut current = self.value.write();
            if new_value.is_unchanged_from(&*current) {
                return Ok(());
            }
            std::mem::replace(&mut *current, new_value.clone())
        };

        tracing::trace!(watcher = self.id.raw(), "watched value changed");
        (self.callback)(&new_value, Some(&old_value));
        Ok(())
    }
}

impl<T: WatchedValue> Computation for WatcherInner<T> {
    fn update(&self) {
        if !self.is_connected() {
            return;
        }

        let (Some(runtime), Some(me)) = (self.runtime.upgrade(), self.weak_self.upgrade()) else {
            return;
        };
        runtime.enqueue(me, self.context.clone(), self.order);
    }
}

impl<T: WatchedValue> Member for WatcherInner<T> {
    fn connect(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.update();
        }
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Some(runtime) = self.runtime.upgrade() {
                runtime.clear_dependencies_of(self.id);
            }
        }
    }
}

impl<T: WatchedValue> Drop for WatcherInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.clear_dependencies_of(self.id);
        }
    }
}

/// Watches the value returned by a function and calls a callback when it
/// changes.
///
/// Cloning a `Watcher` creates another handle to the same watcher. The
/// watcher stops reacting once every handle (and the group holding it, if
/// any) is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let state = runtime.observe(&PlainObject::new().with("count", 0));
///
/// let reader = state.clone();
/// let watcher = Watcher::new(
///     &runtime,
///     None,
///     move || reader.get("count"),
///     |new, old| println!("{old:?} -> {new:?}"),
/// );
///
/// state.set("count", 1); // callback runs on the next flush
/// ```
pub struct Watcher<T: WatchedValue> {
    inner: Arc<WatcherInner<T>>,
}

impl<T: WatchedValue> Watcher<T> {
    /// Create a watcher and evaluate it immediately.
    ///
    /// `context`, if any, positions the watcher's updates in the flush order.
    pub fn new<F, C>(
        runtime: &Runtime,
        context: Option<Arc<dyn UpdatableContext>>,
        getter: F,
        callback: C,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        Self::build(
            runtime.downgrade(),
            context,
            UpdateOrder::Watcher,
            Box::new(getter),
            Box::new(callback),
        )
    }

    /// Create a lazy watcher: it flushes after every normal watcher, component
    /// and directive of its context.
    pub fn lazy<F, C>(
        runtime: &Runtime,
        context: Option<Arc<dyn UpdatableContext>>,
        getter: F,
        callback: C,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        Self::build(
            runtime.downgrade(),
            context,
            UpdateOrder::Otherwise,
            Box::new(getter),
            Box::new(callback),
        )
    }

    pub(crate) fn build(
        runtime: WeakRuntime,
        context: Option<Arc<dyn UpdatableContext>>,
        order: UpdateOrder,
        getter: Getter<T>,
        callback: Callback<T>,
    ) -> Self {
        let id = UpdatableId::new();

        let inner = Arc::new_cyclic(|weak_self: &Weak<WatcherInner<T>>| {
            let computation: Weak<dyn Computation> = weak_self.clone();
            let value = evaluate(&runtime, id, computation, &getter);

            WatcherInner {
                id,
                getter,
                callback,
                context,
                order,
                connected: AtomicBool::new(true),
                value: RwLock::new(value),
                runtime,
                weak_self: weak_self.clone(),
            }
        });

        Self { inner }
    }

    pub fn id(&self) -> UpdatableId {
        self.inner.id
    }

    /// The order this watcher flushes with inside its context.
    pub fn order(&self) -> UpdateOrder {
        self.inner.order
    }

    /// The last value returned by the watched function.
    pub fn value(&self) -> T {
        self.inner.value.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Enqueue the watcher for re-evaluation, unless disconnected.
    pub fn update(&self) {
        self.inner.update();
    }

    /// Re-evaluate now, calling the callback if the value changed.
    pub fn update_immediately(&self) -> Result<()> {
        self.inner.update_immediately()
    }

    /// Reconnect and enqueue an update to collect fresh dependencies.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Stop reacting and drop every dependency.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub(crate) fn member(&self) -> Arc<dyn Member> {
        self.inner.clone()
    }
}

impl<T: WatchedValue> Clone for Watcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: WatchedValue + std::fmt::Debug> std::fmt::Debug for Watcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("order", &self.inner.order)
            .field("connected", &self.is_connected())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}
