//! Tracked Cells
//!
//! A [`Tracked<T>`] is a typed alternative to observing a [`PlainObject`]:
//! one value behind explicit accessors, sharing the runtime's dependency
//! tracker.
//!
//! 1. `get()` records a dependency of the current computation on the cell.
//!
//! 2. `set()` writes and notifies dependents, unless the new value equals the
//!    current one.
//!
//! [`PlainObject`]: super::PlainObject

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::WeakRuntime;
use super::value::ObjectId;

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = runtime.tracked(0);
///
/// runtime.watch(move || count.get() * 2, |doubled, _| println!("{doubled}"));
///
/// count.set(5); // prints 10 after the next flush
/// ```
pub struct Tracked<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    id: ObjectId,
    value: Arc<RwLock<T>>,
    runtime: WeakRuntime,
}

impl<T> Tracked<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(runtime: WeakRuntime, value: T) -> Self {
        Self {
            id: ObjectId::new(),
            value: Arc::new(RwLock::new(value)),
            runtime,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Get the current value, recording a dependency.
    pub fn get(&self) -> T {
        self.track();
        self.value.read().clone()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Call `f` with the current value, recording a dependency.
    ///
    /// `f` sees a snapshot, so it may write to this cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.get())
    }

    /// Set a new value. Returns whether it differed from the old one; only
    /// then are dependents notified.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }

        if let Some(runtime) = self.runtime.upgrade() {
            runtime.notify_changed(self.id);
        }
        true
    }

    /// Derive the next value from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.get_untracked());
        self.set(next)
    }

    fn track(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track_read(self.id);
        }
    }
}

impl<T> Clone for Tracked<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> Debug for Tracked<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked")
            .field("id", &self.id)
            .field("value", &*self.value.read())
            .finish()
    }
}
