//! Updatable contracts.
//!
//! Anything the scheduler can flush implements [`Updatable`]. Renderers that
//! want their updates ordered by tree position hand the scheduler an
//! [`UpdatableContext`] alongside the updatable.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use smallvec::SmallVec;

use crate::error::Result;

/// Unique identifier for an updatable.
///
/// Watchers, components, or any other updatable get one when created. The
/// scheduler deduplicates and counts re-enqueues by this ID, and the
/// dependency tracker keys computations by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpdatableId(u64);

impl UpdatableId {
    /// Generate a new unique ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for UpdatableId {
    fn default() -> Self {
        Self::new()
    }
}

/// A watcher, a component, or anything else that can be updated.
pub trait Updatable: Send + Sync {
    /// Stable identity of this updatable.
    fn updatable_id(&self) -> UpdatableId;

    /// Perform the pending update now.
    ///
    /// Called by the scheduler at most once per enqueue. Errors are logged by
    /// the scheduler and never abort the flush.
    fn update_immediately(&self) -> Result<()>;
}

/// Position of a context within the host's tree.
///
/// A path of child indices from the root. Lexicographic order is document
/// order: an ancestor is a prefix of its descendants and sorts first.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TreePosition(SmallVec<[u32; 8]>);

impl TreePosition {
    /// The root position.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a position from a path of child indices.
    pub fn from_path(path: &[u32]) -> Self {
        Self(SmallVec::from_slice(path))
    }

    /// Position of the `index`-th child of this position.
    pub fn child(&self, index: u32) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    /// Number of ancestors between this position and the root.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &TreePosition) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Debug for TreePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreePosition({:?})", self.0.as_slice())
    }
}

/// Ordering anchor for updatables, normally a rendering component.
///
/// The scheduler queries it while its queue lock is held, so implementations
/// must not call back into the scheduler.
pub trait UpdatableContext: Send + Sync {
    /// Where this context is currently attached in the tree.
    fn attached_position(&self) -> TreePosition;

    /// Compare this context's position with an updatable owned by another
    /// context attached at the same tree position.
    fn compare_position_with(&self, _other: &dyn Updatable) -> Ordering {
        Ordering::Equal
    }
}

/// Update order of items that share a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateOrder {
    /// Update firstly.
    Watcher,

    /// Components update after watchers.
    Component,

    /// Structural directives, like list repeaters.
    Directive,

    /// Update at last.
    Otherwise,
}
