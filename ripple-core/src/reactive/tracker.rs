//! Dependency Tracker
//!
//! Keeps the stack of computations currently evaluating, and a bidirectional
//! map between tracked objects and the computations that read them.
//!
//! # How It Works
//!
//! 1. A computation about to evaluate clears its old edges and pushes itself
//!    onto the stack.
//!
//! 2. Every tracked read calls [`DependencyTracker::add_dependency`], which
//!    records an edge to whichever computation is on top of the stack.
//!
//! 3. A tracked write calls [`DependencyTracker::notify_changed`], which asks
//!    every dependent computation to schedule itself. Nothing re-evaluates
//!    synchronously.
//!
//! Edges hold weak references, so a dropped computation never keeps firing.
//!
//! # Threads
//!
//! Each thread has its own tracking stack. A computation evaluates
//! synchronously on one thread, so the innermost computation is always the
//! innermost on the calling thread, even while other threads evaluate
//! watchers of the same runtime.

use std::collections::HashMap;
use std::sync::Weak;
use std::thread::{self, ThreadId};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::value::ObjectId;
use crate::error::{ReactiveError, Result};
use crate::queue::{Updatable, UpdatableId};

/// A tracked consumer: something that reads tracked objects while evaluating
/// and must be re-scheduled when they change.
pub trait Computation: Updatable {
    /// One of the objects this computation read has changed.
    fn update(&self);
}

struct StackEntry {
    id: UpdatableId,
    computation: Weak<dyn Computation>,
}

type Stack = SmallVec<[StackEntry; 4]>;

#[derive(Default)]
struct TrackerState {
    /// Evaluating computations, per thread. Empty stacks are removed.
    stacks: HashMap<ThreadId, Stack>,
    /// Object to the computations that read it, in first-read order.
    dependents: HashMap<ObjectId, IndexMap<UpdatableId, Weak<dyn Computation>>>,
    /// Computation to the objects it read.
    dependencies: HashMap<UpdatableId, IndexSet<ObjectId>>,
}

/// Records which computations read which objects.
#[derive(Default)]
pub struct DependencyTracker {
    state: Mutex<TrackerState>,
}

impl TrackerState {
    fn stack(&self) -> Option<&Stack> {
        self.stacks.get(&thread::current().id())
    }

    fn is_evaluating(&self, id: UpdatableId) -> bool {
        self.stacks
            .values()
            .any(|stack| stack.iter().any(|entry| entry.id == id))
    }
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `computation` onto the calling thread's tracking stack.
    pub fn start_tracking(&self, id: UpdatableId, computation: Weak<dyn Computation>) {
        self.state
            .lock()
            .stacks
            .entry(thread::current().id())
            .or_default()
            .push(StackEntry { id, computation });
    }

    /// Pop the calling thread's tracking stack. The popped entry must be `id`.
    pub fn end_tracking(&self, id: UpdatableId) -> Result<()> {
        let popped = {
            let mut state = self.state.lock();
            let thread = thread::current().id();
            let popped = state.stacks.get_mut(&thread).and_then(|stack| stack.pop());
            if state.stacks.get(&thread).is_some_and(|stack| stack.is_empty()) {
                state.stacks.remove(&thread);
            }
            popped.map(|entry| entry.id)
        };

        if popped == Some(id) {
            Ok(())
        } else {
            Err(ReactiveError::UnbalancedTracking {
                expected: id,
                found: popped,
            })
        }
    }

    /// Depth of the calling thread's tracking stack.
    pub fn depth(&self) -> usize {
        self.state.lock().stack().map_or(0, |stack| stack.len())
    }

    /// Drop entries of the calling thread's stack above `depth`.
    pub fn truncate(&self, depth: usize) {
        let mut state = self.state.lock();
        let thread = thread::current().id();
        if let Some(stack) = state.stacks.get_mut(&thread) {
            stack.truncate(depth);
            if stack.is_empty() {
                state.stacks.remove(&thread);
            }
        }
    }

    /// Whether a computation is evaluating on the calling thread.
    pub fn is_tracking(&self) -> bool {
        self.state.lock().stack().is_some_and(|stack| !stack.is_empty())
    }

    /// The computation on top of the calling thread's stack.
    pub fn current(&self) -> Option<UpdatableId> {
        self.state
            .lock()
            .stack()
            .and_then(|stack| stack.last())
            .map(|entry| entry.id)
    }

    /// Record that the current computation read `object`. No-op when nothing
    /// is tracking on the calling thread.
    pub fn add_dependency(&self, object: ObjectId) {
        let mut state = self.state.lock();
        let Some(top) = state.stack().and_then(|stack| stack.last()) else {
            return;
        };
        let id = top.id;
        let computation = top.computation.clone();

        state
            .dependents
            .entry(object)
            .or_default()
            .insert(id, computation);
        state.dependencies.entry(id).or_default().insert(object);
    }

    /// Ask every computation that read `object` to schedule an update.
    pub fn notify_changed(&self, object: ObjectId) {
        let dependents: Vec<(UpdatableId, Weak<dyn Computation>)> = {
            let state = self.state.lock();
            match state.dependents.get(&object) {
                Some(map) => map.iter().map(|(id, c)| (*id, c.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, weak) in dependents {
            match weak.upgrade() {
                Some(computation) => computation.update(),
                None => dead.push(id),
            }
        }

        if dead.is_empty() {
            return;
        }

        // A computation still evaluating its first run cannot upgrade yet.
        let dead: Vec<UpdatableId> = {
            let state = self.state.lock();
            dead.into_iter()
                .filter(|id| !state.is_evaluating(*id))
                .collect()
        };
        for id in dead {
            self.clear_dependencies_of(id);
        }
    }

    /// Remove every edge involving `computation`, in both directions.
    pub fn clear_dependencies_of(&self, computation: UpdatableId) {
        let mut state = self.state.lock();
        let Some(objects) = state.dependencies.remove(&computation) else {
            return;
        };

        for object in objects {
            if let Some(map) = state.dependents.get_mut(&object) {
                map.shift_remove(&computation);
                if map.is_empty() {
                    state.dependents.remove(&object);
                }
            }
        }
    }

    /// Remove every edge involving `object`, in both directions.
    pub fn forget_object(&self, object: ObjectId) {
        let mut state = self.state.lock();
        let Some(computations) = state.dependents.remove(&object) else {
            return;
        };

        for id in computations.keys() {
            if let Some(objects) = state.dependencies.get_mut(id) {
                objects.shift_remove(&object);
                if objects.is_empty() {
                    state.dependencies.remove(id);
                }
            }
        }
    }

    /// Number of objects `computation` currently depends on.
    pub fn dependency_count(&self, computation: UpdatableId) -> usize {
        self.state
            .lock()
            .dependencies
            .get(&computation)
            .map_or(0, IndexSet::len)
    }

    /// Number of computations currently depending on `object`.
    pub fn dependent_count(&self, object: ObjectId) -> usize {
        self.state
            .lock()
            .dependents
            .get(&object)
            .map_or(0, IndexMap::len)
    }

    /// Whether `computation` read `object` during its last evaluation.
    pub fn depends_on(&self, computation: UpdatableId, object: ObjectId) -> bool {
        self.state
            .lock()
            .dependencies
            .get(&computation)
            .is_some_and(|objects| objects.contains(&object))
    }
}

impl std::fmt::Debug for DependencyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DependencyTracker")
            .field("threads", &state.stacks.len())
            .field("objects", &state.dependents.len())
            .field("computations", &state.dependencies.len())
            .finish()
    }
}
