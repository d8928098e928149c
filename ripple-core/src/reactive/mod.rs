//! Reactive Primitives
//!
//! Automatic dependency tracking over plain objects, and watchers that react
//! to changes through the update queue.
//!
//! # Concepts
//!
//! ## Observed Objects
//!
//! [`Runtime::observe`] wraps a [`PlainObject`] in an [`Observed`] proxy.
//! Reads through the proxy register the object as a dependency of whatever
//! computation is evaluating; writes that change a field notify those
//! computations.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a function under tracking and calls a callback
//! when the result changes. Changes never re-run the function synchronously:
//! the watcher enqueues itself and is flushed by the scheduler.
//!
//! ## Groups
//!
//! A [`WatcherGroup`] binds watchers to one context so they can be connected,
//! disconnected and updated together.
//!
//! # Implementation Notes
//!
//! Every piece holds a weak handle to its [`Runtime`], so dropping the last
//! runtime handle tears the whole graph down. Dependency edges are weak too:
//! a dropped watcher is never notified.

mod context;
mod group;
mod observer;
mod runtime;
mod tracked;
mod tracker;
mod value;
mod watcher;

pub use context::TrackingScope;
pub use group::{WatchHandle, WatcherGroup};
pub use observer::Observed;
pub use runtime::Runtime;
pub use tracked::Tracked;
pub use tracker::{Computation, DependencyTracker};
pub use value::{ObjectId, PlainObject, Value};
pub use watcher::{Truthy, WatchedValue, Watcher};
