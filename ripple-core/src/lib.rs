//! Ripple Core
//!
//! This crate provides the reactive-state engine behind a component
//! framework. It implements:
//!
//! - Dependency tracking over observed objects and tracked cells
//! - Watchers, lazy watchers and watcher groups
//! - An ordered update queue with cycle protection
//! - A frame-driven scheduler with render-complete notifications
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: observed objects, dependency tracking and watchers
//! - `queue`: the priority queue, cycle validator and update scheduler
//! - `config`: runtime tunables
//! - `error`: the crate error type
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ripple_core::queue::TokioFrameClock;
//! use ripple_core::reactive::{PlainObject, Runtime};
//!
//! let runtime = Runtime::new(Arc::new(TokioFrameClock::current(Duration::from_millis(16))));
//!
//! // Observe some state
//! let state = runtime.observe(&PlainObject::new().with("count", 0));
//!
//! // Watch a value derived from it
//! let reader = state.clone();
//! runtime.watch(move || reader.get("count"), |new, old| {
//!     println!("count: {old:?} -> {new:?}");
//! });
//!
//! // Update the state
//! state.set("count", 1);
//! // On the next frame the callback prints: "count: Some(Int(0)) -> Int(1)"
//! runtime.until_render_complete().await;
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result, TrackingCorrupted};
pub use reactive::{Observed, PlainObject, Runtime, Value, Watcher, WatcherGroup};
