//! Update Scheduler
//!
//! The scheduler batches every pending update into flush sessions aligned to
//! the host's frame clock.
//!
//! # Ordering
//!
//! Updating a parent component may cause child watchers to change, so the
//! order that avoids double updates is:
//!
//! 1. parent watchers,
//! 2. parent components,
//! 3. parent directives and lazy watchers,
//! 4. child watchers,
//! 5. child components, and so on down the tree.
//!
//! [`OrderedQueue`] implements that order.
//!
//! # Flush Protocol
//!
//! 1. The first enqueue while `Idle` requests a frame and moves to
//!    `FramePending`.
//! 2. When the frame fires the stage becomes `Flushing`. The queue is drained
//!    item by item, yielding to the executor after each one so hosts can
//!    finish attaching or detaching nodes. Items may enqueue more items.
//! 3. Once the queue is empty, render-complete callbacks run.
//! 4. Steps 2 and 3 repeat until both are empty. The emptiness check, the
//!    validator reset and the return to `Idle` happen under one lock, so an
//!    enqueue never observes `Idle` while work is pending.
//!
//! Errors and panics of single items are logged and the flush goes on. A
//! [`TrackingCorrupted`] panic is the exception: it is resumed out of the
//! session, which leaves the scheduler in `Flushing` for good.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::clock::FrameClock;
use super::ordered::OrderedQueue;
use super::validator::CycleValidator;
use super::{Updatable, UpdatableContext, UpdateOrder};
use crate::config::RuntimeConfig;
use crate::error::{Result, TrackingCorrupted};

/// What the scheduler is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    /// No update tasks.
    Idle,

    /// A frame has been requested; the flush starts when it fires.
    FramePending,

    /// A flush session is running.
    Flushing,
}

type RenderCallback = Box<dyn FnOnce() + Send>;

struct SchedulerState {
    queue: OrderedQueue,
    validator: CycleValidator,
    render_callbacks: Vec<RenderCallback>,
    stage: UpdateStage,
}

/// Orders and flushes pending updatables.
pub struct UpdateScheduler {
    state: Mutex<SchedulerState>,
    clock: Arc<dyn FrameClock>,
    weak_self: Weak<UpdateScheduler>,
}

impl UpdateScheduler {
    /// Create a scheduler that requests frames from `clock`.
    pub fn new(config: &RuntimeConfig, clock: Arc<dyn FrameClock>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            state: Mutex::new(SchedulerState {
                queue: OrderedQueue::new(),
                validator: CycleValidator::new(config.max_updates_per_session),
                render_callbacks: Vec::new(),
                stage: UpdateStage::Idle,
            }),
            clock,
            weak_self: weak_self.clone(),
        })
    }

    /// Current stage.
    pub fn stage(&self) -> UpdateStage {
        self.state.lock().stage
    }

    /// Number of updatables waiting to be flushed.
    pub fn pending_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Queue `updatable` for the next flush.
    ///
    /// Returns `false` if it is already queued or the cycle validator rejected
    /// it.
    pub fn enqueue(
        &self,
        updatable: Arc<dyn Updatable>,
        context: Option<Arc<dyn UpdatableContext>>,
        order: UpdateOrder,
    ) -> bool {
        let id = updatable.updatable_id();

        let needs_frame = {
            let mut state = self.state.lock();

            if state.queue.contains(id) {
                return false;
            }
            if !state.validator.validate(id) {
                return false;
            }

            state.queue.add(updatable, context, order);
            tracing::trace!(updatable = id.raw(), ?order, "enqueued update");

            Self::claim_frame(&mut state)
        };

        if needs_frame {
            self.request_frame();
        }

        true
    }

    /// Call `callback` after every pending update has been flushed.
    pub fn on_render_complete<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let needs_frame = {
            let mut state = self.state.lock();
            state.render_callbacks.push(Box::new(callback));
            Self::claim_frame(&mut state)
        };

        if needs_frame {
            self.request_frame();
        }
    }

    /// Resolves after every pending update has been flushed.
    ///
    /// The callback is registered immediately, not on first poll.
    pub fn until_render_complete(&self) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.on_render_complete(move || {
            let _ = tx.send(());
        });

        async move {
            let _ = rx.await;
        }
    }

    fn claim_frame(state: &mut SchedulerState) -> bool {
        if state.stage == UpdateStage::Idle {
            state.stage = UpdateStage::FramePending;
            true
        } else {
            false
        }
    }

    fn request_frame(&self) {
        self.clock.request_frame(FlushSession {
            scheduler: self.weak_self.clone(),
        });
    }

    /// Run one flush session to quiescence.
    async fn flush(&self) {
        self.state.lock().stage = UpdateStage::Flushing;
        tracing::debug!("flush session started");

        let mut flushed = 0usize;
        let mut callbacks_run = 0usize;

        loop {
            // Updating may enqueue more watchers or components.
            loop {
                let next = self.state.lock().queue.shift();
                let Some(updatable) = next else {
                    break;
                };

                let id = updatable.updatable_id();
                tracing::trace!(updatable = id.raw(), "flushing update");
                run_isolated("updatable", || updatable.update_immediately());
                flushed += 1;

                // Let the host settle newly attached or detached nodes.
                tokio::task::yield_now().await;
            }

            let callbacks = std::mem::take(&mut self.state.lock().render_callbacks);
            for callback in callbacks {
                run_isolated("render-complete callback", || {
                    callback();
                    Ok(())
                });
                callbacks_run += 1;
            }

            tokio::task::yield_now().await;

            let finished = {
                let mut state = self.state.lock();
                if state.queue.is_empty() && state.render_callbacks.is_empty() {
                    state.validator.clear();
                    state.stage = UpdateStage::Idle;
                    true
                } else {
                    false
                }
            };

            if finished {
                break;
            }
        }

        tracing::debug!(flushed, callbacks_run, "flush session finished");
    }
}

impl std::fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("UpdateScheduler")
            .field("stage", &state.stage)
            .field("pending", &state.queue.len())
            .field("render_callbacks", &state.render_callbacks.len())
            .finish()
    }
}

/// A scheduled flush, handed to a [`FrameClock`].
///
/// Holds only a weak reference: a session outliving its scheduler does
/// nothing.
pub struct FlushSession {
    scheduler: Weak<UpdateScheduler>,
}

impl FlushSession {
    /// Run the flush session.
    pub async fn run(self) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.flush().await;
        }
    }
}

fn run_isolated<F>(what: &'static str, f: F)
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(error = %err, "{what} failed during flush");
        }
        Err(payload) if payload.is::<TrackingCorrupted>() => {
            tracing::error!("{what} corrupted the tracking stack, aborting flush");
            resume_unwind(payload);
        }
        Err(payload) => {
            tracing::error!(panic = panic_message(payload.as_ref()), "{what} panicked during flush");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
