//! Update Queue
//!
//! Everything that turns "this needs to update" into an ordered flush:
//!
//! - [`Updatable`] and [`UpdatableContext`]: what can be queued and how it is
//!   positioned.
//! - [`OrderedQueue`]: a deduplicated priority queue over a [`MiniHeap`].
//! - [`CycleValidator`]: caps runaway re-enqueues within one session.
//! - [`UpdateScheduler`]: the stage machine and flush loop.
//! - [`FrameClock`]: the host capability that decides when a flush runs.

mod clock;
mod heap;
mod ordered;
mod scheduler;
mod updatable;
mod validator;

pub use clock::{FrameClock, ManualFrameClock, TokioFrameClock};
pub use heap::MiniHeap;
pub use ordered::{OrderedQueue, QueueEntry};
pub use scheduler::{FlushSession, UpdateScheduler, UpdateStage};
pub use updatable::{TreePosition, Updatable, UpdatableContext, UpdatableId, UpdateOrder};
pub use validator::CycleValidator;
