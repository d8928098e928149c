//! Frame Clocks
//!
//! The scheduler never decides by itself when a flush runs. It asks a
//! [`FrameClock`] to run a [`FlushSession`] at the host's next rendering
//! opportunity. Two clocks ship with the crate:
//!
//! - [`TokioFrameClock`] spawns the session on a tokio runtime after one
//!   frame interval.
//! - [`ManualFrameClock`] holds sessions until the host calls
//!   [`ManualFrameClock::tick`], for hosts with their own frame loop and for
//!   tests.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::scheduler::FlushSession;
use crate::config::RuntimeConfig;

/// Host capability: run a callback once, timed to the next frame.
pub trait FrameClock: Send + Sync {
    /// Arrange for `session` to run at the next frame tick.
    fn request_frame(&self, session: FlushSession);
}

/// Frame clock backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioFrameClock {
    handle: Handle,
    frame_interval: Duration,
}

impl TokioFrameClock {
    pub fn new(handle: Handle, frame_interval: Duration) -> Self {
        Self {
            handle,
            frame_interval,
        }
    }

    /// Use the tokio runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like [`Handle::current`].
    pub fn current(frame_interval: Duration) -> Self {
        Self::new(Handle::current(), frame_interval)
    }

    /// Use `handle` with the frame interval from `config`.
    pub fn from_config(handle: Handle, config: &RuntimeConfig) -> Self {
        Self::new(handle, config.frame_interval())
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }
}

impl FrameClock for TokioFrameClock {
    fn request_frame(&self, session: FlushSession) {
        let interval = self.frame_interval;
        self.handle.spawn(async move {
            tokio::time::sleep(interval).await;
            session.run().await;
        });
    }
}

/// Frame clock driven explicitly by the host.
#[derive(Default)]
pub struct ManualFrameClock {
    pending: Mutex<Vec<FlushSession>>,
}

impl ManualFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a frame has been requested since the last tick.
    pub fn has_pending_frame(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Run every requested session. Returns how many sessions ran.
    pub async fn tick(&self) -> usize {
        let sessions = std::mem::take(&mut *self.pending.lock());
        let count = sessions.len();

        for session in sessions {
            session.run().await;
        }

        count
    }
}

impl FrameClock for ManualFrameClock {
    fn request_frame(&self, session: FlushSession) {
        self.pending.lock().push(session);
    }
}

impl std::fmt::Debug for ManualFrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualFrameClock")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}
