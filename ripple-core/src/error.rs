//! Error types for the Ripple core.

use thiserror::Error;

use crate::queue::UpdatableId;

/// Errors produced by the reactive core.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// `end_tracking` popped a different computation than the one that was
    /// pushed. The tracking stack is corrupted once this happens.
    #[error("unbalanced tracking: expected {expected:?} on top of the stack, found {found:?}")]
    UnbalancedTracking {
        expected: UpdatableId,
        found: Option<UpdatableId>,
    },

    /// An updatable failed while being flushed.
    #[error("update failed: {0}")]
    Update(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Wrap an arbitrary error raised by an updatable.
    pub fn update<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Update(err.into())
    }
}

/// Panic payload raised when a tracking scope finds the stack unbalanced.
///
/// Unlike other panics inside a flush, this one is never isolated: the
/// scheduler resumes it out of the flush session.
pub struct TrackingCorrupted(pub ReactiveError);

impl std::fmt::Debug for TrackingCorrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackingCorrupted({})", self.0)
    }
}

impl std::fmt::Display for TrackingCorrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
