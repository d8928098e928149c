//! Runaway update detection.

use std::collections::HashMap;

use super::UpdatableId;

/// Counts how often each updatable is enqueued within one flush session and
/// rejects it once it exceeds the threshold.
#[derive(Debug)]
pub struct CycleValidator {
    max_updates: usize,
    counts: HashMap<UpdatableId, usize>,
}

impl CycleValidator {
    pub fn new(max_updates: usize) -> Self {
        Self {
            max_updates,
            counts: HashMap::new(),
        }
    }

    /// Record an enqueue attempt. Returns `false` once `id` has been enqueued
    /// more than `max_updates` times in the current session.
    pub fn validate(&mut self, id: UpdatableId) -> bool {
        let count = self.counts.entry(id).or_insert(0);
        *count += 1;

        if *count <= self.max_updates {
            return true;
        }

        if *count == self.max_updates + 1 {
            tracing::warn!(
                updatable = id.raw(),
                max_updates = self.max_updates,
                "runaway update cycle detected, ignoring further updates this session"
            );
        }

        false
    }

    /// Number of enqueues recorded for `id` this session.
    pub fn count_of(&self, id: UpdatableId) -> usize {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    /// Forget every count. Called when a flush session ends.
    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
