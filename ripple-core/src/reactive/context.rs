//! Tracking Scope
//!
//! RAII guard around one evaluation of a computation. Entering clears the
//! computation's old edges and pushes it onto the tracking stack; dropping
//! pops it again, even if the computation panicked.

use std::sync::Weak;

use super::tracker::{Computation, DependencyTracker};
use crate::error::TrackingCorrupted;
use crate::queue::UpdatableId;

/// Guard that pops the tracking stack when dropped.
///
/// An unbalanced pop means someone pushed or popped the stack by hand inside
/// the scope. The guard restores the stack to its depth on entry, then panics
/// with [`TrackingCorrupted`].
pub struct TrackingScope<'a> {
    tracker: &'a DependencyTracker,
    id: UpdatableId,
    depth: usize,
}

impl<'a> TrackingScope<'a> {
    /// Start a fresh evaluation of `computation`.
    pub fn enter(
        tracker: &'a DependencyTracker,
        id: UpdatableId,
        computation: Weak<dyn Computation>,
    ) -> Self {
        tracker.clear_dependencies_of(id);
        let depth = tracker.depth();
        tracker.start_tracking(id, computation);

        Self { tracker, id, depth }
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.tracker.end_tracking(self.id) {
            self.tracker.truncate(self.depth);
            tracing::error!(error = %err, "tracking stack corrupted");
            if !std::thread::panicking() {
                std::panic::panic_any(TrackingCorrupted(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::queue::Updatable;
    use crate::reactive::value::ObjectId;
    use std::sync::Arc;

    struct Noop(UpdatableId);

    impl Updatable for Noop {
        fn updatable_id(&self) -> UpdatableId {
            self.0
        }

        fn update_immediately(&self) -> Result<()> {
            Ok(())
        }
    }

    impl Computation for Noop {
        fn update(&self) {}
    }

    fn weak_of(noop: &Arc<Noop>) -> Weak<dyn Computation> {
        let weak: Weak<Noop> = Arc::downgrade(noop);
        weak
    }

    #[test]
    fn scope_pushes_and_pops() {
        let tracker = DependencyTracker::new();
        let noop = Arc::new(Noop(UpdatableId::new()));

        {
            let _scope = TrackingScope::enter(&tracker, noop.0, weak_of(&noop));
            assert!(tracker.is_tracking());
            assert_eq!(tracker.current(), Some(noop.0));
        }

        assert!(!tracker.is_tracking());
    }

    #[test]
    fn entering_clears_previous_edges() {
        let tracker = DependencyTracker::new();
        let noop = Arc::new(Noop(UpdatableId::new()));
        let first = ObjectId::new();
        let second = ObjectId::new();

        {
            let _scope = TrackingScope::enter(&tracker, noop.0, weak_of(&noop));
            tracker.add_dependency(first);
        }
        {
            let _scope = TrackingScope::enter(&tracker, noop.0, weak_of(&noop));
            tracker.add_dependency(second);
        }

        assert!(!tracker.depends_on(noop.0, first));
        assert!(tracker.depends_on(noop.0, second));
    }

    #[test]
    fn scope_pops_on_panic() {
        let tracker = DependencyTracker::new();
        let noop = Arc::new(Noop(UpdatableId::new()));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = TrackingScope::enter(&tracker, noop.0, weak_of(&noop));
            panic!("computation failed");
        }));

        assert!(result.is_err());
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn unbalanced_scope_is_fatal() {
        let tracker = DependencyTracker::new();
        let noop = Arc::new(Noop(UpdatableId::new()));
        let intruder = Arc::new(Noop(UpdatableId::new()));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = TrackingScope::enter(&tracker, noop.0, weak_of(&noop));
            tracker.start_tracking(intruder.0, weak_of(&intruder));
        }));

        let payload = result.expect_err("unbalanced scope must panic");
        let corrupted = payload
            .downcast_ref::<TrackingCorrupted>()
            .expect("typed payload");
        assert!(corrupted.to_string().starts_with("unbalanced tracking"));
        assert!(!tracker.is_tracking());
    }
}
