//! Reactive Runtime
//!
//! The runtime owns everything the reactive layer shares: the dependency
//! tracker, the proxy cache, the update scheduler and the group of global
//! watchers. Proxies, cells and watchers keep a weak handle back to it.
//!
//! # How It Works
//!
//! 1. A watcher evaluates inside a [`TrackingScope`](super::TrackingScope);
//!    every tracked read lands in [`Runtime::track_read`].
//!
//! 2. A tracked write lands in [`Runtime::notify_changed`], which asks every
//!    dependent to enqueue itself with the scheduler.
//!
//! 3. The scheduler requests a frame from its [`FrameClock`] and flushes the
//!    queue in tree order when the frame runs.
//!
//! Each thread keeps its own tracking stack, so watchers may evaluate on
//! several threads of one runtime at once.

use std::future::Future;
use std::sync::{Arc, Weak};

use super::group::{WatchHandle, WatcherGroup};
use super::observer::{ObjectObserver, Observed};
use super::tracked::Tracked;
use super::tracker::{Computation, DependencyTracker};
use super::value::{ObjectId, PlainObject, Value};
use super::watcher::{Truthy, WatchedValue};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::queue::{
    FrameClock, Updatable, UpdatableContext, UpdatableId, UpdateOrder, UpdateScheduler,
    UpdateStage,
};

struct RuntimeInner {
    config: RuntimeConfig,
    tracker: DependencyTracker,
    observer: ObjectObserver,
    scheduler: Arc<UpdateScheduler>,
    /// Watchers with no context.
    global: WatcherGroup,
}

/// Handle to a reactive runtime. Cloning is cheap and shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning handle held by everything the runtime hands out.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new(clock: Arc<dyn FrameClock>) -> Self {
        Self::build(RuntimeConfig::default(), clock)
    }

    /// Create a runtime from `config`, rejecting unusable values.
    pub fn with_config(config: RuntimeConfig, clock: Arc<dyn FrameClock>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: RuntimeConfig, clock: Arc<dyn FrameClock>) -> Self {
        let scheduler = UpdateScheduler::new(&config, clock);

        let inner = Arc::new_cyclic(|weak: &Weak<RuntimeInner>| RuntimeInner {
            tracker: DependencyTracker::new(),
            observer: ObjectObserver::default(),
            scheduler,
            global: WatcherGroup::with_runtime(WeakRuntime(weak.clone()), None),
            config,
        });

        tracing::debug!(
            max_updates_per_session = inner.config.max_updates_per_session,
            frame_interval_ms = inner.config.frame_interval_ms,
            "reactive runtime created"
        );

        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.inner.tracker
    }

    pub fn scheduler(&self) -> &Arc<UpdateScheduler> {
        &self.inner.scheduler
    }

    pub fn stage(&self) -> UpdateStage {
        self.inner.scheduler.stage()
    }

    // Dependency tracking

    pub fn is_tracking(&self) -> bool {
        self.inner.tracker.is_tracking()
    }

    /// Push `computation` onto the tracking stack.
    ///
    /// Prefer [`TrackingScope`](super::TrackingScope), which pops even on
    /// panic.
    pub fn start_tracking(&self, id: UpdatableId, computation: Weak<dyn Computation>) {
        self.inner.tracker.start_tracking(id, computation);
    }

    /// Pop `id` off the tracking stack.
    pub fn end_tracking(&self, id: UpdatableId) -> Result<()> {
        self.inner.tracker.end_tracking(id)
    }

    /// Record that the computation being evaluated read `object`.
    pub fn track_read(&self, object: ObjectId) {
        self.inner.tracker.add_dependency(object);
    }

    /// Ask every computation that read `object` to schedule itself.
    pub fn notify_changed(&self, object: ObjectId) {
        self.inner.tracker.notify_changed(object);
    }

    pub fn clear_dependencies_of(&self, computation: UpdatableId) {
        self.inner.tracker.clear_dependencies_of(computation);
    }

    // Observation

    /// The proxy for `object`. Repeated calls return the same proxy.
    pub fn observe(&self, object: &PlainObject) -> Observed {
        self.inner.observer.observe(&self.downgrade(), object)
    }

    /// Drop the cached proxy for `object` and every edge pointing at it.
    ///
    /// Proxies already handed out keep working, but dependents of the object
    /// are no longer notified by them until they read it again.
    pub fn unobserve(&self, object: &PlainObject) -> bool {
        let removed = self.inner.observer.unobserve(object.id());
        self.inner.tracker.forget_object(object.id());
        removed
    }

    /// Number of cached proxies.
    pub fn observed_count(&self) -> usize {
        self.inner.observer.len()
    }

    /// Wrap an object read out of an observed object.
    pub(crate) fn wrap_nested(&self, object: PlainObject) -> Value {
        if let Some(proxy) = self.inner.observer.cached(object.id()) {
            return Value::Observed(proxy);
        }

        if self.is_tracking() {
            Value::Observed(self.observe(&object))
        } else {
            Value::Object(object)
        }
    }

    /// Create a tracked cell holding `value`.
    pub fn tracked<T>(&self, value: T) -> Tracked<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        Tracked::new(self.downgrade(), value)
    }

    // Scheduling

    /// Queue `updatable` for the next flush. See [`UpdateScheduler::enqueue`].
    pub fn enqueue(
        &self,
        updatable: Arc<dyn Updatable>,
        context: Option<Arc<dyn UpdatableContext>>,
        order: UpdateOrder,
    ) -> bool {
        self.inner.scheduler.enqueue(updatable, context, order)
    }

    /// Call `callback` once every pending update has been flushed.
    pub fn on_render_complete<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.scheduler.on_render_complete(callback);
    }

    /// Resolves once every pending update has been flushed.
    pub fn until_render_complete(&self) -> impl Future<Output = ()> + Send + 'static {
        self.inner.scheduler.until_render_complete()
    }

    // Watchers

    /// A new group whose watchers are ordered by `context`.
    pub fn watcher_group(&self, context: Option<Arc<dyn UpdatableContext>>) -> WatcherGroup {
        WatcherGroup::new(self, context)
    }

    /// The group holding watchers created without a context.
    pub fn global_watchers(&self) -> &WatcherGroup {
        &self.inner.global
    }

    /// Ask every global watcher to re-check its value.
    pub fn update_all_global_watchers(&self) {
        self.inner.global.update();
    }

    /// See [`WatcherGroup::watch`].
    pub fn watch<T, F, C>(&self, getter: F, callback: C) -> WatchHandle
    where
        T: WatchedValue,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        self.inner.global.watch(getter, callback)
    }

    /// See [`WatcherGroup::watch_immediately`].
    pub fn watch_immediately<T, F, C>(&self, getter: F, callback: C) -> WatchHandle
    where
        T: WatchedValue,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        self.inner.global.watch_immediately(getter, callback)
    }

    /// See [`WatcherGroup::watch_once`].
    pub fn watch_once<T, F, C>(&self, getter: F, callback: C) -> WatchHandle
    where
        T: WatchedValue,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        self.inner.global.watch_once(getter, callback)
    }

    /// See [`WatcherGroup::watch_until`].
    pub fn watch_until<T, F, C>(&self, getter: F, callback: C) -> WatchHandle
    where
        T: WatchedValue + Truthy,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.global.watch_until(getter, callback)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("stage", &self.stage())
            .field("observed", &self.observed_count())
            .field("global_watchers", &self.inner.global.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::queue::ManualFrameClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runtime() -> (Runtime, Arc<ManualFrameClock>) {
        let clock = Arc::new(ManualFrameClock::new());
        (Runtime::new(clock.clone()), clock)
    }

    #[test]
    fn rejects_invalid_config() {
        let config = RuntimeConfig {
            max_updates_per_session: 0,
            ..RuntimeConfig::default()
        };
        let result = Runtime::with_config(config, Arc::new(ManualFrameClock::new()));
        assert!(matches!(result, Err(ReactiveError::InvalidConfig(_))));
    }

    #[test]
    fn nested_objects_are_observed_while_tracking() {
        let (runtime, _clock) = runtime();
        let inner = PlainObject::new().with("x", 1);
        let outer = runtime.observe(&PlainObject::new().with("inner", inner.clone()));

        let reader = outer.clone();
        let handle = runtime.watch(
            move || reader.get("inner").as_observed().map(|p| p.get("x")),
            |_, _| {},
        );

        assert_eq!(runtime.observed_count(), 2);
        assert!(matches!(outer.get("inner"), Value::Observed(ref p) if p.id() == inner.id()));
        handle.unwatch();
    }

    #[tokio::test]
    async fn global_watchers_flush_through_the_clock() {
        let (runtime, clock) = runtime();
        let state = runtime.observe(&PlainObject::new().with("count", 0));
        let calls = Arc::new(AtomicUsize::new(0));

        let reader = state.clone();
        let sink = calls.clone();
        runtime.watch(move || reader.get("count"), move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runtime.global_watchers().len(), 1);

        state.set("count", 1);
        assert_eq!(runtime.stage(), UpdateStage::FramePending);
        assert_eq!(clock.tick().await, 1);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.stage(), UpdateStage::Idle);
    }

    #[tokio::test]
    async fn update_all_global_watchers_enqueues_each() {
        let (runtime, clock) = runtime();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let sink = calls.clone();
            runtime.watch(Vec::<i32>::new, move |_, _| {
                sink.fetch_add(1, Ordering::SeqCst);
            });
        }

        runtime.update_all_global_watchers();
        assert_eq!(runtime.scheduler().pending_len(), 3);
        clock.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unobserve_forgets_edges() {
        let (runtime, clock) = runtime();
        let object = PlainObject::new().with("a", 1);
        let proxy = runtime.observe(&object);

        let reader = proxy.clone();
        runtime.watch(move || reader.get("a"), |_, _| {});
        assert_eq!(runtime.tracker().dependent_count(object.id()), 1);

        assert!(runtime.unobserve(&object));
        assert_eq!(runtime.tracker().dependent_count(object.id()), 0);
        assert_eq!(runtime.observed_count(), 0);

        proxy.set("a", 2);
        assert!(!clock.has_pending_frame());
    }
}
