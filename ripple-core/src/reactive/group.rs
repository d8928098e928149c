//! Watcher Groups
//!
//! A [`WatcherGroup`] manages several watchers bound to one context (or to no
//! context, for global watchers), so they can be connected, disconnected and
//! updated together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::runtime::{Runtime, WeakRuntime};
use super::watcher::{Member, Truthy, WatchedValue, Watcher};
use crate::queue::{UpdatableContext, UpdatableId, UpdateOrder};

struct GroupInner {
    runtime: WeakRuntime,
    /// Shared by every watcher created through the group.
    context: Option<Arc<dyn UpdatableContext>>,
    connected: AtomicBool,
    members: Mutex<IndexMap<UpdatableId, Arc<dyn Member>>>,
}

impl GroupInner {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn add_member(&self, member: Arc<dyn Member>) {
        if self.is_connected() {
            member.connect();
        } else {
            member.disconnect();
        }

        self.members.lock().insert(member.updatable_id(), member);
    }

    fn delete_member(&self, id: UpdatableId) {
        let removed = self.members.lock().shift_remove(&id);

        if let Some(member) = removed {
            if self.is_connected() {
                member.disconnect();
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Member>> {
        self.members.lock().values().cloned().collect()
    }
}

/// Removes one watcher from its group.
///
/// Holds the group weakly: unwatching after the group is gone does nothing.
#[derive(Clone)]
pub struct WatchHandle {
    group: Weak<GroupInner>,
    watcher: Option<UpdatableId>,
}

impl WatchHandle {
    /// A handle that unwatches nothing.
    pub fn noop() -> Self {
        Self {
            group: Weak::new(),
            watcher: None,
        }
    }

    /// The watcher this handle removes, if any.
    pub fn watcher_id(&self) -> Option<UpdatableId> {
        self.watcher
    }

    /// Delete the watcher from its group, disconnecting it.
    pub fn unwatch(&self) {
        let (Some(group), Some(id)) = (self.group.upgrade(), self.watcher) else {
            return;
        };
        group.delete_member(id);
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("watcher", &self.watcher)
            .finish()
    }
}

/// Watchers sharing a context and a connected state.
///
/// A group starts connected. Cloning yields another handle to the same group;
/// the group's watchers live as long as any handle does.
#[derive(Clone)]
pub struct WatcherGroup {
    inner: Arc<GroupInner>,
}

impl WatcherGroup {
    /// Create an empty, connected group whose watchers are ordered by
    /// `context`.
    pub fn new(runtime: &Runtime, context: Option<Arc<dyn UpdatableContext>>) -> Self {
        Self::with_runtime(runtime.downgrade(), context)
    }

    pub(crate) fn with_runtime(
        runtime: WeakRuntime,
        context: Option<Arc<dyn UpdatableContext>>,
    ) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                runtime,
                context,
                connected: AtomicBool::new(true),
                members: Mutex::new(IndexMap::new()),
            }),
        }
    }

    pub fn context(&self) -> Option<&Arc<dyn UpdatableContext>> {
        self.inner.context.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn len(&self) -> usize {
        self.inner.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.lock().is_empty()
    }

    pub fn contains(&self, id: UpdatableId) -> bool {
        self.inner.members.lock().contains_key(&id)
    }

    /// Add a watcher, matching its connected state to the group's.
    pub fn add<T: WatchedValue>(&self, watcher: &Watcher<T>) -> WatchHandle {
        self.inner.add_member(watcher.member());
        self.handle_for(watcher.id())
    }

    /// Remove a watcher, disconnecting it if the group is connected.
    pub fn delete<T: WatchedValue>(&self, watcher: &Watcher<T>) {
        if self.is_connected() {
            watcher.disconnect();
        }
        self.inner.members.lock().shift_remove(&watcher.id());
    }

    /// Connect every watcher. No-op if already connected.
    pub fn connect(&self) {
        if !self.inner.connected.swap(true, Ordering::SeqCst) {
            for member in self.inner.snapshot() {
                member.connect();
            }
        }
    }

    /// Disconnect every watcher. No-op if already disconnected.
    pub fn disconnect(&self) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            for member in self.inner.snapshot() {
                member.disconnect();
            }
        }
    }

    /// Ask every watcher to re-check its value.
    pub fn update(&self) {
        for member in self.inner.snapshot() {
            member.update();
        }
    }

    /// Create a watcher in this group.
    pub fn watch<T, F, C>(&self, getter: F, callback: C) -> WatchHandle
    where
        T: WatchedValue,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        let watcher = self.build(getter, callback);
        self.add(&watcher)
    }

    /// Create a watcher in this group and call `callback(value, None)` right
    /// away.
    pub fn watch_immediately<T, F, C>(&self, getter: F, callback: C) -> WatchHandle
    where
        T: WatchedValue,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let shared = Arc::clone(&callback);
        let watcher = self.build(getter, move |new: &T, old: Option<&T>| shared(new, old));

        callback(&watcher.value(), None);
        self.add(&watcher)
    }

    /// Create a watcher in this group that calls `callback` only once, then
    /// removes itself.
    pub fn watch_once<T, F, C>(&self, getter: F, callback: C) -> WatchHandle
    where
        T: WatchedValue,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        let slot: Arc<OnceLock<WatchHandle>> = Arc::new(OnceLock::new());
        let unwatch = Arc::clone(&slot);

        let watcher = self.build(getter, move |new: &T, old: Option<&T>| {
            callback(new, old);
            if let Some(handle) = unwatch.get() {
                handle.unwatch();
            }
        });

        let handle = self.add(&watcher);
        let _ = slot.set(handle.clone());
        handle
    }

    /// Call `callback` once the watched value becomes truthy, then stop.
    ///
    /// If the value is already truthy, `callback` runs synchronously and no
    /// watcher is ever enqueued.
    pub fn watch_until<T, F, C>(&self, getter: F, callback: C) -> WatchHandle
    where
        T: WatchedValue + Truthy,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let slot: Arc<OnceLock<WatchHandle>> = Arc::new(OnceLock::new());

        let shared = Arc::clone(&callback);
        let unwatch = Arc::clone(&slot);
        let watcher = self.build(getter, move |new: &T, _old: Option<&T>| {
            if new.is_truthy() {
                shared(new);
                if let Some(handle) = unwatch.get() {
                    handle.unwatch();
                }
            }
        });

        let value = watcher.value();
        if value.is_truthy() {
            watcher.disconnect();
            callback(&value);
            return WatchHandle::noop();
        }

        let handle = self.add(&watcher);
        let _ = slot.set(handle.clone());
        handle
    }

    fn build<T, F, C>(&self, getter: F, callback: C) -> Watcher<T>
    where
        T: WatchedValue,
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        Watcher::build(
            self.inner.runtime.clone(),
            self.inner.context.clone(),
            UpdateOrder::Watcher,
            Box::new(getter),
            Box::new(callback),
        )
    }

    fn handle_for(&self, id: UpdatableId) -> WatchHandle {
        WatchHandle {
            group: Arc::downgrade(&self.inner),
            watcher: Some(id),
        }
    }
}

impl std::fmt::Debug for WatcherGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherGroup")
            .field("connected", &self.is_connected())
            .field("watchers", &self.len())
            .field("has_context", &self.inner.context.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ManualFrameClock, UpdateStage};
    use std::sync::atomic::AtomicUsize;

    fn runtime() -> (Runtime, Arc<ManualFrameClock>) {
        let clock = Arc::new(ManualFrameClock::new());
        (Runtime::new(clock.clone()), clock)
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (count.clone(), count)
    }

    #[tokio::test]
    async fn watch_and_unwatch() {
        let (runtime, clock) = runtime();
        let group = WatcherGroup::new(&runtime, None);
        let cell = runtime.tracked(0);
        let reader = cell.clone();
        let (calls, sink) = counter();

        let handle = group.watch(move || reader.get(), move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(group.len(), 1);

        cell.set(1);
        clock.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.unwatch();
        assert!(group.is_empty());
        cell.set(2);
        assert!(!clock.has_pending_frame());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_and_connect_propagate() {
        let (runtime, clock) = runtime();
        let group = WatcherGroup::new(&runtime, None);
        let cell = runtime.tracked(0);
        let (calls, sink) = counter();

        let reader = cell.clone();
        group.watch(move || reader.get(), move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        group.disconnect();
        group.disconnect();
        assert!(!group.is_connected());
        cell.set(1);
        assert!(!clock.has_pending_frame());

        group.connect();
        assert!(clock.has_pending_frame());
        clock.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn added_watchers_follow_group_state() {
        let (runtime, _clock) = runtime();
        let group = WatcherGroup::new(&runtime, None);
        group.disconnect();

        let watcher = Watcher::new(&runtime, None, || 1, |_, _| {});
        group.add(&watcher);
        assert!(!watcher.is_connected());

        group.connect();
        assert!(watcher.is_connected());

        group.delete(&watcher);
        assert!(!watcher.is_connected());
        assert!(!group.contains(watcher.id()));
    }

    #[tokio::test]
    async fn watch_immediately_calls_back_synchronously() {
        let (runtime, _clock) = runtime();
        let group = WatcherGroup::new(&runtime, None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        group.watch_immediately(|| 5, move |new: &i32, old: Option<&i32>| {
            sink.lock().push((*new, old.copied()));
        });

        assert_eq!(*seen.lock(), vec![(5, None)]);
    }

    #[tokio::test]
    async fn watch_once_fires_a_single_time() {
        let (runtime, clock) = runtime();
        let group = WatcherGroup::new(&runtime, None);
        let cell = runtime.tracked(0);
        let reader = cell.clone();
        let (calls, sink) = counter();

        group.watch_once(move || reader.get(), move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(1);
        clock.tick().await;
        cell.set(2);
        clock.tick().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn watch_until_waits_for_truth() {
        let (runtime, clock) = runtime();
        let group = WatcherGroup::new(&runtime, None);
        let ready = runtime.tracked(false);
        let reader = ready.clone();
        let (calls, sink) = counter();

        group.watch_until(move || reader.get(), move |value: &bool| {
            assert!(*value);
            sink.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        ready.set(true);
        clock.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(group.is_empty());

        ready.set(false);
        ready.set(true);
        clock.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn watch_until_already_true_never_enqueues() {
        let (runtime, clock) = runtime();
        let group = WatcherGroup::new(&runtime, None);
        let ready = runtime.tracked(true);
        let reader = ready.clone();
        let (calls, sink) = counter();

        let handle = group.watch_until(move || reader.get(), move |_: &bool| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.watcher_id().is_none());
        assert!(group.is_empty());
        assert_eq!(runtime.stage(), UpdateStage::Idle);
        assert!(!clock.has_pending_frame());

        ready.set(false);
        assert!(!clock.has_pending_frame());
    }

    #[tokio::test]
    async fn update_rechecks_every_member() {
        let (runtime, clock) = runtime();
        let group = WatcherGroup::new(&runtime, None);
        let (calls, sink) = counter();

        let first = sink.clone();
        group.watch(|| vec![1], move |_, _| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        group.watch(|| vec![2], move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        group.update();
        clock.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
