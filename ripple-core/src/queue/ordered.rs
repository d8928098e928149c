//! Ordered, deduplicated queue of pending updatables.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use super::heap::MiniHeap;
use super::{Updatable, UpdatableContext, UpdatableId, UpdateOrder};

/// A queued updatable together with the metadata used to order it.
pub struct QueueEntry {
    pub updatable: Arc<dyn Updatable>,
    pub context: Option<Arc<dyn UpdatableContext>>,
    pub order: UpdateOrder,
    sequence: u64,
}

/// Caches updatable items and hands them out sorted by:
///
/// - no context first (global watchers),
/// - then tree position of the context,
/// - then `order` within one context,
/// - then enqueue order.
pub struct OrderedQueue {
    /// Helps to check whether an updatable is already queued.
    members: HashSet<UpdatableId>,
    heap: MiniHeap<QueueEntry, fn(&QueueEntry, &QueueEntry) -> Ordering>,
    next_sequence: u64,
}

impl OrderedQueue {
    pub fn new() -> Self {
        Self {
            members: HashSet::new(),
            heap: MiniHeap::new(compare_entries as fn(&QueueEntry, &QueueEntry) -> Ordering),
            next_sequence: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn contains(&self, id: UpdatableId) -> bool {
        self.members.contains(&id)
    }

    /// Queue an updatable. Returns `false` if it was already queued.
    pub fn add(
        &mut self,
        updatable: Arc<dyn Updatable>,
        context: Option<Arc<dyn UpdatableContext>>,
        order: UpdateOrder,
    ) -> bool {
        if !self.members.insert(updatable.updatable_id()) {
            return false;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.heap.add(QueueEntry {
            updatable,
            context,
            order,
            sequence,
        });

        true
    }

    /// Remove the first updatable in order.
    pub fn shift(&mut self) -> Option<Arc<dyn Updatable>> {
        let entry = self.heap.remove_head()?;
        self.members.remove(&entry.updatable.updatable_id());
        Some(entry.updatable)
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.heap.clear();
    }
}

impl Default for OrderedQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn same_context(a: &Arc<dyn UpdatableContext>, b: &Arc<dyn UpdatableContext>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn compare_entries(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    let by_context = match (&a.context, &b.context) {
        (None, None) => a.order.cmp(&b.order),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(ca), Some(cb)) if same_context(ca, cb) => a.order.cmp(&b.order),
        (Some(ca), Some(cb)) => {
            let pa = ca.attached_position();
            let pb = cb.attached_position();

            if pa != pb {
                pa.cmp(&pb)
            } else {
                ca.compare_position_with(b.updatable.as_ref())
            }
        }
    };

    by_context.then(a.sequence.cmp(&b.sequence))
}
