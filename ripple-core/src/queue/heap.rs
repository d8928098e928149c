//! Comparator-driven binary min-heap.
//!
//! `std::collections::BinaryHeap` needs `Ord` on the element type, but queue
//! entries are ordered by a comparison that consults their contexts, so the
//! heap takes the comparator as a value instead.

use std::cmp::Ordering;

/// A min-heap ordered by a comparator: the head is the element that compares
/// `Less` than every other.
pub struct MiniHeap<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    items: Vec<T>,
    compare: F,
}

impl<T, F> MiniHeap<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// Create an empty heap ordered by `compare`.
    pub fn new(compare: F) -> Self {
        Self {
            items: Vec::new(),
            compare,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert an element.
    pub fn add(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Peek at the smallest element.
    pub fn head(&self) -> Option<&T> {
        self.items.first()
    }

    /// Remove and return the smallest element.
    pub fn remove_head(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }

        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let head = self.items.pop();

        if !self.items.is_empty() {
            self.sift_down(0);
        }

        head
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if (self.compare)(&self.items[index], &self.items[parent]) == Ordering::Less {
                self.items.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();

        loop {
            let left = index * 2 + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len
                && (self.compare)(&self.items[left], &self.items[smallest]) == Ordering::Less
            {
                smallest = left;
            }
            if right < len
                && (self.compare)(&self.items[right], &self.items[smallest]) == Ordering::Less
            {
                smallest = right;
            }
            if smallest == index {
                break;
            }

            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T, F: Fn(&T, &T) -> Ordering>(heap: &mut MiniHeap<T, F>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = heap.remove_head() {
            out.push(item);
        }
        out
    }

    #[test]
    fn pops_in_ascending_order() {
        let mut heap = MiniHeap::new(|a: &i32, b: &i32| a.cmp(b));
        for value in [5, 3, 9, 1, 7, 3, 0] {
            heap.add(value);
        }

        assert_eq!(heap.len(), 7);
        assert_eq!(heap.head(), Some(&0));
        assert_eq!(drain(&mut heap), vec![0, 1, 3, 3, 5, 7, 9]);
        assert!(heap.is_empty());
    }

    #[test]
    fn comparator_decides_the_order() {
        let mut heap = MiniHeap::new(|a: &&str, b: &&str| b.len().cmp(&a.len()));
        heap.add("a");
        heap.add("abc");
        heap.add("ab");

        assert_eq!(drain(&mut heap), vec!["abc", "ab", "a"]);
    }

    #[test]
    fn interleaved_adds_and_removes() {
        let mut heap = MiniHeap::new(|a: &u32, b: &u32| a.cmp(b));
        heap.add(4);
        heap.add(2);
        assert_eq!(heap.remove_head(), Some(2));

        heap.add(1);
        heap.add(3);
        assert_eq!(heap.remove_head(), Some(1));
        assert_eq!(heap.remove_head(), Some(3));
        assert_eq!(heap.remove_head(), Some(4));
        assert_eq!(heap.remove_head(), None);
    }

    #[test]
    fn clear_empties_the_heap() {
        let mut heap = MiniHeap::new(|a: &u8, b: &u8| a.cmp(b));
        heap.add(1);
        heap.add(2);
        heap.clear();

        assert!(heap.is_empty());
        assert_eq!(heap.head(), None);
    }
}
