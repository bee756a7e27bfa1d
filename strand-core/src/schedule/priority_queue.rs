//! Binary heap ordered by a caller-supplied urgency test.
//!
//! `std::collections::BinaryHeap` wants `Ord` on the element type. Tasks
//! carry boxed closures and their order is a property of the queue, not of
//! the task, so the comparison lives here instead.

use std::fmt;

/// Returns `true` when `a` should be served before `b`.
pub type Urgency<T> = Box<dyn Fn(&T, &T) -> bool>;

pub struct PriorityQueue<T> {
    heap: Vec<T>,
    is_urgent: Urgency<T>,
}

impl<T> PriorityQueue<T> {
    pub fn new(is_urgent: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            heap: Vec::new(),
            is_urgent: Box::new(is_urgent),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The most urgent element.
    pub fn peek(&self) -> Option<&T> {
        self.heap.first()
    }

    pub fn push(&mut self, item: T) {
        self.heap.push(item);
        self.sift_up(self.heap.len() - 1);
    }

    /// Remove and return the most urgent element.
    pub fn pop(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let top = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        top
    }

    fn sift_up(&mut self, mut at: usize) {
        while at > 0 {
            let parent = (at - 1) / 2;
            if !(self.is_urgent)(&self.heap[at], &self.heap[parent]) {
                break;
            }
            self.heap.swap(at, parent);
            at = parent;
        }
    }

    fn sift_down(&mut self, mut at: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * at + 1;
            let right = left + 1;
            let mut best = at;
            if left < len && (self.is_urgent)(&self.heap[left], &self.heap[best]) {
                best = left;
            }
            if right < len && (self.is_urgent)(&self.heap[right], &self.heap[best]) {
                best = right;
            }
            if best == at {
                break;
            }
            self.heap.swap(at, best);
            at = best;
        }
    }
}

impl<T> fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue").field("len", &self.heap.len()).finish()
    }
}
