//! Ordered (priority) queue: like [`super::Buffer`] but unbounded and
//! keyed — used where asynchronous completions need a deterministic
//! order (e.g. memory responses that can complete out of request
//! order but must be delivered in, say, completion-time order).
//!
//! Pending pushes land before a pending pop on commit, same ordering
//! as [`super::Buffer`].

use std::marker::PhantomData;

use crate::clock::ClockId;
use crate::process::ProcessId;

use super::{StorageCell, StorageHeader, StorageId};

pub struct OrderedQueue<T, K> {
    header: StorageHeader,
    /// Kept sorted ascending by key; `front()` is the minimum-key
    /// element. A `Vec` is used rather than a `BinaryHeap` because we
    /// also need stable peek-without-pop access to the minimum and
    /// FIFO tie-breaking among equal keys.
    current: Vec<(K, T)>,
    pending_pushes: Vec<(K, T)>,
    pending_pop: bool,
}

impl<T: 'static, K: Ord + Clone + 'static> OrderedQueue<T, K> {
    pub(crate) fn new(clock: ClockId) -> Self {
        OrderedQueue {
            header: StorageHeader::new(clock),
            current: Vec::new(),
            pending_pushes: Vec::new(),
            pending_pop: false,
        }
    }

    pub(crate) fn front(&self) -> Option<&T> {
        self.current.first().map(|(_, v)| v)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.current.len()
    }

    pub(crate) fn push(&mut self, key: K, value: T) {
        self.pending_pushes.push((key, value));
        self.header.pending = true;
    }

    pub(crate) fn pop(&mut self) {
        self.pending_pop = true;
        self.header.pending = true;
    }
}

impl<T: 'static, K: Ord + Clone + 'static> StorageCell for OrderedQueue<T, K> {
    fn clock(&self) -> ClockId {
        self.header.clock
    }

    fn subscribers(&self) -> &[ProcessId] {
        &self.header.subscribers
    }

    fn add_subscriber(&mut self, process: ProcessId) {
        if !self.header.subscribers.contains(&process) {
            self.header.subscribers.push(process);
        }
    }

    fn has_pending(&self) -> bool {
        self.header.pending
    }

    fn commit(&mut self) -> bool {
        if !self.header.pending {
            return false;
        }
        let was_empty = self.current.is_empty();

        for (k, v) in self.pending_pushes.drain(..) {
            // Stable insertion: among equal keys, earlier-inserted
            // elements stay first (binary_search_by can land on any
            // matching element, so we scan forward from it).
            let mut idx = self.current.partition_point(|(ek, _)| ek < &k);
            while idx < self.current.len() && self.current[idx].0 == k {
                idx += 1;
            }
            self.current.insert(idx, (k, v));
        }

        if self.pending_pop && !self.current.is_empty() {
            self.current.remove(0);
        }
        self.pending_pop = false;

        self.header.pending = false;
        was_empty && !self.current.is_empty()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Typed handle to an [`OrderedQueue`] storage.
pub struct OrderedQueueId<T, K> {
    pub(crate) id: StorageId,
    pub(crate) _marker: PhantomData<fn() -> (T, K)>,
}

impl<T, K> OrderedQueueId<T, K> {
    pub(crate) fn new(id: StorageId) -> Self {
        OrderedQueueId { id, _marker: PhantomData }
    }

    pub fn raw(self) -> StorageId {
        self.id
    }
}

impl<T, K> Clone for OrderedQueueId<T, K> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T, K> Copy for OrderedQueueId<T, K> {}
impl<T, K> std::fmt::Debug for OrderedQueueId<T, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderedQueueId({:?})", self.id)
    }
}
