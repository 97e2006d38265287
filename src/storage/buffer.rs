//! Bounded FIFO buffer. Pending pushes land before a pending pop is
//! applied on commit, so a push and a pop buffered in the same cycle
//! can momentarily bring the buffer to capacity before the pop frees a
//! slot again — this is what lets [`Buffer::max_observed_size`] reflect
//! true peak occupancy. The post-pop resting size must never exceed
//! capacity — violating that is a programming error (a process pushed
//! into a buffer it had not verified had room), so it panics rather
//! than silently dropping data.

use std::collections::VecDeque;
use std::marker::PhantomData;

use crate::clock::ClockId;
use crate::process::ProcessId;

use super::{StorageCell, StorageHeader, StorageId};

pub struct Buffer<T> {
    header: StorageHeader,
    capacity: usize,
    current: VecDeque<T>,
    pending_pushes: Vec<T>,
    pending_pop: bool,
    max_observed_size: usize,
}

impl<T: 'static> Buffer<T> {
    pub(crate) fn new(clock: ClockId, capacity: usize) -> Self {
        Buffer {
            header: StorageHeader::new(clock),
            capacity,
            current: VecDeque::with_capacity(capacity),
            pending_pushes: Vec::new(),
            pending_pop: false,
            max_observed_size: 0,
        }
    }

    pub(crate) fn front(&self) -> Option<&T> {
        self.current.front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.current.len()
    }

    pub(crate) fn max_observed_size(&self) -> usize {
        self.max_observed_size
    }

    /// Buffer an append for the next update. Returns `false` without
    /// buffering anything if the buffer has no room, accounting for a
    /// pop already buffered this cycle (so a push racing a pop on a
    /// full buffer is allowed, matching a hardware FIFO's behavior).
    pub(crate) fn push(&mut self, value: T) -> bool {
        let effective_size =
            self.current.len() - usize::from(self.pending_pop) + self.pending_pushes.len();
        if effective_size >= self.capacity {
            return false;
        }
        self.pending_pushes.push(value);
        self.header.pending = true;
        true
    }

    /// Buffer a pop of the current front element for the next update.
    pub(crate) fn pop(&mut self) {
        self.pending_pop = true;
        self.header.pending = true;
    }
}

impl<T: 'static> StorageCell for Buffer<T> {
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

        for v in self.pending_pushes.drain(..) {
            self.current.push_back(v);
        }
        self.max_observed_size = self.max_observed_size.max(self.current.len());

        if self.pending_pop {
            self.current.pop_front();
            self.pending_pop = false;
        }
        assert!(
            self.current.len() <= self.capacity,
            "buffer overflowed its capacity during commit: a process pushed \
             without checking available room"
        );
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

/// Typed handle to a [`Buffer`] storage.
pub struct BufferId<T> {
    pub(crate) id: StorageId,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

impl<T> BufferId<T> {
    pub(crate) fn new(id: StorageId) -> Self {
        BufferId { id, _marker: PhantomData }
    }

    pub fn raw(self) -> StorageId {
        self.id
    }
}

impl<T> Clone for BufferId<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for BufferId<T> {}
impl<T> std::fmt::Debug for BufferId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferId({:?})", self.id)
    }
}
