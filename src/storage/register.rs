//! Single-value register: the simplest storage kind. `read()` returns
//! the value committed at the start of the current cycle; `write()`
//! buffers a new value that becomes visible at the next update pass.

use std::marker::PhantomData;

use crate::clock::ClockId;
use crate::process::ProcessId;

use super::{StorageCell, StorageHeader, StorageId};

pub struct Register<T> {
    header: StorageHeader,
    current: T,
    next: Option<T>,
}

impl<T: Clone + 'static> Register<T> {
    pub(crate) fn new(clock: ClockId, initial: T) -> Self {
        Register { header: StorageHeader::new(clock), current: initial, next: None }
    }

    pub(crate) fn read(&self) -> T {
        self.current.clone()
    }

    /// Buffer `value` as the next state. If this process (or any
    /// other) already buffered a write this cycle, the later call
    /// wins — callers sharing a register across writers are expected
    /// to be mutually exclusive via an arbitrator, so in practice only
    /// the resolved winner ever calls `write` in a given cycle.
    pub(crate) fn write(&mut self, value: T) -> bool {
        self.next = Some(value);
        let was_pending = self.header.pending;
        self.header.pending = true;
        !was_pending
    }
}

impl<T: Clone + 'static> StorageCell for Register<T> {
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
        if let Some(v) = self.next.take() {
            self.current = v;
            self.header.pending = false;
            // A register has no "empty" state to transition out of;
            // any committed write is treated as a change worth waking
            // subscribers for.
            true
        } else {
            false
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Typed handle to a [`Register`] storage.
pub struct RegisterId<T> {
    pub(crate) id: StorageId,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

impl<T> RegisterId<T> {
    pub(crate) fn new(id: StorageId) -> Self {
        RegisterId { id, _marker: PhantomData }
    }

    pub fn raw(self) -> StorageId {
        self.id
    }
}

impl<T> Clone for RegisterId<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for RegisterId<T> {}
impl<T> std::fmt::Debug for RegisterId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegisterId({:?})", self.id)
    }
}
