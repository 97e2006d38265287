//! Flag: a boolean storage with `set()`/`clear()` instead of a general
//! `write()`. Only the cleared -> set transition wakes subscribers;
//! clearing a flag, or re-setting one already set, does not.

use crate::clock::ClockId;
use crate::process::ProcessId;

use super::{StorageCell, StorageHeader, StorageId};

pub struct Flag {
    header: StorageHeader,
    current: bool,
    /// Buffered transition for this cycle, if any `set`/`clear` call
    /// was made. Multiple calls within one cycle collapse to the last
    /// one, matching the "resolves to a single final value" rule.
    pending_value: Option<bool>,
}

impl Flag {
    pub(crate) fn new(clock: ClockId, initial: bool) -> Self {
        Flag { header: StorageHeader::new(clock), current: initial, pending_value: None }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.current
    }

    pub(crate) fn set(&mut self) {
        self.pending_value = Some(true);
        self.header.pending = true;
    }

    pub(crate) fn clear(&mut self) {
        self.pending_value = Some(false);
        self.header.pending = true;
    }
}

pub type FlagId = StorageId;

impl StorageCell for Flag {
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
        match self.pending_value.take() {
            Some(v) => {
                self.header.pending = false;
                let woke = !self.current && v;
                self.current = v;
                woke
            }
            None => false,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
