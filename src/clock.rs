/*!
Clocks and the clock registry.

A [`Clock`] is a schedulable tick source: it remembers the master
cycle it next fires on and the set of processes, storages and
arbitrators currently active on it. The [`ClockRegistry`] owns the set
of distinct frequencies in play and recomputes the master frequency —
the least common multiple of every registered frequency — whenever a
new one is admitted.

Equalizing every clock's period against a shared master frequency
(rather than tracking each clock's phase independently) is what lets
the scheduler advance in plain integer master-cycle steps: a clock's
next firing is always an exact multiple of its period.
*/

use crate::arbitrator::ArbitratorId;
use crate::ids::{Arena, Id};
use crate::process::ProcessId;
use crate::storage::StorageId;

/// Handle to a clock registered with the kernel.
pub type ClockId = Id<ClockData>;

fn gcd(a: u64, b: u64) -> u64 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

/// Internal, kernel-owned state for one clock. Exposed to callers only
/// through [`ClockId`] plus kernel methods.
pub(crate) struct ClockData {
    pub frequency_hz: u64,
    /// Master cycles per tick of this clock. `master_frequency % frequency_hz == 0`.
    pub period: u64,
    /// The next master cycle at which this clock is due to run.
    /// Meaningless (and ignored) while the clock is not on the
    /// scheduler's active-clock queue.
    pub next_fire: u64,
    /// Whether this clock currently has an entry in the scheduler's
    /// active-clock queue. Activation of a process/storage/arbitrator
    /// on an already-queued clock is a no-op with respect to queueing.
    pub queued: bool,
    pub active_processes: Vec<ProcessId>,
    pub active_storages: Vec<StorageId>,
    pub active_arbitrators: Vec<ArbitratorId>,
}

impl ClockData {
    fn new(frequency_hz: u64, period: u64) -> Self {
        ClockData {
            frequency_hz,
            period,
            next_fire: 0,
            queued: false,
            active_processes: Vec::new(),
            active_storages: Vec::new(),
            active_arbitrators: Vec::new(),
        }
    }

    /// Number of whole ticks this clock has completed as of
    /// `master_cycle`. Only meaningful when `master_cycle` is itself a
    /// clock-aligned cycle for this clock.
    pub fn current_cycle(&self, master_cycle: u64) -> u64 {
        master_cycle / self.period
    }

    pub fn has_active_work(&self) -> bool {
        !self.active_processes.is_empty()
            || !self.active_storages.is_empty()
            || !self.active_arbitrators.is_empty()
    }
}

/// Owns the set of distinct clock frequencies in the simulation and
/// computes the master frequency as their LCM.
#[derive(Default)]
pub(crate) struct ClockRegistry {
    clocks: Arena<ClockData>,
    master_frequency: u64,
}

impl ClockRegistry {
    pub fn new() -> Self {
        ClockRegistry { clocks: Arena::new(), master_frequency: 1 }
    }

    pub fn master_frequency(&self) -> u64 {
        if self.clocks.is_empty() { 0 } else { self.master_frequency }
    }

    /// Find an existing clock of this frequency, if any (idempotent
    /// `create_clock`).
    pub fn find(&self, frequency_hz: u64) -> Option<ClockId> {
        self.clocks
            .iter()
            .find(|(_, c)| c.frequency_hz == frequency_hz)
            .map(|(id, _)| id)
    }

    /// Admit a new frequency, recomputing every existing clock's
    /// period if the master frequency changes, and return the new
    /// clock's id. Caller must have already checked `find` returned
    /// `None`.
    pub fn create(&mut self, frequency_hz: u64) -> ClockId {
        let new_master = if self.clocks.is_empty() {
            frequency_hz
        } else {
            lcm(self.master_frequency, frequency_hz)
        };

        if new_master != self.master_frequency {
            self.master_frequency = new_master;
            let ids: Vec<_> = self.clocks.ids().collect();
            for id in ids {
                let c = self.clocks.get_mut(id);
                c.period = self.master_frequency / c.frequency_hz;
            }
        }

        let period = self.master_frequency / frequency_hz;
        self.clocks.insert(ClockData::new(frequency_hz, period))
    }

    pub fn get(&self, id: ClockId) -> &ClockData {
        self.clocks.get(id)
    }

    pub fn get_mut(&mut self, id: ClockId) -> &mut ClockData {
        self.clocks.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ClockId> + '_ {
        self.clocks.ids()
    }
}

/// A snapshot of a clock's state, as returned by the introspection API.
#[derive(Debug, Clone, Copy)]
pub struct ClockInfo {
    pub id: ClockId,
    pub frequency_hz: u64,
    pub period: u64,
    pub ticks_elapsed: u64,
}
