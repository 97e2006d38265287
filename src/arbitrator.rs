/*!
Arbitrators: per-cycle contention resolvers for shared resources.

A register-file write port, a memory bus, a shared counter — anything
with more than one potential writer per cycle needs an arbitrator.
During the acquire phase each contending process calls `request()`
with a priority tag; between acquire and commit the kernel resolves
exactly one winner per active arbitrator. Ties are broken by a
round-robin cursor stored in the arbitrator itself, so that a sequence
of ties rotates fairly across requesters rather than always favoring
the same process (see the arbitration-fairness property).
*/

use crate::clock::ClockId;
use crate::ids::{Arena, Id};
use crate::process::ProcessId;

/// Handle to an arbitrator registered with the kernel.
pub type ArbitratorId = Id<ArbitratorData>;

/// One pending request recorded during the acquire phase.
#[derive(Debug, Clone, Copy)]
struct Request {
    process: ProcessId,
    priority: u32,
}

pub(crate) struct ArbitratorData {
    pub name: String,
    pub clock: ClockId,
    requests: Vec<Request>,
    /// Whether this arbitrator currently has an entry in its clock's
    /// active-arbitrator list. Reset to `false` every arbitrate phase.
    pub active: bool,
    /// Round-robin cursor: index into the *requesting* set (not a
    /// process id) used to break ties among the highest-priority
    /// requests.
    round_robin_cursor: usize,
}

impl ArbitratorData {
    pub(crate) fn new(name: String, clock: ClockId) -> Self {
        ArbitratorData {
            name,
            clock,
            requests: Vec::new(),
            active: false,
            round_robin_cursor: 0,
        }
    }

    /// Record a request for this cycle. At most one request per
    /// process is meaningful; a second request from the same process
    /// in the same cycle overwrites the first (it is a programming
    /// error in practice, but harmless to tolerate since only the
    /// winner matters).
    pub(crate) fn request(&mut self, process: ProcessId, priority: u32) {
        if let Some(r) = self.requests.iter_mut().find(|r| r.process == process) {
            r.priority = priority;
        } else {
            self.requests.push(Request { process, priority });
        }
    }

    /// Resolve the current cycle's requests into exactly one winner,
    /// returning the winner and the losers (in deterministic,
    /// insertion order). Clears the request set.
    ///
    /// Selection policy: highest `priority` wins; ties among the
    /// highest priority are broken by rotating a cursor through the
    /// tied requests in the order they were recorded, so that repeated
    /// ties do not always resolve to the same process.
    pub(crate) fn resolve(&mut self) -> (Option<ProcessId>, Vec<ProcessId>) {
        if self.requests.is_empty() {
            return (None, Vec::new());
        }

        let max_priority = self.requests.iter().map(|r| r.priority).max().unwrap();
        let tied: Vec<usize> = self
            .requests
            .iter()
            .enumerate()
            .filter(|(_, r)| r.priority == max_priority)
            .map(|(i, _)| i)
            .collect();

        let pick = self.round_robin_cursor % tied.len();
        let winner_index = tied[pick];
        self.round_robin_cursor = self.round_robin_cursor.wrapping_add(1);

        let winner = self.requests[winner_index].process;
        let losers = self
            .requests
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != winner_index)
            .map(|(_, r)| r.process)
            .collect();

        self.requests.clear();
        (Some(winner), losers)
    }
}

pub(crate) type ArbitratorArena = Arena<ArbitratorData>;
