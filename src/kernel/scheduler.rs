/*!
The three-phase scheduling loop.

Each master cycle visited by [`Kernel::step`] runs, for every clock due
at that cycle: a storage-update pass (the moment at which last cycle's
buffered writes become visible), then acquire, arbitrate and
check+commit across that clock's active processes and arbitrators.
Clocks that align on the same master cycle are always processed
together within one iteration, which is what keeps cross-clock
interactions (a process on one clock reading a storage committed by a
process on another) deterministic: there is never an observable
in-between state split across two clocks at the same master cycle.

The reference simulator folds this into `Kernel::Step`, a single loop
over `m_process` with `UpdateStorages`/`Acquire`/`Arbitrate`/`Commit` as
free functions. Here the same four sub-passes are kept as private
methods on [`Kernel`], operating over the set of clocks due this
iteration rather than a single one at a time, since several
independently-clocked components can legitimately share a cycle.
*/

use tracing::{debug, trace, warn};

use crate::clock::ClockId;
use crate::error::{FaultContext, SimulationError};
use crate::process::{Phase, ProcessId, ProcessState, StepResult};

use super::{Kernel, StepContext};

/// The outcome of a [`Kernel::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The budget was exhausted; call `step` again to keep going.
    Running,
    /// No clock has any active process, storage or arbitrator left:
    /// the simulation has nothing further to do.
    Idle,
    /// A full master cycle produced no storage update and no
    /// successful commit while at least one process sat deadlocked.
    Deadlock,
    /// `abort()` or `stop()` was observed; the run was cut short.
    Aborted,
}

/// Sentinel budget meaning "run until idle, deadlocked or aborted".
pub const UNBOUNDED: u64 = u64::MAX;

impl Kernel {
    /// Advance the simulation by at most `budget_cycles` master cycles
    /// (use [`UNBOUNDED`] to run until a terminal condition), returning
    /// why the run stopped. Calling `step` again after it returns
    /// [`RunState::Running`] resumes exactly where the previous call
    /// left off; calling it again after an error is itself an error.
    pub fn step(&mut self, budget_cycles: u64) -> Result<RunState, SimulationError> {
        if let Some(context) = self.faulted.clone() {
            return Err(SimulationError::Faulted(context));
        }
        self.started = true;
        self.aborted = false;
        self.suspended = false;

        if self.active_clocks.is_empty() {
            return Ok(RunState::Idle);
        }

        self.master_cycle = self
            .active_clocks
            .iter()
            .map(|&id| self.clocks.get(id).next_fire)
            .min()
            .expect("active_clocks just checked non-empty");
        let budget_end = self.master_cycle.saturating_add(budget_cycles);
        let mut first_iteration = true;

        loop {
            if !first_iteration {
                // `cycle_no()` reports the last cycle actually processed,
                // so abort/suspend must be observed here, against the
                // still-unmoved `master_cycle` left by the iteration that
                // just ran — before we compute where the *next* one would
                // land.
                if self.aborted {
                    return Ok(RunState::Aborted);
                }
                if self.suspended && self.last_suspend_cycle != Some(self.master_cycle) {
                    self.last_suspend_cycle = Some(self.master_cycle);
                    return Ok(RunState::Aborted);
                }
                if self.active_clocks.is_empty() {
                    return Ok(RunState::Idle);
                }
                let next = self
                    .active_clocks
                    .iter()
                    .map(|&id| self.clocks.get(id).next_fire)
                    .min()
                    .expect("active_clocks just checked non-empty");
                if next >= budget_end {
                    self.master_cycle = next;
                    return Ok(RunState::Running);
                }
                self.master_cycle = next;
            }
            first_iteration = false;

            let due: Vec<ClockId> = self
                .active_clocks
                .iter()
                .copied()
                .filter(|&id| self.clocks.get(id).next_fire == self.master_cycle)
                .collect();
            trace!(master_cycle = self.master_cycle, due = due.len(), "begin cycle");

            let updated = self.update_storages(&due)?;
            // Re-read the due set: a storage committed above may have
            // woken a process on a clock that lands on this exact
            // master cycle, pulling it into this iteration.
            let due: Vec<ClockId> = self
                .active_clocks
                .iter()
                .copied()
                .filter(|&id| self.clocks.get(id).next_fire == self.master_cycle)
                .collect();

            self.run_acquire(&due)?;
            self.run_arbitrate(&due);
            let any_commit = self.run_commit(&due)?;

            if !updated && !any_commit {
                if self.processes.iter().any(|(_, p)| p.state == ProcessState::Deadlocked) {
                    warn!(master_cycle = self.master_cycle, "deadlock detected");
                    return Ok(RunState::Deadlock);
                }
                let has_future =
                    self.active_clocks.iter().any(|&id| self.clocks.get(id).next_fire > self.master_cycle);
                if !has_future {
                    return Ok(RunState::Idle);
                }
            }

            self.reschedule(&due);
        }
    }

    /// Promote every due clock's buffered storage writes to current,
    /// waking subscribers. Returns whether any storage actually
    /// updated (used to distinguish real progress from an idle cycle).
    fn update_storages(&mut self, due: &[ClockId]) -> Result<bool, SimulationError> {
        let mut updated = false;
        for &clock_id in due {
            let storage_ids: Vec<_> = self.clocks.get_mut(clock_id).active_storages.drain(..).collect();
            for storage_id in storage_ids {
                updated = true;
                let should_wake = self.storages.get_mut(storage_id).commit();
                if should_wake {
                    let subscribers = self.storages.get(storage_id).subscribers().to_vec();
                    for process in subscribers {
                        self.activate_process(process);
                    }
                }
            }
        }
        Ok(updated)
    }

    fn run_acquire(&mut self, due: &[ClockId]) -> Result<(), SimulationError> {
        self.phase = Some(Phase::Acquire);
        for &clock_id in due {
            let processes = self.clocks.get(clock_id).active_processes.clone();
            for process in processes {
                self.processes.get_mut(process).acquire_result = None;
                let result = self.invoke(process, Phase::Acquire)?;
                self.processes.get_mut(process).acquire_result = Some(result);
                match result {
                    StepResult::Success => {
                        self.processes.get_mut(process).state = ProcessState::Running;
                    }
                    StepResult::Failed => {
                        self.processes.get_mut(process).state = ProcessState::Deadlocked;
                        self.processes.get_mut(process).stall_count += 1;
                    }
                    StepResult::Delayed => {
                        // State is left as whatever it was: not runnable
                        // this cycle, but not counted as deadlocked either.
                    }
                }
            }
        }
        Ok(())
    }

    fn run_arbitrate(&mut self, due: &[ClockId]) {
        for &clock_id in due {
            let arbitrators: Vec<_> = self.clocks.get_mut(clock_id).active_arbitrators.drain(..).collect();
            for arbitrator_id in arbitrators {
                let data = self.arbitrators.get_mut(arbitrator_id);
                data.active = false;
                let (_winner, losers) = data.resolve();
                for loser in losers {
                    self.processes.get_mut(loser).state = ProcessState::Deadlocked;
                    self.processes.get_mut(loser).acquire_result = Some(StepResult::Failed);
                }
            }
        }
    }

    /// Re-run acquire (as `Check`) and, on a matching `Success`, run
    /// commit. Only processes whose acquire phase this cycle succeeded
    /// and who were not subsequently defeated in arbitration reach
    /// check at all. Returns whether any process actually committed.
    fn run_commit(&mut self, due: &[ClockId]) -> Result<bool, SimulationError> {
        let mut any_commit = false;
        for &clock_id in due {
            let processes = self.clocks.get(clock_id).active_processes.clone();
            for process in processes {
                let data = self.processes.get(process);
                if data.state == ProcessState::Deadlocked {
                    continue;
                }
                if data.acquire_result != Some(StepResult::Success) {
                    continue;
                }

                let check_result = self.invoke(process, Phase::Check)?;
                assert_eq!(
                    check_result,
                    StepResult::Success,
                    "process {:?} violated the acquire/commit repeatability contract: \
                     acquire returned Success but check returned {:?} with nothing \
                     observable having changed in between",
                    self.processes.get(process).name,
                    check_result,
                );

                let commit_result = self.invoke(process, Phase::Commit)?;
                assert_eq!(
                    commit_result,
                    StepResult::Success,
                    "process {:?} returned {:?} from commit after a successful check",
                    self.processes.get(process).name,
                    commit_result,
                );
                self.processes.get_mut(process).state = ProcessState::Running;
                any_commit = true;
            }
        }
        Ok(any_commit)
    }

    /// Advance or drop every clock that was due this iteration,
    /// depending on whether it still has active work.
    fn reschedule(&mut self, due: &[ClockId]) {
        let previous: Vec<ClockId> = self.active_clocks.drain(..).collect();
        for clock_id in previous {
            if !due.contains(&clock_id) {
                self.active_clocks.push(clock_id);
                continue;
            }
            let clock = self.clocks.get(clock_id);
            if clock.has_active_work() {
                let period = clock.period;
                self.clocks.get_mut(clock_id).next_fire += period;
                self.active_clocks.push(clock_id);
            } else {
                self.clocks.get_mut(clock_id).queued = false;
            }
        }
    }

    /// Swap a process's step closure out of its slot, invoke it with a
    /// fresh [`StepContext`] borrowing `self`, then swap it back. An
    /// `Option::take`-based swap on the single `step_fn` field, since
    /// only the closure itself needs to be detached to free up
    /// `&mut Kernel` for the duration of the call.
    fn invoke(&mut self, process: ProcessId, phase: Phase) -> Result<StepResult, SimulationError> {
        let mut step_fn = self.processes.get_mut(process).take_step_fn();
        self.phase = Some(phase);
        let mut ctx = StepContext::new(self, process);
        let outcome = step_fn(phase, &mut ctx);
        self.processes.get_mut(process).put_step_fn(step_fn);

        match outcome {
            Ok(result) => Ok(result),
            Err(source) => {
                let context = FaultContext {
                    process,
                    process_name: self.processes.get(process).name.clone(),
                    master_cycle: self.master_cycle,
                };
                debug!(process = %context.process_name, cycle = context.master_cycle, "process fault");
                self.faulted = Some(context.clone());
                Err(SimulationError::ProcessFault { source, context })
            }
        }
    }
}
