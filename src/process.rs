/*!
Process: a piece of per-cycle behavior attached to exactly one clock.

A process is not a type hierarchy (as in the reference C++ simulator,
which relies on virtual dispatch over a `Process` base class) but a
named slot in the kernel's process arena holding a boxed step closure.
The closure is invoked up to three times per matching clock tick, once
per [`Phase`], and returns a [`StepResult`] telling the kernel how to
treat the process for the remainder of the cycle.

A well-behaved closure distinguishes phases with a single "would this
commit?" guard and only performs storage writes when `phase ==
Phase::Commit`; everything computed during acquire must be exactly
reproducible during check (see the acquire-commit repeatability
property in the specification).
*/

use std::error::Error;

use crate::clock::ClockId;
use crate::ids::{Arena, Id};
use crate::kernel::StepContext;

/// Which of the three per-cycle sub-phases the kernel is currently
/// invoking a process for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The process may `request()` arbitrators and read storages; it
    /// must not mutate anything observable yet.
    Acquire,
    /// Re-run of the acquire logic, after arbitration. Nothing
    /// observable may have changed; the result must match acquire's.
    Check,
    /// The process performs its buffered storage writes.
    Commit,
}

/// The outcome of one phase invocation of a process's step closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Ready to proceed (to check, then commit).
    Success,
    /// Resources were not available this cycle; candidate for deadlock.
    Failed,
    /// Nothing to do this cycle. Not runnable, but not stuck either.
    Delayed,
}

/// The process's state as tracked by the kernel across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Not currently scheduled on its clock's active list.
    Idle,
    /// Completed a commit (or is newly created and has not run yet).
    Running,
    /// Acquire returned `Failed` this cycle (or the process lost
    /// arbitration); will retry next cycle.
    Deadlocked,
}

/// What a process's step closure may return besides a plain result:
/// propagating `Err` here is the only way to raise a simulation
/// exception (an unrecoverable fault, as opposed to ordinary
/// `StepResult::Failed` stalling).
pub type StepOutcome = Result<StepResult, Box<dyn Error + Send + Sync + 'static>>;

pub(crate) type StepFn = Box<dyn FnMut(Phase, &mut StepContext<'_>) -> StepOutcome>;

/// Internal per-process bookkeeping, owned by the kernel's process
/// arena. Never exposed by reference to callers; all external access
/// goes through [`ProcessId`] plus kernel methods.
pub(crate) struct ProcessData {
    pub name: String,
    pub clock: ClockId,
    pub state: ProcessState,
    pub stall_count: u64,
    /// Whether this process is currently linked on its clock's active
    /// list. Activation is idempotent per cycle: re-activating a
    /// process already marked active is a no-op.
    pub active: bool,
    /// This cycle's acquire outcome, reset to `None` before acquire
    /// runs. Distinct from `state`: a `Delayed` acquire leaves `state`
    /// untouched but must still keep the process out of check/commit,
    /// which a `state != Deadlocked` check alone cannot tell apart from
    /// "acquire succeeded".
    pub acquire_result: Option<StepResult>,
    /// `None` only while the closure has been swapped out for the
    /// duration of an in-flight invocation (see `take_step_fn`).
    step_fn: Option<StepFn>,
}

impl ProcessData {
    pub(crate) fn new(name: String, clock: ClockId, step_fn: StepFn) -> Self {
        ProcessData {
            name,
            clock,
            state: ProcessState::Idle,
            stall_count: 0,
            active: false,
            acquire_result: None,
            step_fn: Some(step_fn),
        }
    }

    pub(crate) fn take_step_fn(&mut self) -> StepFn {
        self.step_fn
            .take()
            .expect("process step closure reentered while already in flight")
    }

    pub(crate) fn put_step_fn(&mut self, step_fn: StepFn) {
        self.step_fn = Some(step_fn);
    }
}

/// Handle to a process registered with the kernel. Cheap, `Copy`,
/// stable for the lifetime of the kernel.
pub type ProcessId = Id<ProcessData>;

pub(crate) type ProcessArena = Arena<ProcessData>;

/// A snapshot of a process's externally observable state, as returned
/// by the introspection API.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub name: String,
    pub state: ProcessState,
    pub stall_count: u64,
    pub owning_clock_frequency: u64,
}
