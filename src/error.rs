/*!
Error types for the simulation kernel.

Two families exist, matching the disposition table in the kernel design:
[`SetupError`] covers mistakes made while wiring up clocks, processes,
storages and arbitrators before the first [`crate::kernel::Kernel::step`]
call; [`SimulationError`] covers conditions raised while a simulation is
already running (a thrown exception from inside a process, or a request
made against a kernel that has already faulted).

Arbitration losses and failed acquires are *not* represented here: they
are recovered internally within a single cycle and never reach the
caller (see the kernel's scheduling loop).
*/

use std::fmt;

use thiserror::Error;

use crate::process::ProcessId;

/// Errors raised by the construction API, before the first `step`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    /// `create_clock` was called with a frequency of zero.
    #[error("clock frequency must be at least 1 Hz, got {0}")]
    InvalidFrequency(u64),

    /// A construction call arrived after the kernel has already stepped.
    #[error("cannot register new clocks/processes/storages after the first step (at master cycle {0})")]
    SimulationAlreadyStarted(u64),

    /// A bounded buffer was created with zero capacity.
    #[error("buffer capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    /// A name collided with an existing sibling in the object tree.
    #[error("object tree already has a child named {0:?} under {1:?}")]
    DuplicateChildName(String, String),

    /// A dotted path did not resolve to any registered object.
    #[error("no object registered at path {0:?}")]
    UnknownPath(String),
}

/// Context attached to a [`SimulationError`]: which process was running,
/// and at which master cycle, when the fault occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultContext {
    pub process: ProcessId,
    pub process_name: String,
    pub master_cycle: u64,
}

impl fmt::Display for FaultContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "while executing process {:?} at master cycle {}",
            self.process_name, self.master_cycle
        )
    }
}

/// Errors that can be raised while the kernel is actively stepping.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A process's step function returned `Err` during acquire, check or
    /// commit. This is not a deadlock: it means the process code itself
    /// hit an unrecoverable condition (e.g. an illegal instruction in the
    /// simulated core). The kernel re-raises it augmented with the
    /// offending process and cycle; no further `step` call is legal
    /// afterwards.
    #[error("simulation exception {source}, {context}")]
    ProcessFault {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        context: FaultContext,
    },

    /// `step` was called again after a prior call already raised
    /// [`SimulationError::ProcessFault`]; the kernel state is left
    /// inspectable but no further progress is legal.
    #[error("kernel is faulted (a previous step raised {0}); no further step is legal")]
    Faulted(FaultContext),
}
