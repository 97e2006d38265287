#![doc = r#"
mgsim-kernel: a cycle-accurate, discrete-event simulation kernel for
multi-clock hardware models.

The kernel does not know anything about pipelines, caches or
instruction sets; it only knows how to drive clocks, processes,
storages and arbitrators through an acquire/arbitrate/commit cycle in
deterministic lockstep. A host crate builds a machine model on top of
it by registering clocks at the frequencies its components run at,
processes for each piece of per-cycle behavior, and storages for every
piece of state that flows between them.

Modules:
- ids: index-based arena storage shared by every entity kind
- clock: clock registry and master-frequency (LCM) bookkeeping
- process: process lifecycle, step-function contract, phases
- storage: register/flag/buffer/ordered-queue/counter storage kinds
- arbitrator: per-cycle contention resolution with round-robin fairness
- object: case-insensitive dotted-path naming for debug/inspection
- sampling: named read-only probes over kernel state
- error: setup and in-flight simulation error types
- kernel: the `Kernel` type and its three-phase scheduling loop

In tests, shared process/storage builders are available under
`crate::test_support`.
"#]

pub mod arbitrator;
pub mod clock;
pub mod error;
pub mod ids;
pub mod kernel;
pub mod object;
pub mod process;
pub mod sampling;
pub mod storage;

pub use arbitrator::ArbitratorId;
pub use clock::{ClockId, ClockInfo};
pub use error::{FaultContext, SetupError, SimulationError};
pub use kernel::{Kernel, RunState, StepContext, UNBOUNDED};
pub use object::ObjectId;
pub use process::{Phase, ProcessId, ProcessInfo, ProcessState, StepOutcome, StepResult};
pub use sampling::{SampleCategory, SampleReading, SampleValue};

#[cfg(test)]
pub mod test_support;

#[cfg(test)]
mod scenarios;
