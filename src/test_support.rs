//! Shared step-closure builders for kernel tests.
//!
//! Real components implement their own closures against the
//! [`crate::kernel::StepContext`] API; these are deliberately minimal
//! stand-ins that exercise one storage/arbitrator interaction each, so
//! scenario tests can wire up a handful of clocks and processes without
//! re-deriving the same boilerplate every time.

#![allow(dead_code)]

use crate::arbitrator::ArbitratorId;
use crate::kernel::StepContext;
use crate::process::{Phase, StepOutcome, StepResult};
use crate::storage::{CounterId, FlagId, RegisterId};

/// Commits `delta` to `counter` every cycle it runs. Never contends for
/// anything, never fails or delays.
pub fn increment_every_cycle(
    counter: CounterId,
    delta: i64,
) -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    move |phase, ctx| {
        if phase == Phase::Commit {
            ctx.counter_add(counter, delta);
        }
        Ok(StepResult::Success)
    }
}

/// Requests `arbitrator` during acquire and, only if it survives to
/// commit (i.e. won arbitration), adds `delta` to `counter`.
pub fn arbitrated_increment(
    arbitrator: ArbitratorId,
    counter: CounterId,
    priority: u32,
    delta: i64,
) -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    move |phase, ctx| {
        if phase == Phase::Acquire {
            ctx.request(arbitrator, priority);
        } else if phase == Phase::Commit {
            ctx.counter_add(counter, delta);
        }
        Ok(StepResult::Success)
    }
}

/// Copies `source` into `dest` on commit, every cycle it runs. Useful
/// for observing the deferred-visibility boundary between two clocks.
pub fn copy_register<T: Clone + 'static>(
    source: RegisterId<T>,
    dest: RegisterId<T>,
) -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    move |phase, ctx| {
        if phase == Phase::Commit {
            let value = ctx.read_register(source);
            ctx.write_register(dest, value);
        }
        Ok(StepResult::Success)
    }
}

/// Sets `flag` during commit of the cycle at which `master_cycle()`
/// first reaches `at_cycle`, then goes idle forever.
pub fn set_flag_once(flag: FlagId, at_cycle: u64) -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    let mut fired = false;
    move |phase, ctx| {
        if fired {
            return Ok(StepResult::Delayed);
        }
        if ctx.master_cycle() < at_cycle {
            return Ok(StepResult::Delayed);
        }
        if phase == Phase::Commit {
            ctx.flag_set(flag);
            fired = true;
        }
        Ok(StepResult::Success)
    }
}

/// Adds `delta` to `counter` on commit, once, the first cycle it is
/// invoked — meant for a process woken by a storage subscription rather
/// than one that is always on its clock's active list.
pub fn increment_once_on_wake(
    counter: CounterId,
    delta: i64,
) -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    let mut fired = false;
    move |phase, ctx| {
        if fired {
            return Ok(StepResult::Delayed);
        }
        if phase == Phase::Commit {
            ctx.counter_add(counter, delta);
            fired = true;
        }
        Ok(StepResult::Success)
    }
}

/// Always fails to acquire — a permanently-stuck process, for deadlock
/// scenarios.
pub fn always_failed() -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    move |_phase, _ctx| Ok(StepResult::Failed)
}

/// Never has anything to do, but is not stuck either.
pub fn always_delayed() -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    move |_phase, _ctx| Ok(StepResult::Delayed)
}

/// Raises a simulation fault the first time acquire is invoked at or
/// after `trigger_cycle`.
pub fn fault_at(
    trigger_cycle: u64,
    message: &'static str,
) -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    move |phase, ctx| {
        if phase == Phase::Acquire && ctx.master_cycle() >= trigger_cycle {
            return Err(message.into());
        }
        Ok(StepResult::Success)
    }
}

/// Calls `kernel.abort()` the first time acquire is invoked at or after
/// `trigger_cycle`, simulating an external stop request observed from
/// inside a running process.
pub fn abort_at(trigger_cycle: u64) -> impl FnMut(Phase, &mut StepContext<'_>) -> StepOutcome {
    move |phase, ctx| {
        if phase == Phase::Acquire && ctx.master_cycle() >= trigger_cycle {
            ctx.abort();
        }
        Ok(StepResult::Success)
    }
}
