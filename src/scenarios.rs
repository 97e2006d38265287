//! End-to-end scenario tests driving a fresh [`crate::kernel::Kernel`]
//! through realistic multi-clock wiring, rather than exercising a
//! single module in isolation.

use std::cell::RefCell;
use std::rc::Rc;

use crate::kernel::{Kernel, RunState, UNBOUNDED};
use crate::process::{Phase, ProcessState, StepResult};
use crate::sampling::SampleCategory;
use crate::test_support::*;

#[test]
fn two_clocks_tick_in_proportion_to_their_frequency() {
    let mut kernel = Kernel::new();
    let clock_300 = kernel.create_clock(300).unwrap();
    let clock_400 = kernel.create_clock(400).unwrap();
    assert_eq!(kernel.master_frequency(), 1200);

    let counter_300 = kernel.create_counter(clock_300, 0).unwrap();
    let counter_400 = kernel.create_counter(clock_400, 0).unwrap();
    let p300 = kernel.create_process(clock_300, "p300", increment_every_cycle(counter_300, 1)).unwrap();
    let p400 = kernel.create_process(clock_400, "p400", increment_every_cycle(counter_400, 1)).unwrap();
    kernel.activate_process(p300);
    kernel.activate_process(p400);

    let state = kernel.step(12).unwrap();
    assert_eq!(state, RunState::Running);
    assert_eq!(kernel.counter_read(counter_300), 3);
    assert_eq!(kernel.counter_read(counter_400), 4);
}

#[test]
fn a_register_write_is_not_visible_until_the_writers_clock_next_ticks() {
    let mut kernel = Kernel::new();
    let clock = kernel.create_clock(100).unwrap();
    let register = kernel.create_register(clock, 0u32).unwrap();
    let readings = Rc::new(RefCell::new(Vec::new()));

    let writer = kernel
        .create_process(clock, "writer", move |phase, ctx| {
            if phase == Phase::Commit && ctx.master_cycle() == 0 {
                ctx.write_register(register, 7);
            }
            Ok(StepResult::Success)
        })
        .unwrap();
    let reader = {
        let readings = readings.clone();
        kernel
            .create_process(clock, "reader", move |phase, ctx| {
                if phase == Phase::Acquire {
                    readings.borrow_mut().push(ctx.read_register(register));
                }
                Ok(StepResult::Success)
            })
            .unwrap()
    };
    kernel.activate_process(writer);
    kernel.activate_process(reader);

    kernel.step(1).unwrap();
    kernel.step(1).unwrap();

    assert_eq!(*readings.borrow(), vec![0, 7]);
}

#[test]
fn a_bounded_buffer_tracks_peak_occupancy_across_a_racing_push_and_pop() {
    let mut kernel = Kernel::new();
    let clock = kernel.create_clock(100).unwrap();
    let buffer = kernel.create_buffer::<char>(clock, 2).unwrap();
    let popped = Rc::new(RefCell::new(Vec::new()));
    let mut to_push = vec!['A', 'B', 'C'].into_iter();

    let writer = kernel
        .create_process(clock, "writer", move |phase, ctx| {
            if phase == Phase::Commit {
                if let Some(c) = to_push.next() {
                    ctx.buffer_push(buffer, c);
                }
            }
            Ok(StepResult::Success)
        })
        .unwrap();
    let reader = {
        let popped = popped.clone();
        kernel
            .create_process(clock, "reader", move |phase, ctx| {
                if phase == Phase::Commit {
                    let front = ctx.buffer_front(buffer).copied();
                    popped.borrow_mut().push(front);
                    if front.is_some() {
                        ctx.buffer_pop(buffer);
                    }
                }
                Ok(StepResult::Success)
            })
            .unwrap()
    };
    kernel.activate_process(writer);
    kernel.activate_process(reader);

    for _ in 0..4 {
        kernel.step(1).unwrap();
    }

    assert_eq!(*popped.borrow(), vec![None, Some('A'), Some('B'), Some('C')]);
    assert_eq!(kernel.buffer_max_observed(buffer), 2);
}

#[test]
fn three_independently_clocked_processes_each_commit_through_their_own_arbitrator() {
    let mut kernel = Kernel::new();
    let clock_100 = kernel.create_clock(100).unwrap();
    let clock_200 = kernel.create_clock(200).unwrap();
    let clock_400 = kernel.create_clock(400).unwrap();
    assert_eq!(kernel.master_frequency(), 400);

    let counter = kernel.create_counter(clock_400, 0).unwrap();
    let arb_100 = kernel.create_arbitrator(clock_100, "bus.100mhz").unwrap();
    let arb_200 = kernel.create_arbitrator(clock_200, "bus.200mhz").unwrap();
    let arb_400 = kernel.create_arbitrator(clock_400, "bus.400mhz").unwrap();

    let p100 = kernel
        .create_process(clock_100, "p100", arbitrated_increment(arb_100, counter, 0, 1))
        .unwrap();
    let p200 = kernel
        .create_process(clock_200, "p200", arbitrated_increment(arb_200, counter, 0, 1))
        .unwrap();
    let p400 = kernel
        .create_process(clock_400, "p400", arbitrated_increment(arb_400, counter, 0, 1))
        .unwrap();
    kernel.activate_process(p100);
    kernel.activate_process(p200);
    kernel.activate_process(p400);

    let state = kernel.step(12).unwrap();
    assert_eq!(state, RunState::Running);
    // 3 ticks of the 100 MHz process, 6 of the 200 MHz, 12 of the 400 MHz.
    assert_eq!(kernel.counter_read(counter), 21);
    for info in kernel.deadlocked_processes() {
        panic!("no process should ever lose arbitration here: {:?}", info.name);
    }
}

#[test]
fn a_circular_wait_between_two_buffers_is_reported_as_deadlock() {
    let mut kernel = Kernel::new();
    let clock = kernel.create_clock(100).unwrap();
    let buffer_x = kernel.create_buffer::<u32>(clock, 1).unwrap();
    let buffer_y = kernel.create_buffer::<u32>(clock, 1).unwrap();

    // P drains X and feeds Y; Q drains Y and feeds X. Neither buffer
    // starts with anything in it, so each process's very first acquire
    // fails and neither can ever make the other's input non-empty.
    let p = kernel
        .create_process(clock, "p", move |phase, ctx| {
            if ctx.buffer_is_empty(buffer_x) {
                return Ok(StepResult::Failed);
            }
            if phase == Phase::Commit {
                ctx.buffer_pop(buffer_x);
                ctx.buffer_push(buffer_y, 1);
            }
            Ok(StepResult::Success)
        })
        .unwrap();
    let q = kernel
        .create_process(clock, "q", move |phase, ctx| {
            if ctx.buffer_is_empty(buffer_y) {
                return Ok(StepResult::Failed);
            }
            if phase == Phase::Commit {
                ctx.buffer_pop(buffer_y);
                ctx.buffer_push(buffer_x, 1);
            }
            Ok(StepResult::Success)
        })
        .unwrap();
    kernel.activate_process(p);
    kernel.activate_process(q);

    let state = kernel.step(UNBOUNDED).unwrap();
    assert_eq!(state, RunState::Deadlock);
    assert_eq!(kernel.cycle_no(), 0);

    let stuck: Vec<_> = kernel.deadlocked_processes().into_iter().map(|info| info.name).collect();
    assert_eq!(stuck.len(), 2);
    assert!(stuck.contains(&"p".to_string()));
    assert!(stuck.contains(&"q".to_string()));
}

#[test]
fn abort_mid_run_stops_exactly_at_the_triggering_cycle_and_resume_continues_forward() {
    let mut kernel = Kernel::new();
    let clock = kernel.create_clock(1).unwrap();
    let counter = kernel.create_counter(clock, 0).unwrap();
    let ticker = kernel
        .create_process(clock, "ticker", move |phase, ctx| {
            if phase == Phase::Commit {
                ctx.counter_add(counter, 1);
            }
            Ok(StepResult::Success)
        })
        .unwrap();
    let aborter = kernel.create_process(clock, "aborter", abort_at(500)).unwrap();
    kernel.activate_process(ticker);
    kernel.activate_process(aborter);

    let state = kernel.step(UNBOUNDED).unwrap();
    assert_eq!(state, RunState::Aborted);
    assert_eq!(kernel.cycle_no(), 500);
    assert_eq!(kernel.counter_read(counter), 501);

    let state = kernel.step(100).unwrap();
    assert_eq!(state, RunState::Running);
    assert_eq!(kernel.cycle_no(), 601);
    assert_eq!(kernel.counter_read(counter), 601);
}

#[test]
fn a_process_fault_poisons_the_kernel_for_further_stepping() {
    let mut kernel = Kernel::new();
    let clock = kernel.create_clock(50).unwrap();
    let faulty = kernel.create_process(clock, "faulty", fault_at(3, "illegal operand")).unwrap();
    kernel.activate_process(faulty);

    let err = kernel.step(UNBOUNDED).unwrap_err();
    assert!(err.to_string().contains("illegal operand"));

    let again = kernel.step(1);
    assert!(matches!(again, Err(crate::error::SimulationError::Faulted(_))));
}

#[test]
fn a_delayed_acquire_never_reaches_check_or_commit() {
    let mut kernel = Kernel::new();
    let clock = kernel.create_clock(10).unwrap();
    let process = kernel.create_process(clock, "sleeper", always_delayed()).unwrap();
    kernel.activate_process(process);

    kernel.step(5).unwrap();
    let info = kernel.processes().find(|p| p.id == process).unwrap();
    assert_eq!(info.state, ProcessState::Idle);
    assert_eq!(info.stall_count, 0);
}

#[test]
fn a_sample_reading_reflects_live_kernel_state() {
    let mut kernel = Kernel::new();
    let clock = kernel.create_clock(100).unwrap();
    let counter = kernel.create_counter(clock, 0).unwrap();
    let process = kernel.create_process(clock, "incr", increment_every_cycle(counter, 5)).unwrap();
    kernel.activate_process(process);
    kernel
        .register_sample("incr.counter", SampleCategory::State, move |k| {
            crate::sampling::SampleValue::Integer(k.counter_read(counter))
        })
        .unwrap();

    kernel.step(3).unwrap();
    let snapshot = kernel.sample_snapshot();
    let reading = snapshot.iter().find(|r| r.name == "incr.counter").unwrap();
    assert_eq!(reading.value, crate::sampling::SampleValue::Integer(15));
}
