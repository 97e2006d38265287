/*!
The kernel: owns every clock, process, storage and arbitrator in a
simulation and drives them through the acquire/arbitrate/commit cycle.

This is the thing a host program actually constructs. Everything else
in the crate is a handle or a piece of per-entity state that only the
kernel knows how to schedule; callers never hold a `&mut` reference to
a clock, process or storage directly, only the `Id<T>` it was handed
back at registration time plus a `&mut Kernel` to act through.

Construction (creating clocks, processes, storages, arbitrators, object
tree entries, samples) is only legal before the first [`Kernel::step`]
call; afterwards every registration method returns
[`SetupError::SimulationAlreadyStarted`]. The scheduling loop itself
lives in [`mod@scheduler`].
*/

mod scheduler;

use tracing::debug;

use crate::arbitrator::{ArbitratorArena, ArbitratorData, ArbitratorId};
use crate::clock::{ClockId, ClockInfo, ClockRegistry};
use crate::error::SetupError;
use crate::ids::Arena;
use crate::object::{ObjectId, ObjectTree};
use crate::process::{Phase, ProcessArena, ProcessData, ProcessId, ProcessInfo, ProcessState, StepFn};
use crate::sampling::{SampleCategory, SampleReading, SamplingRegistry, SampleValue};
use crate::storage::{
    Buffer, BufferId, Counter, CounterId, Flag, FlagId, OrderedQueue, OrderedQueueId, Register,
    RegisterId, StorageArena, StorageId, cell_mut, cell_ref,
};

pub use scheduler::{RunState, UNBOUNDED};

/// The simulation kernel.
pub struct Kernel {
    clocks: ClockRegistry,
    processes: ProcessArena,
    storages: StorageArena,
    arbitrators: ArbitratorArena,
    objects: ObjectTree,
    sampling: SamplingRegistry,

    /// Clocks currently on the scheduler's active queue, in the order
    /// they were queued. A clock appears here for as long as any of
    /// its process/storage/arbitrator sub-lists is non-empty.
    active_clocks: Vec<ClockId>,
    master_cycle: u64,
    /// Set only while a process's step closure is actually running, so
    /// `StepContext` can report it back.
    phase: Option<Phase>,
    started: bool,
    aborted: bool,
    suspended: bool,
    last_suspend_cycle: Option<u64>,
    faulted: Option<crate::error::FaultContext>,
    debug_flags: u32,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::new()
    }
}

impl Kernel {
    pub fn new() -> Self {
        Kernel {
            clocks: ClockRegistry::new(),
            processes: Arena::new(),
            storages: Arena::new(),
            arbitrators: Arena::new(),
            objects: ObjectTree::new(),
            sampling: SamplingRegistry::new(),
            active_clocks: Vec::new(),
            master_cycle: 0,
            phase: None,
            started: false,
            aborted: false,
            suspended: false,
            last_suspend_cycle: None,
            faulted: None,
            debug_flags: 0,
        }
    }

    fn check_not_started(&self) -> Result<(), SetupError> {
        if self.started {
            Err(SetupError::SimulationAlreadyStarted(self.master_cycle))
        } else {
            Ok(())
        }
    }

    // ---- Construction API -------------------------------------------------

    /// Register a clock at `frequency_hz`, or return the existing one if
    /// a clock at that frequency was already created. Recomputes the
    /// master frequency (the LCM of every distinct frequency) as a side
    /// effect of admitting a genuinely new one.
    pub fn create_clock(&mut self, frequency_hz: u64) -> Result<ClockId, SetupError> {
        self.check_not_started()?;
        if frequency_hz == 0 {
            return Err(SetupError::InvalidFrequency(frequency_hz));
        }
        if let Some(existing) = self.clocks.find(frequency_hz) {
            return Ok(existing);
        }
        let id = self.clocks.create(frequency_hz);
        debug!(frequency_hz, master_frequency = self.clocks.master_frequency(), "clock registered");
        Ok(id)
    }

    pub fn master_frequency(&self) -> u64 {
        self.clocks.master_frequency()
    }

    /// Register a process on `clock`. The process is not scheduled
    /// until [`Kernel::activate_process`] is called on it (typically
    /// done immediately after construction).
    pub fn create_process(
        &mut self,
        clock: ClockId,
        name: impl Into<String>,
        step_fn: impl FnMut(Phase, &mut StepContext<'_>) -> crate::process::StepOutcome + 'static,
    ) -> Result<ProcessId, SetupError> {
        self.check_not_started()?;
        let step_fn: StepFn = Box::new(step_fn);
        let id = self.processes.insert(ProcessData::new(name.into(), clock, step_fn));
        Ok(id)
    }

    pub fn create_register<T: Clone + 'static>(
        &mut self,
        clock: ClockId,
        initial: T,
    ) -> Result<RegisterId<T>, SetupError> {
        self.check_not_started()?;
        let id = self.storages.insert(Box::new(Register::new(clock, initial)));
        Ok(RegisterId::new(id))
    }

    pub fn create_flag(&mut self, clock: ClockId, initial: bool) -> Result<FlagId, SetupError> {
        self.check_not_started()?;
        Ok(self.storages.insert(Box::new(Flag::new(clock, initial))))
    }

    pub fn create_buffer<T: 'static>(
        &mut self,
        clock: ClockId,
        capacity: usize,
    ) -> Result<BufferId<T>, SetupError> {
        self.check_not_started()?;
        if capacity == 0 {
            return Err(SetupError::InvalidCapacity(capacity));
        }
        let id = self.storages.insert(Box::new(Buffer::<T>::new(clock, capacity)));
        Ok(BufferId::new(id))
    }

    pub fn create_ordered_queue<T: 'static, K: Ord + Clone + 'static>(
        &mut self,
        clock: ClockId,
    ) -> Result<OrderedQueueId<T, K>, SetupError> {
        self.check_not_started()?;
        let id = self.storages.insert(Box::new(OrderedQueue::<T, K>::new(clock)));
        Ok(OrderedQueueId::new(id))
    }

    pub fn create_counter(&mut self, clock: ClockId, initial: i64) -> Result<CounterId, SetupError> {
        self.check_not_started()?;
        Ok(self.storages.insert(Box::new(Counter::new(clock, initial))))
    }

    pub fn create_arbitrator(
        &mut self,
        clock: ClockId,
        name: impl Into<String>,
    ) -> Result<ArbitratorId, SetupError> {
        self.check_not_started()?;
        Ok(self.arbitrators.insert(ArbitratorData::new(name.into(), clock)))
    }

    /// Subscribe `process` to wake on a storage's empty-to-non-empty (or
    /// cleared-to-set) transition. Accepts any typed storage handle via
    /// [`Into<StorageId>`].
    pub fn subscribe(&mut self, storage: impl Into<StorageId>, process: ProcessId) -> Result<(), SetupError> {
        self.check_not_started()?;
        self.storages.get_mut(storage.into()).add_subscriber(process);
        Ok(())
    }

    pub fn create_object(&mut self, parent: Option<ObjectId>, name: &str) -> Result<ObjectId, SetupError> {
        self.check_not_started()?;
        self.objects.create(parent, name)
    }

    pub fn object_path(&self, id: ObjectId) -> String {
        self.objects.path(id)
    }

    pub fn resolve_object(&self, path: &str) -> Result<ObjectId, SetupError> {
        self.objects.resolve(path)
    }

    pub fn register_sample(
        &mut self,
        name: impl Into<String>,
        category: SampleCategory,
        read: impl Fn(&Kernel) -> SampleValue + 'static,
    ) -> Result<(), SetupError> {
        self.check_not_started()?;
        self.sampling.register(name, category, read);
        Ok(())
    }

    // ---- Simulation API -----------------------------------------------

    pub fn cycle_no(&self) -> u64 {
        self.master_cycle
    }

    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn stop(&mut self) {
        self.suspended = true;
    }

    pub fn debug_flags_set(&mut self, mask: u32) {
        self.debug_flags |= mask;
    }

    pub fn debug_flags_toggle(&mut self, mask: u32) {
        self.debug_flags ^= mask;
    }

    pub fn debug_flags(&self) -> u32 {
        self.debug_flags
    }

    /// Add `process` to its clock's active list (idempotent) and queue
    /// the clock on the scheduler if it was not already queued.
    pub fn activate_process(&mut self, process: ProcessId) {
        let clock = self.processes.get(process).clock;
        let data = self.processes.get_mut(process);
        if !data.active {
            data.active = true;
            self.clocks.get_mut(clock).active_processes.push(process);
        }
        self.queue_clock(clock);
    }

    /// Remove `process` from its clock's active list. It will not run
    /// again until reactivated, either explicitly or by a storage it
    /// subscribes to becoming ready.
    pub fn deactivate_process(&mut self, process: ProcessId) {
        let clock = self.processes.get(process).clock;
        let data = self.processes.get_mut(process);
        data.active = false;
        data.state = ProcessState::Idle;
        self.clocks.get_mut(clock).active_processes.retain(|&p| p != process);
    }

    fn mark_storage_pending(&mut self, id: StorageId) {
        let clock = self.storages.get(id).clock();
        let c = self.clocks.get_mut(clock);
        if !c.active_storages.contains(&id) {
            c.active_storages.push(id);
        }
        self.queue_clock(clock);
    }

    fn mark_arbitrator_active(&mut self, id: ArbitratorId) {
        let data = self.arbitrators.get_mut(id);
        let clock = data.clock;
        if !data.active {
            data.active = true;
            self.clocks.get_mut(clock).active_arbitrators.push(id);
        }
        self.queue_clock(clock);
    }

    /// Ensure `clock` has an entry on the active-clock queue. A clock
    /// already queued keeps the `next_fire` it was given when it first
    /// joined the queue this epoch; activation within the same epoch
    /// never pulls that cycle earlier.
    fn queue_clock(&mut self, id: ClockId) {
        let c = self.clocks.get_mut(id);
        if c.queued {
            return;
        }
        c.queued = true;
        // Smallest multiple of this clock's period that is >= the
        // current master cycle: a write committed exactly on a tick
        // boundary of the target clock can wake a subscriber in time
        // for that very cycle's acquire phase.
        let period = c.period;
        c.next_fire = self.master_cycle.div_ceil(period) * period;
        self.active_clocks.push(id);
    }

    // ---- Introspection API ----------------------------------------------

    pub fn processes(&self) -> impl Iterator<Item = ProcessInfo> + '_ {
        self.processes.iter().map(|(id, p)| ProcessInfo {
            id,
            name: p.name.clone(),
            state: p.state,
            stall_count: p.stall_count,
            owning_clock_frequency: self.clocks.get(p.clock).frequency_hz,
        })
    }

    pub fn clocks(&self) -> impl Iterator<Item = ClockInfo> + '_ {
        self.clocks.ids().map(|id| {
            let c = self.clocks.get(id);
            ClockInfo {
                id,
                frequency_hz: c.frequency_hz,
                period: c.period,
                ticks_elapsed: c.current_cycle(self.master_cycle),
            }
        })
    }

    /// Processes currently marked deadlocked, for diagnosing a
    /// [`RunState::Deadlock`] result.
    pub fn deadlocked_processes(&self) -> Vec<ProcessInfo> {
        self.processes().filter(|p| p.state == ProcessState::Deadlocked).collect()
    }

    // ---- Sampling API -----------------------------------------------------

    pub fn sample_snapshot(&self) -> Vec<SampleReading> {
        // `SamplingRegistry` holds `&self`-only closures, so borrowing
        // it out of the kernel to call `snapshot(self)` back in does
        // not alias any mutable state.
        let registry = &self.sampling;
        registry.snapshot(self)
    }

    // ---- Storage read/write, used by `StepContext` -----------------------

    pub(crate) fn read_register<T: Clone + 'static>(&self, id: RegisterId<T>) -> T {
        cell_ref::<Register<T>>(&self.storages, id.raw()).read()
    }

    pub(crate) fn write_register<T: Clone + 'static>(&mut self, id: RegisterId<T>, value: T) {
        cell_mut::<Register<T>>(&mut self.storages, id.raw()).write(value);
        self.mark_storage_pending(id.raw());
    }

    pub(crate) fn flag_is_set(&self, id: FlagId) -> bool {
        cell_ref::<Flag>(&self.storages, id).is_set()
    }

    pub(crate) fn flag_set(&mut self, id: FlagId) {
        cell_mut::<Flag>(&mut self.storages, id).set();
        self.mark_storage_pending(id);
    }

    pub(crate) fn flag_clear(&mut self, id: FlagId) {
        cell_mut::<Flag>(&mut self.storages, id).clear();
        self.mark_storage_pending(id);
    }

    pub(crate) fn buffer_front<T: 'static>(&self, id: BufferId<T>) -> Option<&T> {
        cell_ref::<Buffer<T>>(&self.storages, id.raw()).front()
    }

    pub(crate) fn buffer_is_empty<T: 'static>(&self, id: BufferId<T>) -> bool {
        cell_ref::<Buffer<T>>(&self.storages, id.raw()).is_empty()
    }

    pub(crate) fn buffer_len<T: 'static>(&self, id: BufferId<T>) -> usize {
        cell_ref::<Buffer<T>>(&self.storages, id.raw()).len()
    }

    pub(crate) fn buffer_max_observed<T: 'static>(&self, id: BufferId<T>) -> usize {
        cell_ref::<Buffer<T>>(&self.storages, id.raw()).max_observed_size()
    }

    pub(crate) fn buffer_push<T: 'static>(&mut self, id: BufferId<T>, value: T) -> bool {
        let accepted = cell_mut::<Buffer<T>>(&mut self.storages, id.raw()).push(value);
        if accepted {
            self.mark_storage_pending(id.raw());
        }
        accepted
    }

    pub(crate) fn buffer_pop<T: 'static>(&mut self, id: BufferId<T>) {
        cell_mut::<Buffer<T>>(&mut self.storages, id.raw()).pop();
        self.mark_storage_pending(id.raw());
    }

    pub(crate) fn queue_front<T: 'static, K: Ord + Clone + 'static>(
        &self,
        id: OrderedQueueId<T, K>,
    ) -> Option<&T> {
        cell_ref::<OrderedQueue<T, K>>(&self.storages, id.raw()).front()
    }

    pub(crate) fn queue_is_empty<T: 'static, K: Ord + Clone + 'static>(
        &self,
        id: OrderedQueueId<T, K>,
    ) -> bool {
        cell_ref::<OrderedQueue<T, K>>(&self.storages, id.raw()).is_empty()
    }

    pub(crate) fn queue_len<T: 'static, K: Ord + Clone + 'static>(&self, id: OrderedQueueId<T, K>) -> usize {
        cell_ref::<OrderedQueue<T, K>>(&self.storages, id.raw()).len()
    }

    pub(crate) fn queue_push<T: 'static, K: Ord + Clone + 'static>(
        &mut self,
        id: OrderedQueueId<T, K>,
        key: K,
        value: T,
    ) {
        cell_mut::<OrderedQueue<T, K>>(&mut self.storages, id.raw()).push(key, value);
        self.mark_storage_pending(id.raw());
    }

    pub(crate) fn queue_pop<T: 'static, K: Ord + Clone + 'static>(&mut self, id: OrderedQueueId<T, K>) {
        cell_mut::<OrderedQueue<T, K>>(&mut self.storages, id.raw()).pop();
        self.mark_storage_pending(id.raw());
    }

    pub(crate) fn counter_read(&self, id: CounterId) -> i64 {
        cell_ref::<Counter>(&self.storages, id).read()
    }

    pub(crate) fn counter_add(&mut self, id: CounterId, delta: i64) {
        cell_mut::<Counter>(&mut self.storages, id).add(delta);
        self.mark_storage_pending(id);
    }

    pub(crate) fn request(&mut self, arbitrator: ArbitratorId, process: ProcessId, priority: u32) {
        self.arbitrators.get_mut(arbitrator).request(process, priority);
        self.mark_arbitrator_active(arbitrator);
    }
}

/// The only handle a process's step closure ever receives. Bundles a
/// `&mut Kernel` with the identity of the process currently running so
/// that storage and arbitrator calls can be attributed correctly.
pub struct StepContext<'a> {
    kernel: &'a mut Kernel,
    process: ProcessId,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(kernel: &'a mut Kernel, process: ProcessId) -> Self {
        StepContext { kernel, process }
    }

    pub fn phase(&self) -> Phase {
        self.kernel.phase.expect("StepContext used outside of an active phase")
    }

    pub fn is_commit(&self) -> bool {
        self.phase() == Phase::Commit
    }

    pub fn master_cycle(&self) -> u64 {
        self.kernel.master_cycle
    }

    pub fn process(&self) -> ProcessId {
        self.process
    }

    pub fn read_register<T: Clone + 'static>(&self, handle: RegisterId<T>) -> T {
        self.kernel.read_register(handle)
    }

    pub fn write_register<T: Clone + 'static>(&mut self, handle: RegisterId<T>, value: T) {
        self.kernel.write_register(handle, value);
    }

    pub fn flag_is_set(&self, handle: FlagId) -> bool {
        self.kernel.flag_is_set(handle)
    }

    pub fn flag_set(&mut self, handle: FlagId) {
        self.kernel.flag_set(handle);
    }

    pub fn flag_clear(&mut self, handle: FlagId) {
        self.kernel.flag_clear(handle);
    }

    pub fn buffer_front<T: 'static>(&self, handle: BufferId<T>) -> Option<&T> {
        self.kernel.buffer_front(handle)
    }

    pub fn buffer_is_empty<T: 'static>(&self, handle: BufferId<T>) -> bool {
        self.kernel.buffer_is_empty(handle)
    }

    pub fn buffer_len<T: 'static>(&self, handle: BufferId<T>) -> usize {
        self.kernel.buffer_len(handle)
    }

    pub fn buffer_max_observed<T: 'static>(&self, handle: BufferId<T>) -> usize {
        self.kernel.buffer_max_observed(handle)
    }

    pub fn buffer_push<T: 'static>(&mut self, handle: BufferId<T>, value: T) -> bool {
        self.kernel.buffer_push(handle, value)
    }

    pub fn buffer_pop<T: 'static>(&mut self, handle: BufferId<T>) {
        self.kernel.buffer_pop(handle);
    }

    pub fn queue_front<T: 'static, K: Ord + Clone + 'static>(&self, handle: OrderedQueueId<T, K>) -> Option<&T> {
        self.kernel.queue_front(handle)
    }

    pub fn queue_is_empty<T: 'static, K: Ord + Clone + 'static>(&self, handle: OrderedQueueId<T, K>) -> bool {
        self.kernel.queue_is_empty(handle)
    }

    pub fn queue_len<T: 'static, K: Ord + Clone + 'static>(&self, handle: OrderedQueueId<T, K>) -> usize {
        self.kernel.queue_len(handle)
    }

    pub fn queue_push<T: 'static, K: Ord + Clone + 'static>(
        &mut self,
        handle: OrderedQueueId<T, K>,
        key: K,
        value: T,
    ) {
        self.kernel.queue_push(handle, key, value);
    }

    pub fn queue_pop<T: 'static, K: Ord + Clone + 'static>(&mut self, handle: OrderedQueueId<T, K>) {
        self.kernel.queue_pop(handle);
    }

    pub fn counter_read(&self, handle: CounterId) -> i64 {
        self.kernel.counter_read(handle)
    }

    pub fn counter_add(&mut self, handle: CounterId, delta: i64) {
        self.kernel.counter_add(handle, delta);
    }

    /// Request an arbitrator on behalf of the process currently
    /// running. Only meaningful during [`Phase::Acquire`].
    pub fn request(&mut self, arbitrator: ArbitratorId, priority: u32) {
        let process = self.process;
        self.kernel.request(arbitrator, process, priority);
    }

    pub fn activate_process(&mut self, process: ProcessId) {
        self.kernel.activate_process(process);
    }

    pub fn deactivate_process(&mut self, process: ProcessId) {
        self.kernel.deactivate_process(process);
    }

    pub fn abort(&mut self) {
        self.kernel.abort();
    }

    pub fn stop(&mut self) {
        self.kernel.stop();
    }
}

// Untyped handles (`Flag`, `Counter`) are already `StorageId`; the
// boxed typed ones convert for the benefit of `Kernel::subscribe`.
impl<T> From<RegisterId<T>> for StorageId {
    fn from(id: RegisterId<T>) -> StorageId {
        id.raw()
    }
}
impl<T> From<BufferId<T>> for StorageId {
    fn from(id: BufferId<T>) -> StorageId {
        id.raw()
    }
}
impl<T, K> From<OrderedQueueId<T, K>> for StorageId {
    fn from(id: OrderedQueueId<T, K>) -> StorageId {
        id.raw()
    }
}
