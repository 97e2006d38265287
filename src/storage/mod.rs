/*!
Storage: the deferred-visibility write discipline shared by every
concrete storage kind.

Every storage element maintains a *current* value (what reads observe)
and a buffered *next* value (what writes produce). The two are kept
distinct on purpose: a write made during cycle N must not be visible
to any reader — on any clock, in any phase — until the update pass
that opens cycle N+1 of the storage's own clock. [`StorageCell::commit`]
is the single place that promotes next into current and reports
whether the transition should wake up subscribers.

The reference simulator models this with inheritance from a `Storage`
base class and raw pointer subscriber lists; here each concrete kind
(register, flag, bounded FIFO, ordered queue, counter) is a plain
struct implementing the [`StorageCell`] trait, boxed and held in the
kernel's storage arena. Callers never see the trait object directly:
[`crate::kernel::Kernel`] hands out typed handles (`RegisterId<T>`, and
so on) and downcasts through [`StorageCell::as_any_mut`] on their
behalf, so misuse of a handle against the wrong storage kind is a
`panic!` during development rather than a silent type confusion.
*/

mod buffer;
mod counter;
mod flag;
mod queue;
mod register;

pub use buffer::{Buffer, BufferId};
pub use counter::{Counter, CounterId};
pub use flag::{Flag, FlagId};
pub use queue::{OrderedQueue, OrderedQueueId};
pub use register::{Register, RegisterId};

use std::any::Any;

use crate::clock::ClockId;
use crate::ids::{Arena, Id};
use crate::process::ProcessId;

/// Object-safe interface the kernel's update pass uses uniformly over
/// every concrete storage kind.
pub(crate) trait StorageCell: Any {
    fn clock(&self) -> ClockId;
    fn subscribers(&self) -> &[ProcessId];
    fn add_subscriber(&mut self, process: ProcessId);
    fn has_pending(&self) -> bool;
    /// Promote the buffered next-state into current-state. Returns
    /// `true` if the transition should activate subscribed processes
    /// (e.g. empty -> non-empty, or cleared -> set).
    fn commit(&mut self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Fields common to every concrete storage kind.
pub(crate) struct StorageHeader {
    pub clock: ClockId,
    pub subscribers: Vec<ProcessId>,
    pub pending: bool,
}

impl StorageHeader {
    pub fn new(clock: ClockId) -> Self {
        StorageHeader { clock, subscribers: Vec::new(), pending: false }
    }
}

pub(crate) type StorageSlot = Box<dyn StorageCell>;

/// Handle to a storage element registered with the kernel. Untyped;
/// the typed `*Id` wrappers re-exported from this module are what
/// callers actually hold.
pub type StorageId = Id<StorageSlot>;

pub(crate) type StorageArena = Arena<StorageSlot>;

/// Downcast helper shared by every typed handle's accessor methods.
pub(crate) fn cell_mut<T: StorageCell>(arena: &mut StorageArena, id: StorageId) -> &mut T {
    arena
        .get_mut(id)
        .as_any_mut()
        .downcast_mut::<T>()
        .expect("storage handle used against a storage of a different kind")
}

pub(crate) fn cell_ref<T: StorageCell>(arena: &StorageArena, id: StorageId) -> &T {
    arena
        .get(id)
        .as_any()
        .downcast_ref::<T>()
        .expect("storage handle used against a storage of a different kind")
}
