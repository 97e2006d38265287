/*!
Sampling registry: named state variables that tests and tools can read
without walking the object tree.

A component registers a `(name, category, reader)` triple before the
first step; the reader is a closure that, given the kernel, produces
the variable's current value. [`SamplingRegistry::snapshot`] evaluates
every registered reader at once, in registration order, which is the
only ordering guarantee sampling needs — samples are read-only
projections of state and cannot feed back into scheduling.
*/

use crate::kernel::Kernel;

/// How a sampled variable should be interpreted by a consumer (a
/// stats printer, a regression test). Purely descriptive: the kernel
/// does not change how it reads a variable based on its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCategory {
    /// Monotonically increasing over the run (e.g. total instructions retired).
    Cumulative,
    /// Point-in-time level that can go up or down (e.g. buffer occupancy).
    Level,
    /// A discrete state/enum value (e.g. process state, kernel phase).
    State,
    /// The maximum value observed so far (e.g. max buffer occupancy).
    MaxWatermark,
}

/// The value produced by a single sample read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleValue {
    Integer(i64),
    Boolean(bool),
}

/// One evaluated sample, as returned by [`SamplingRegistry::snapshot`].
#[derive(Debug, Clone)]
pub struct SampleReading {
    pub name: String,
    pub category: SampleCategory,
    pub value: SampleValue,
}

type SampleFn = Box<dyn Fn(&Kernel) -> SampleValue>;

struct SampleEntry {
    name: String,
    category: SampleCategory,
    read: SampleFn,
}

#[derive(Default)]
pub(crate) struct SamplingRegistry {
    entries: Vec<SampleEntry>,
}

impl SamplingRegistry {
    pub fn new() -> Self {
        SamplingRegistry::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        category: SampleCategory,
        read: impl Fn(&Kernel) -> SampleValue + 'static,
    ) {
        self.entries.push(SampleEntry { name: name.into(), category, read: Box::new(read) });
    }

    pub fn snapshot(&self, kernel: &Kernel) -> Vec<SampleReading> {
        self.entries
            .iter()
            .map(|e| SampleReading {
                name: e.name.clone(),
                category: e.category,
                value: (e.read)(kernel),
            })
            .collect()
    }
}
