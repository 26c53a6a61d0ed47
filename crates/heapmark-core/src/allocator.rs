//! The three-operation boundary between the engine and the allocator under test.

use std::fmt::Debug;
use std::hash::Hash;

use crate::strategy::Strategy;

/// Error reported by an allocator when it rejects a `release`.
///
/// The engine only releases handles it knows to be live, so a fault here
/// means the allocator under test broke its own contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct AllocatorFault {
    pub reason: String,
}

impl AllocatorFault {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An allocator driven by the workload executor.
///
/// Implementations need not be thread-safe; each run owns its allocator
/// exclusively for the duration of the run.
pub trait AllocatorUnderTest {
    /// Opaque identifier for a live block. Must not be reused while live.
    type Handle: Copy + Eq + Hash + Debug;

    /// Reset the allocator and select its placement policy.
    ///
    /// Called exactly once at the start of every run.
    fn initialize(&mut self, strategy: Strategy);

    /// Request a block of at least `size` bytes; `None` is the failure sentinel.
    fn allocate(&mut self, size: usize) -> Option<Self::Handle>;

    /// Return a live block to the allocator.
    fn release(&mut self, handle: Self::Handle) -> Result<(), AllocatorFault>;
}

impl<A: AllocatorUnderTest + ?Sized> AllocatorUnderTest for &mut A {
    type Handle = A::Handle;

    fn initialize(&mut self, strategy: Strategy) {
        (**self).initialize(strategy);
    }

    fn allocate(&mut self, size: usize) -> Option<Self::Handle> {
        (**self).allocate(size)
    }

    fn release(&mut self, handle: Self::Handle) -> Result<(), AllocatorFault> {
        (**self).release(handle)
    }
}
