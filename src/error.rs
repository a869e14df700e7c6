//! Heap error types

use thiserror::Error;

/// Errors surfaced at the heap API boundary.
///
/// `allocate` and `deallocate` do not use this type — see their doc
/// comments for why they stay `Option`/no-op instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// A new segment could not be obtained from the OS allocator.
    #[error("out of memory")]
    OutOfMemory,

    /// The root-address vector could not grow to hold another entry.
    #[error("root registry capacity exceeded")]
    RootsCapacityExceeded,

    /// `roots_remove` was called with a slot address that isn't registered.
    #[error("root slot not registered")]
    SlotNotRegistered,

    /// `thread_register` was called twice on the same OS thread.
    #[error("thread already registered")]
    ThreadAlreadyRegistered,

    /// `thread_unregister` (or the `ThreadGuard` drop path) ran on a thread
    /// with no matching record.
    #[error("thread not registered")]
    ThreadNotRegistered,

    /// The platform stack-bounds primitive failed.
    #[error("failed to determine thread stack bounds")]
    StackBoundsUnavailable,
}

/// Result type for fallible heap operations.
pub type HeapResult<T> = Result<T, HeapError>;
