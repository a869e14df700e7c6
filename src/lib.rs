//! Thread-aware, conservative, stop-the-world mark-and-sweep garbage
//! collector over a manually managed heap.
//!
//! A [`Heap`] grows by requesting OS-backed segments and carving them into
//! blocks through a first-fit free list. Client code registers its threads
//! ([`ThreadGuard`]) and root slots (`register_root`) with the heap;
//! [`Heap::collect`] then stops every registered thread at a cooperative
//! safepoint, conservatively scans their stacks and the root set, and
//! reclaims every block that scan didn't reach.

mod block;
mod collector;
mod error;
mod heap;
mod platform;
mod roots;
mod segment;
mod thread;

pub use collector::CollectStats;
pub use error::{HeapError, HeapResult};
pub use heap::{Heap, HeapConfig};
pub use platform::StackBounds;
pub use thread::{ThreadGuard, ThreadStatus};
