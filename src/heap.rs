//! The heap: segment growth, allocation, explicit free, thread lifecycle,
//! and collection orchestration.

use std::ptr::NonNull;
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex};

use crate::block::{align_up, BlockHeader, FreeList, ALIGNMENT, BLOCK_MAGIC, HEADER_SIZE};
use crate::collector::{self, CollectStats};
use crate::error::{HeapError, HeapResult};
use crate::roots::RootRegistry;
use crate::segment::Segment;
use crate::thread::{ThreadGuard, ThreadRecord, ThreadStatus};

/// Tunables fixed at heap creation.
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    /// Size in bytes of each segment requested from the OS allocator.
    pub segment_size: usize,
    /// Live-byte watermark past which a future policy could trigger an
    /// automatic collection. Stored and exposed via [`Heap::config`] but not
    /// acted on by this version — collection is always explicit, via
    /// [`Heap::collect`]. Reserved the way the original header reserves a
    /// field for a policy it never wires up either.
    pub gc_threshold_bytes: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        let segment_size = 1 << 20;
        Self {
            segment_size,
            gc_threshold_bytes: segment_size,
        }
    }
}

/// State protected by the heap's single lock.
pub(crate) struct HeapState {
    pub(crate) segments: Vec<Segment>,
    pub(crate) free_list: FreeList,
    pub(crate) roots: RootRegistry,
    pub(crate) threads: Vec<ThreadRecord>,
    pub(crate) gc_requested: bool,
    /// Sum of `size` over every currently non-FREE block. Maintained by
    /// `carve`, `deallocate`, and the collector's sweep phase.
    pub(crate) allocated_bytes: usize,
}

/// A thread-aware, conservative, stop-the-world mark-and-sweep heap.
///
/// Always owned behind an `Arc` (see [`Heap::new`]) — [`ThreadGuard`] needs
/// its own reference-counted handle so a heap can never be destroyed out
/// from under a still-registered thread.
pub struct Heap {
    state: Mutex<HeapState>,
    safepoint_cv: Condvar,
    config: HeapConfig,
}

impl Heap {
    /// Create a heap with one initial segment already carved into a single
    /// free block.
    pub fn new(config: HeapConfig) -> HeapResult<Arc<Self>> {
        let mut state = HeapState {
            segments: Vec::new(),
            free_list: FreeList::new(),
            roots: RootRegistry::new(),
            threads: Vec::new(),
            gc_requested: false,
            allocated_bytes: 0,
        };
        Self::grow(&mut state, &config)?;
        Ok(Arc::new(Self {
            state: Mutex::new(state),
            safepoint_cv: Condvar::new(),
            config,
        }))
    }

    pub fn config(&self) -> HeapConfig {
        self.config
    }

    /// Sum of `size` over every currently non-FREE block.
    pub fn allocated_bytes(&self) -> usize {
        self.state.lock().allocated_bytes
    }

    /// Attempt to tear down the heap. Succeeds only if `this` is the last
    /// remaining handle — in particular, every registered thread must have
    /// dropped its [`ThreadGuard`] first, since each guard holds a clone.
    /// On failure the `Arc` is handed back unchanged so the caller can
    /// retry once outstanding handles are gone.
    pub fn destroy(this: Arc<Self>) -> Result<(), Arc<Self>> {
        Arc::try_unwrap(this).map(|_heap| ())
    }

    /// Add one fresh segment of exactly `config.segment_size` bytes,
    /// install it as one free block, and link that block into the free
    /// list. A single request larger than a segment's usable capacity is
    /// never satisfied by growing an oversized segment — it fails with
    /// `OutOfMemory` at the `allocate` call site instead, matching the
    /// original's fixed-size `segment_create(h->segment_size_bytes)`.
    fn grow(state: &mut HeapState, config: &HeapConfig) -> HeapResult<()> {
        let mut segment = Segment::new(config.segment_size).ok_or(HeapError::OutOfMemory)?;
        let header = segment.install_initial_block();
        state.segments.push(segment);
        state.free_list.push(header);
        Ok(())
    }

    /// Allocate `size` bytes. Polls the safepoint first, so a call made
    /// while another thread is mid-collect blocks until that collection
    /// finishes rather than racing it. Returns `None` on request size 0 or
    /// on allocation failure (no more memory could be obtained) — mirrors
    /// `malloc`'s return-null convention rather than introducing an error
    /// variant for an outcome every allocator caller must already check.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        self.safepoint();

        let req = align_up(size).max(ALIGNMENT);
        let mut state = self.state.lock();

        if let Some(header) = state.free_list.take_first_fit(req) {
            return Some(Self::carve(&mut state, header, req));
        }

        Self::grow(&mut state, &self.config).ok()?;
        let header = state.free_list.take_first_fit(req)?;
        Some(Self::carve(&mut state, header, req))
    }

    /// Split `header`'s block down to `req` bytes if the remainder is large
    /// enough to host another block, then mark it allocated, zero its
    /// payload, and return it. No coalescing is performed on the split-off
    /// remainder; it simply rejoins the free list as its own block.
    fn carve(state: &mut HeapState, header: *mut BlockHeader, req: usize) -> NonNull<u8> {
        unsafe {
            let total = (*header).size;
            let remainder = total - req;

            if remainder >= HEADER_SIZE + ALIGNMENT {
                let split = (header as *mut u8).add(HEADER_SIZE + req) as *mut BlockHeader;
                (*split).size = remainder - HEADER_SIZE;
                (*split).magic = BLOCK_MAGIC;
                (*split).flags = crate::block::FLAG_FREE;
                (*split).next_free = std::ptr::null_mut();
                state.free_list.push(split);
                (*header).size = req;
            }

            (*header).clear_free();
            (*header).clear_mark();
            let payload = BlockHeader::payload_ptr(header);
            std::ptr::write_bytes(payload, 0, (*header).size);
            state.allocated_bytes += (*header).size;
            NonNull::new_unchecked(payload)
        }
    }

    /// Explicitly return a block to the free list ahead of the next
    /// collection. A no-op if `ptr` doesn't land inside any live segment or
    /// no longer names a live, allocated block — double frees and stray
    /// pointers are silently ignored rather than trusted.
    pub fn deallocate(&self, ptr: NonNull<u8>) {
        let mut state = self.state.lock();
        let header = unsafe { BlockHeader::header_from_payload(ptr.as_ptr()) };
        let addr = header as usize;

        if !state.segments.iter().any(|s| s.contains(addr)) {
            return;
        }
        unsafe {
            if (*header).magic != BLOCK_MAGIC || (*header).is_free() {
                return;
            }
            (*header).set_free();
            state.allocated_bytes -= (*header).size;
        }
        state.free_list.push(header);
    }

    /// Register a root slot. The heap reads through `slot` on every
    /// collection, so it must keep pointing at a valid `*mut u8` (or null)
    /// for as long as it stays registered.
    pub fn register_root(&self, slot: *const *mut u8) -> HeapResult<()> {
        self.state.lock().roots.add(slot)
    }

    /// Unregister a previously registered root slot.
    pub fn unregister_root(&self, slot: *const *mut u8) -> HeapResult<()> {
        self.state.lock().roots.remove(slot)
    }

    /// Register the calling OS thread as a mutator participating in
    /// collections, capturing its current stack bounds. Returns a guard
    /// that unregisters the thread when dropped.
    pub fn register_thread(self: &Arc<Self>) -> HeapResult<ThreadGuard> {
        let id = std::thread::current().id();
        let stack = crate::platform::thread_stack_bounds()?;

        let mut state = self.state.lock();
        if state.threads.iter().any(|t| t.id == id) {
            return Err(HeapError::ThreadAlreadyRegistered);
        }
        state.threads.push(ThreadRecord::new(id, stack));
        drop(state);

        Ok(ThreadGuard::new(Arc::clone(self)))
    }

    /// Explicitly unregister the calling thread. Normally done by dropping
    /// the [`ThreadGuard`]; exposed directly for callers that want the
    /// error instead of a silent no-op drop.
    pub fn unregister_thread(&self) -> HeapResult<()> {
        self.unregister_thread_inner(std::thread::current().id())
    }

    pub(crate) fn unregister_current_thread(&self) {
        let _ = self.unregister_thread_inner(std::thread::current().id());
    }

    fn unregister_thread_inner(&self, id: ThreadId) -> HeapResult<()> {
        let mut state = self.state.lock();
        let pos = state
            .threads
            .iter()
            .position(|t| t.id == id)
            .ok_or(HeapError::ThreadNotRegistered)?;
        state.threads.remove(pos);
        self.safepoint_cv.notify_all();
        Ok(())
    }

    /// Cooperative poll point. If no collection is pending, returns
    /// immediately. Otherwise marks the calling thread parked, wakes the
    /// collector's rendezvous wait, and blocks until the collection
    /// finishes.
    ///
    /// Every allocation calls this before touching the free list;
    /// long-running code with no allocations in its hot loop should call it
    /// directly so a pending collection isn't starved.
    pub fn safepoint(&self) {
        let id = std::thread::current().id();
        let mut state = self.state.lock();
        if !state.gc_requested {
            return;
        }

        if let Some(rec) = state.threads.iter_mut().find(|t| t.id == id) {
            rec.sp = crate::platform::current_stack_pointer();
            rec.status = ThreadStatus::Parked;
        }
        self.safepoint_cv.notify_all();

        while state.gc_requested {
            self.safepoint_cv.wait(&mut state);
        }

        if let Some(rec) = state.threads.iter_mut().find(|t| t.id == id) {
            rec.status = ThreadStatus::Running;
        }
    }

    /// Run a full stop-the-world collection. Blocks until every other
    /// registered thread has reached a safepoint (rendezvous) before seeding
    /// roots and stacks — the calling thread never scans state that a
    /// still-running mutator could be concurrently mutating.
    ///
    /// Only threads *other than* the caller contribute their stack to the
    /// scan (from the parked `sp` to the stack's high bound), matching the
    /// original's "for each registered thread other than self". Anything
    /// the calling thread needs to keep alive across the collection must be
    /// reachable through a registered root, not a local on its own stack.
    pub fn collect(&self) -> CollectStats {
        let id = std::thread::current().id();
        let mut state = self.state.lock();
        state.gc_requested = true;

        while !state.threads.iter().all(|t| t.id == id || t.status == ThreadStatus::Parked) {
            self.safepoint_cv.wait(&mut state);
        }

        #[cfg(feature = "gc_logging")]
        tracing::debug!(segments = state.segments.len(), threads = state.threads.len(), "collection starting");

        let stack_ranges: Vec<(usize, usize)> = state
            .threads
            .iter()
            .filter(|t| t.id != id)
            .map(|t| (t.sp, t.stack.high))
            .collect();
        let stats = collector::collect(&mut state, &stack_ranges);

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            marked = stats.blocks_marked,
            swept = stats.blocks_swept,
            freed = stats.bytes_freed,
            "collection finished"
        );

        state.gc_requested = false;
        self.safepoint_cv.notify_all();

        stats
    }
}
