//! Segment pool — large, OS-backed regions that back every block.

use crate::block::{align_up, BlockHeader, HEADER_SIZE};

/// A contiguous, word-aligned memory region owned by the heap.
///
/// Backed by `Vec<usize>` rather than `Vec<u8>` so the region's start
/// address is guaranteed word-aligned without resorting to raw OS calls —
/// the same trick `otter-vm-gc::marked_block::MarkedBlock` uses
/// (`storage: Vec<u64>`) to get 8-byte alignment for its cells.
pub struct Segment {
    storage: Vec<usize>,
    size_bytes: usize,
}

impl Segment {
    /// Allocate a new segment of at least `size_bytes`, rounded up to a
    /// whole number of words. Returns `None` on allocation failure.
    pub fn new(size_bytes: usize) -> Option<Self> {
        let word = std::mem::size_of::<usize>();
        let words = size_bytes.div_ceil(word);
        let mut storage = Vec::new();
        storage.try_reserve_exact(words).ok()?;
        storage.resize(words, 0);
        Some(Self {
            size_bytes: words * word,
            storage,
        })
    }

    /// Initialize the segment with a single FREE block spanning its
    /// entire body and return a pointer to that block's header.
    pub fn install_initial_block(&mut self) -> *mut BlockHeader {
        let header = self.as_mut_ptr() as *mut BlockHeader;
        // SAFETY: `self.storage` is at least one header long for any
        // segment size this crate creates in practice (segment_size is a
        // configuration value, never zero in `HeapConfig::default`), and
        // is word-aligned, satisfying BlockHeader's alignment.
        unsafe {
            (*header).size = self.size_bytes - HEADER_SIZE;
            (*header).magic = crate::block::BLOCK_MAGIC;
            (*header).flags = crate::block::FLAG_FREE;
            (*header).next_free = std::ptr::null_mut();
        }
        header
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.storage.as_ptr() as *const u8
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.storage.as_mut_ptr() as *mut u8
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size_bytes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    /// Whether the byte address `addr` falls within `[start, end)` of this
    /// segment.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let start = self.as_ptr() as usize;
        addr >= start && addr < start + self.len()
    }

    /// Largest request size (already aligned) a fresh segment of this size
    /// could ever satisfy as a single block.
    pub fn usable_capacity(size_bytes: usize) -> usize {
        align_up(size_bytes.saturating_sub(HEADER_SIZE))
    }
}
