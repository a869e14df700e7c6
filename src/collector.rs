//! Mark-and-sweep collection over the heap's segments.
//!
//! Scanning is conservative: every word-aligned value in a root slot or a
//! scanned stack range is treated as a *candidate* pointer and tested
//! against the segment set before it is trusted. A block already reachable
//! from a marked block is itself scanned for further candidates, so the
//! mark phase is transitive over live object bodies, not just over the
//! root set.

use std::mem::size_of;

use crate::block::{BlockHeader, BLOCK_MAGIC, HEADER_SIZE};
use crate::heap::HeapState;

/// Counts from a single collection cycle, returned to the caller of
/// `Heap::collect` for diagnostics/logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub blocks_marked: usize,
    pub blocks_swept: usize,
    pub bytes_freed: usize,
}

/// Run one full mark-and-sweep cycle against `state`.
///
/// `stack_ranges` is `(sp, stack.high)` for every registered thread other
/// than the caller — the collector itself does not know how to obtain
/// these; the caller (`Heap::collect`, after the stop-the-world
/// rendezvous) gathers them from the thread registry, excluding its own
/// record.
pub fn collect(state: &mut HeapState, stack_ranges: &[(usize, usize)]) -> CollectStats {
    let mut worklist: Vec<usize> = Vec::new();

    for slot in state.roots.iter() {
        // SAFETY: every address in `roots` was registered by the client as
        // pointing at a live `*mut u8` slot it still owns.
        let value = unsafe { *slot } as usize;
        worklist.push(value);
    }

    for &(low, high) in stack_ranges {
        scan_range(low, high, &mut worklist);
    }

    let mut blocks_marked = 0usize;
    while let Some(candidate) = worklist.pop() {
        if let Some(header) = try_mark(state, candidate) {
            blocks_marked += 1;
            unsafe {
                let payload = BlockHeader::payload_ptr(header);
                scan_range(payload as usize, payload as usize + (*header).size, &mut worklist);
            }
        }
    }

    let (blocks_swept, bytes_freed) = sweep(state);

    CollectStats {
        blocks_marked,
        blocks_swept,
        bytes_freed,
    }
}

/// Push every word-aligned value in `[low, high)` onto `worklist`.
fn scan_range(low: usize, high: usize, worklist: &mut Vec<usize>) {
    let word = size_of::<usize>();
    let low = crate::block::align_up(low);
    let mut addr = low;
    while addr + word <= high {
        // SAFETY: the range comes from a live, currently-parked thread's
        // stack or from a live block's own payload — both are valid to read
        // for their full extent while the world is stopped.
        let value = unsafe { *(addr as *const usize) };
        worklist.push(value);
        addr += word;
    }
}

/// If `candidate` is exactly the payload address of a live, unmarked block
/// inside one of `state`'s segments, mark it and return its header.
/// Interior pointers (addresses inside a block's body, not at its start)
/// are deliberately not recognized — matches the original's
/// `heap_gc_mark_one_if_block`.
fn try_mark(state: &mut HeapState, candidate: usize) -> Option<*mut BlockHeader> {
    if candidate % crate::block::ALIGNMENT != 0 {
        return None;
    }

    for segment in &state.segments {
        if !segment.contains(candidate) {
            continue;
        }
        let header_addr = candidate.checked_sub(HEADER_SIZE)?;
        if !segment.contains(header_addr) {
            return None;
        }
        let header = header_addr as *mut BlockHeader;
        unsafe {
            if (*header).magic != BLOCK_MAGIC {
                return None;
            }
            if (*header).is_free() || (*header).is_marked() {
                return None;
            }
            (*header).set_mark();
        }
        return Some(header);
    }
    None
}

/// Walk every segment's blocks linearly. Marked blocks are unmarked and
/// kept; unmarked live blocks are returned to the free list. Already-free
/// blocks are left untouched (and not double-counted in `bytes_freed`).
///
/// A block whose magic doesn't match or whose size is zero or would run
/// past the segment's end stops the walk for that segment — the layout
/// from that point on can no longer be trusted, so blocks past it are left
/// alone rather than guessed at. Mirrors the original `for_each_block`.
fn sweep(state: &mut HeapState) -> (usize, usize) {
    let mut swept = 0usize;
    let mut freed = 0usize;

    for segment in &mut state.segments {
        let seg_len = segment.len();
        let mut offset = 0usize;

        while offset + HEADER_SIZE <= seg_len {
            let header = unsafe { segment.as_mut_ptr().add(offset) } as *mut BlockHeader;
            let (magic, size, is_free, is_marked) =
                unsafe { ((*header).magic, (*header).size, (*header).is_free(), (*header).is_marked()) };

            if magic != BLOCK_MAGIC || size == 0 || offset + HEADER_SIZE + size > seg_len {
                break;
            }

            if is_marked {
                unsafe {
                    (*header).clear_mark();
                }
            } else if !is_free {
                unsafe {
                    (*header).set_free();
                }
                state.free_list.push(header);
                state.allocated_bytes -= size;
                swept += 1;
                freed += size;
            }

            offset += HEADER_SIZE + size;
        }
    }

    (swept, freed)
}
