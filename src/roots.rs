//! Root registry — addresses of client-held slots scanned on every collection.

use crate::error::{HeapError, HeapResult};

const INITIAL_CAPACITY: usize = 16;

/// Fallibly growable list of root slot addresses.
///
/// Grows geometrically (doubling) like `Vec`, but through
/// `try_reserve_exact` so a failed growth surfaces as
/// [`HeapError::RootsCapacityExceeded`] instead of aborting the process —
/// `Vec::push`'s infallible growth can't honor the heap's "never abort on
/// the client's behalf" contract.
pub struct RootRegistry {
    slots: Vec<*const *mut u8>,
}

// SAFETY: `RootRegistry` is only ever reached through `Heap`'s `Mutex`.
unsafe impl Send for RootRegistry {}

impl RootRegistry {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register `slot` as a root. The same address may be registered more
    /// than once; each registration needs its own `remove` call.
    pub fn add(&mut self, slot: *const *mut u8) -> HeapResult<()> {
        if self.slots.len() == self.slots.capacity() {
            let want = (self.slots.capacity() * 2).max(INITIAL_CAPACITY);
            self.slots
                .try_reserve_exact(want - self.slots.len())
                .map_err(|_| HeapError::RootsCapacityExceeded)?;
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Remove one registration of `slot`. Errors if `slot` was never
    /// registered (or all of its registrations were already removed).
    pub fn remove(&mut self, slot: *const *mut u8) -> HeapResult<()> {
        let pos = self
            .slots
            .iter()
            .rposition(|&s| s == slot)
            .ok_or(HeapError::SlotNotRegistered)?;
        self.slots.swap_remove(pos);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = *const *mut u8> + '_ {
        self.slots.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for RootRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_round_trips() {
        let mut slot: *mut u8 = std::ptr::null_mut();
        let addr = &mut slot as *mut *mut u8 as *const *mut u8;

        let mut roots = RootRegistry::new();
        roots.add(addr).unwrap();
        assert_eq!(roots.len(), 1);
        roots.remove(addr).unwrap();
        assert!(roots.is_empty());
    }

    #[test]
    fn remove_unregistered_errors() {
        let mut slot: *mut u8 = std::ptr::null_mut();
        let addr = &mut slot as *mut *mut u8 as *const *mut u8;

        let mut roots = RootRegistry::new();
        assert_eq!(roots.remove(addr), Err(HeapError::SlotNotRegistered));
    }

    #[test]
    fn duplicate_registrations_need_matching_removals() {
        let mut slot: *mut u8 = std::ptr::null_mut();
        let addr = &mut slot as *mut *mut u8 as *const *mut u8;

        let mut roots = RootRegistry::new();
        roots.add(addr).unwrap();
        roots.add(addr).unwrap();
        assert_eq!(roots.len(), 2);
        roots.remove(addr).unwrap();
        assert_eq!(roots.len(), 1);
        roots.remove(addr).unwrap();
        assert!(roots.is_empty());
        assert_eq!(roots.remove(addr), Err(HeapError::SlotNotRegistered));
    }
}
