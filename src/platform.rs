//! OS-specific primitives: current stack pointer and thread stack bounds.
//!
//! Isolated here so the rest of the crate never reaches for a raw libc or
//! winapi call directly — mirrors the `cfg(windows)` / `libc` split in
//! `Shadlock0133-mimalloc-rs/src/os.rs`.

use crate::error::{HeapError, HeapResult};

/// Low/high OS-reported bounds of the calling thread's stack.
///
/// `low < high`; the stack grows downward from `high` toward `low` on all
/// platforms this crate targets.
#[derive(Debug, Clone, Copy)]
pub struct StackBounds {
    pub low: usize,
    pub high: usize,
}

/// Capture the address of the current stack frame.
///
/// Stable Rust has no `__builtin_frame_address` equivalent, so this takes
/// the address of a local variable at the call site instead. The caller
/// must call this as close as possible to the point it wants captured —
/// it is accurate only up to the depth of this function's own frame, which
/// is why `safepoint` calls it directly rather than through another layer.
#[inline(always)]
pub fn current_stack_pointer() -> usize {
    let probe: u8 = 0;
    std::ptr::addr_of!(probe) as usize
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn thread_stack_bounds() -> HeapResult<StackBounds> {
    use std::mem::MaybeUninit;

    unsafe {
        let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
        if libc::pthread_getattr_np(libc::pthread_self(), attr.as_mut_ptr()) != 0 {
            return Err(HeapError::StackBoundsUnavailable);
        }
        let mut attr = attr.assume_init();

        let mut base: *mut libc::c_void = std::ptr::null_mut();
        let mut size: libc::size_t = 0;
        let rc = libc::pthread_attr_getstack(&attr, &mut base, &mut size);
        libc::pthread_attr_destroy(&mut attr);
        if rc != 0 || base.is_null() {
            return Err(HeapError::StackBoundsUnavailable);
        }

        let low = base as usize;
        Ok(StackBounds {
            low,
            high: low + size,
        })
    }
}

#[cfg(target_os = "macos")]
pub fn thread_stack_bounds() -> HeapResult<StackBounds> {
    unsafe {
        let this = libc::pthread_self();
        let high = libc::pthread_get_stackaddr_np(this) as usize;
        let size = libc::pthread_get_stacksize_np(this);
        if high == 0 || size == 0 {
            return Err(HeapError::StackBoundsUnavailable);
        }
        Ok(StackBounds {
            low: high - size,
            high,
        })
    }
}

#[cfg(windows)]
pub fn thread_stack_bounds() -> HeapResult<StackBounds> {
    use winapi::um::processthreadsapi::GetCurrentThreadStackLimits;

    unsafe {
        let mut low: usize = 0;
        let mut high: usize = 0;
        GetCurrentThreadStackLimits(&mut low as *mut usize as *mut _, &mut high as *mut usize as *mut _);
        if low == 0 || high == 0 {
            return Err(HeapError::StackBoundsUnavailable);
        }
        Ok(StackBounds { low, high })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_bounds_contain_current_frame() {
        let bounds = thread_stack_bounds().expect("stack bounds should resolve on test platforms");
        assert!(bounds.low < bounds.high);
        let sp = current_stack_pointer();
        assert!(sp >= bounds.low && sp < bounds.high);
    }
}
