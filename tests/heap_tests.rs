//! End-to-end correctness tests for the heap's allocate/root/collect cycle.

use conservative_heap::{Heap, HeapConfig, HeapError};

fn small_heap() -> std::sync::Arc<Heap> {
    Heap::new(HeapConfig {
        segment_size: 64 * 1024,
        ..HeapConfig::default()
    })
    .expect("heap creation should succeed with plenty of address space")
}

#[test]
fn unrooted_allocation_is_reclaimed_by_collect() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();

    let _unrooted = heap.allocate(128).unwrap();
    let stats = heap.collect();

    assert_eq!(stats.blocks_marked, 0);
    assert!(stats.blocks_swept >= 1);
    assert!(stats.bytes_freed >= 128);
}

#[test]
fn rooted_allocation_survives_collect() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();

    let ptr: *mut u8 = heap.allocate(128).unwrap().as_ptr();
    heap.register_root(&ptr as *const *mut u8).unwrap();

    let stats = heap.collect();
    assert_eq!(stats.blocks_marked, 1);

    // still readable/writable after surviving collection
    unsafe {
        std::ptr::write_bytes(ptr, 0x42, 128);
        assert_eq!(*ptr, 0x42);
    }

    heap.unregister_root(&ptr as *const *mut u8).unwrap();
}

#[test]
fn unrooting_then_collecting_frees_the_block() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();

    let ptr: *mut u8 = heap.allocate(128).unwrap().as_ptr();
    heap.register_root(&ptr as *const *mut u8).unwrap();
    heap.collect();

    heap.unregister_root(&ptr as *const *mut u8).unwrap();
    let stats = heap.collect();
    assert!(stats.blocks_swept >= 1);
}

#[test]
fn reachable_through_a_rooted_blocks_own_payload_survives() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();

    let a: *mut u8 = heap.allocate(64).unwrap().as_ptr();
    let b: *mut u8 = heap.allocate(64).unwrap().as_ptr();
    unsafe {
        std::ptr::write(b as *mut *mut u8, a);
    }

    heap.register_root(&b as *const *mut u8).unwrap();
    let stats = heap.collect();

    // both a (reached transitively) and b (rooted) survive.
    assert_eq!(stats.blocks_marked, 2);
    heap.unregister_root(&b as *const *mut u8).unwrap();
}

#[test]
fn explicit_deallocate_returns_block_before_any_collection() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();

    let ptr = heap.allocate(256).unwrap();
    heap.deallocate(ptr);

    // the freed block should be reusable without growing the heap.
    let reused = heap.allocate(256).unwrap();
    assert_eq!(ptr.as_ptr(), reused.as_ptr());
}

#[test]
fn allocation_larger_than_one_segment_fails() {
    let heap = Heap::new(HeapConfig {
        segment_size: 4096,
        ..HeapConfig::default()
    })
    .unwrap();
    let _guard = heap.register_thread().unwrap();

    // growth always adds exactly one `segment_size` segment; a request that
    // can never fit in a fresh segment of that size must fail rather than
    // silently get an oversized segment of its own.
    let too_big = heap.allocate(64 * 1024);
    assert!(too_big.is_none(), "allocate must not grow an oversized segment to satisfy one request");
}

#[test]
fn reused_block_payload_is_zeroed() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();

    let ptr = heap.allocate(256).unwrap();
    unsafe {
        std::ptr::write_bytes(ptr.as_ptr(), 0xAB, 256);
    }
    heap.deallocate(ptr);

    let reused = heap.allocate(256).unwrap();
    assert_eq!(reused.as_ptr(), ptr.as_ptr());
    unsafe {
        let bytes = std::slice::from_raw_parts(reused.as_ptr(), 256);
        assert!(bytes.iter().all(|&b| b == 0), "reused payload must be zeroed");
    }
}

#[test]
fn allocated_bytes_tracks_live_blocks() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();

    assert_eq!(heap.allocated_bytes(), 0);

    let a = heap.allocate(128).unwrap();
    let after_a = heap.allocated_bytes();
    assert!(after_a >= 128);

    let b = heap.allocate(64).unwrap();
    let b_ptr = b.as_ptr();
    let after_b = heap.allocated_bytes();
    assert!(after_b >= after_a + 64);

    heap.deallocate(a);
    assert_eq!(heap.allocated_bytes(), after_b - after_a);

    // only b remains allocated; a collection that doesn't reclaim it must
    // not change allocated_bytes.
    heap.register_root(&b_ptr as *const *mut u8).unwrap();
    let before = heap.allocated_bytes();
    heap.collect();
    assert_eq!(heap.allocated_bytes(), before);
    heap.unregister_root(&b_ptr as *const *mut u8).unwrap();
}

#[test]
fn zero_size_allocation_returns_none() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();
    assert!(heap.allocate(0).is_none());
}

#[test]
fn registering_the_same_thread_twice_errors() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();
    assert_eq!(heap.register_thread().unwrap_err(), HeapError::ThreadAlreadyRegistered);
}

#[test]
fn unregistering_a_thread_twice_errors() {
    let heap = small_heap();
    let guard = heap.register_thread().unwrap();
    drop(guard);
    assert_eq!(heap.unregister_thread().unwrap_err(), HeapError::ThreadNotRegistered);
}

#[test]
fn removing_an_unregistered_root_errors() {
    let heap = small_heap();
    let _guard = heap.register_thread().unwrap();
    let ptr: *mut u8 = std::ptr::null_mut();
    assert_eq!(heap.unregister_root(&ptr as *const *mut u8).unwrap_err(), HeapError::SlotNotRegistered);
}

#[test]
fn destroy_fails_while_a_thread_is_still_registered() {
    let heap = small_heap();
    let guard = heap.register_thread().unwrap();

    let heap = Heap::destroy(heap).expect_err("a live ThreadGuard holds its own Arc clone");
    drop(guard);
    Heap::destroy(heap).expect("heap should tear down once every thread has unregistered");
}
