//! End-to-end smoke test driving the heap the way a client program would:
//! allocate, root one pointer, collect, allocate again, tear down.
//!
//! Adapted from the minimal client program this crate's behavior was
//! validated against — same three-allocation, one-root, one-collect shape.

use conservative_heap::{Heap, HeapConfig};

fn main() {
    #[cfg(feature = "gc_logging")]
    tracing_subscriber::fmt::init();

    let heap = Heap::new(HeapConfig::default()).expect("create heap");
    let _guard = heap.register_thread().expect("register main thread");

    let a = heap.allocate(64).expect("allocate a").as_ptr();
    let b: *mut u8 = heap.allocate(64).expect("allocate b").as_ptr();

    // b's payload holds a pointer back to a, exercising the conservative
    // scan of a live block's own body during mark.
    unsafe {
        std::ptr::write(b as *mut *mut u8, a);
    }

    heap.register_root(&b as *const *mut u8).expect("register root");
    let stats = heap.collect();
    println!(
        "collect: marked={} swept={} freed={}",
        stats.blocks_marked, stats.blocks_swept, stats.bytes_freed
    );

    let c = heap.allocate(64).expect("allocate c").as_ptr();
    println!("a={a:p} b={b:p} c={c:p}");

    heap.unregister_root(&b as *const *mut u8).expect("unregister root");
}
