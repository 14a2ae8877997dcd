
use std::alloc::Layout;

use segalloc::{FixedBrk, SegAlloc};

fn log_alloc(addr: *mut u8, layout: Layout) {
    println!("Requested {} bytes of memory", layout.size());
    println!("Received this address: {addr:?}");
}

fn main() {
    let brk = FixedBrk::with_capacity(1 << 20).expect("could not reserve the arena");
    let mut allocator = SegAlloc::try_new(brk).expect("could not set up the heap");

    unsafe {
        let l1 = Layout::new::<u64>();
        let addr1 = allocator.allocate(l1);
        log_alloc(addr1, l1);

        let l2 = Layout::array::<u8>(100).unwrap();
        let addr2 = allocator.allocate(l2);
        log_alloc(addr2, l2);

        let l3 = Layout::array::<u8>(100).unwrap();
        let addr3 = allocator.allocate(l3);
        log_alloc(addr3, l3);

        // Freeing the two adjacent 100 byte blocks merges them, so a
        // larger request fits where they used to be.
        allocator.deallocate(addr2);
        allocator.deallocate(addr3);

        let l4 = Layout::array::<u8>(200).unwrap();
        let addr4 = allocator.allocate(l4);
        log_alloc(addr4, l4);

        if addr4 == addr2 {
            println!("Correctly reused at {addr4:?}");
        } else {
            println!("Not reused. The pair was at {addr2:?} and the new block is at {addr4:?}");
        }

        println!("Heap size: {} bytes", allocator.heap_size());

        allocator.deallocate(addr1);
        allocator.deallocate(addr4);
    }
}
