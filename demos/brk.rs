//! Drives the allocator against the real program break. Unix only.
//!
//! The allocator assumes nothing else moves the break while it is live,
//! but the Rust runtime's own allocator may do exactly that, so this
//! demo performs all of its allocator work first and only prints once
//! it is done with the break.

#[cfg(unix)]
fn main() {
    use std::alloc::Layout;

    use segalloc::{SegAlloc, SystemBrk};

    let brk = unsafe { SystemBrk::new() }.expect("could not read the program break");
    let mut allocator = SegAlloc::try_new(brk).expect("could not set up the heap");

    let layout = Layout::array::<u8>(64).unwrap();
    let mut addrs = [std::ptr::null_mut::<u8>(); 4];
    let reused;
    let heap_size;

    unsafe {
        for slot in addrs.iter_mut() {
            *slot = allocator.allocate(layout);
        }

        // Free them all in reverse; everything merges back into one
        // block, so the next allocation lands at the first address.
        for &addr in addrs.iter().rev() {
            allocator.deallocate(addr);
        }

        let again = allocator.allocate(layout);
        reused = again == addrs[0];
        heap_size = allocator.heap_size();
        allocator.deallocate(again);
    }

    for (i, addr) in addrs.iter().enumerate() {
        println!("Allocation {i} was at {addr:?}");
    }
    println!("Heap grew to {heap_size} bytes past the old break");
    println!(
        "After freeing everything the next allocation {} the first address",
        if reused { "reused" } else { "did not reuse" },
    );
}

#[cfg(not(unix))]
fn main() {
    println!("This demo drives the program break and only runs on Unix.");
}
