//! The allocator frontend: [`SegAlloc`].

use std::{alloc::Layout, fmt, ptr};

use crate::{
    brk::Brk,
    heap::Heap,
    seglist::SegList,
    tag::{block_size_for, ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD, SENTINEL_PAYLOAD},
};

/// Error returned when the heap provider refuses the initial grow that
/// installs the prologue, or hands out a misaligned region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitError;

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the heap provider could not supply a usable initial region")
    }
}

impl std::error::Error for InitError {}

/// A segregated fits allocator over an sbrk style heap.
///
/// Requests are served first fit out of eight segregated free lists,
/// splitting the found block when the tail still makes a legal block.
/// When the table has no fit the heap is grown by exactly the block
/// size. Freed blocks are merged with whichever neighbours are free
/// before going back into the table, so no two adjacent free blocks
/// ever exist between calls.
///
/// The allocator is an explicit value: it is single threaded by design
/// and every operation takes `&mut self`. It assumes exclusive control
/// of its provider's region for as long as it is alive.
///
/// # Example
///
/// ```no_run
/// use std::alloc::Layout;
/// use segalloc::{FixedBrk, SegAlloc};
///
/// let brk = FixedBrk::with_capacity(1 << 20).unwrap();
/// let mut allocator = SegAlloc::try_new(brk).unwrap();
///
/// unsafe {
///     let addr = allocator.allocate(Layout::new::<u64>());
///     assert!(!addr.is_null());
///
///     *(addr as *mut u64) = 42;
///
///     allocator.deallocate(addr);
/// }
/// ```
pub struct SegAlloc<B: Brk> {
    heap: Heap<B>,
    lists: SegList,
}

impl<B: Brk> SegAlloc<B> {
    /// Prepares the heap: grows room for the alignment pad plus the
    /// sentinel block and starts with every free list empty.
    pub fn try_new(brk: B) -> Result<Self, InitError> {
        Ok(Self {
            heap: Heap::init(brk)?,
            lists: SegList::new(),
        })
    }

    /// Allocates a block for `layout` and returns its payload address.
    ///
    /// Returns null when the request is degenerate (`layout.size()` of
    /// zero, or an alignment stricter than the 8 bytes every payload
    /// gets) and when the provider refuses to grow. Never panics on out
    /// of memory.
    ///
    /// **SAFETY**: the returned memory is only valid while the allocator
    /// is alive, and must be released through
    /// [`deallocate`](Self::deallocate) of this same allocator.
    pub unsafe fn allocate(&mut self, layout: Layout) -> *mut u8 {
        match self.alloc_offset(layout.size(), layout.align()) {
            Some(payload) => self.heap.payload_ptr(payload),
            None => ptr::null_mut(),
        }
    }

    /// Releases the allocation at `ptr`. Null is a no-op.
    ///
    /// **SAFETY**: `ptr` must be null or an address returned by
    /// [`allocate`](Self::allocate)/[`reallocate`](Self::reallocate) of
    /// this allocator that has not been released since. The allocator
    /// does not detect double frees or foreign pointers; handing it one
    /// leaves the heap state inconsistent.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let payload = self.heap.offset_of(ptr);
        let size = self.heap.block_size(payload);

        self.coalesce(payload, size);
    }

    /// Resizes the allocation at `ptr` to `new_size` bytes.
    ///
    /// A null `ptr` behaves like a fresh allocation and a `new_size` of
    /// zero frees the block and returns null. Otherwise a new block is
    /// allocated, the old contents are copied up to the smaller of the
    /// two payload sizes, and the old block is freed. Returns null, with
    /// the old block untouched, when the new block cannot be obtained.
    ///
    /// **SAFETY**: same contract as [`deallocate`](Self::deallocate) for
    /// `ptr`.
    pub unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return match self.alloc_offset(new_size, ALIGNMENT) {
                Some(payload) => self.heap.payload_ptr(payload),
                None => ptr::null_mut(),
            };
        }

        if new_size == 0 {
            unsafe { self.deallocate(ptr) };
            return ptr::null_mut();
        }

        let Some(new_payload) = self.alloc_offset(new_size, ALIGNMENT) else {
            return ptr::null_mut();
        };
        let new_ptr = self.heap.payload_ptr(new_payload);

        let old_payload_size = self.heap.block_size(self.heap.offset_of(ptr)) - OVERHEAD;

        unsafe {
            // The new block is disjoint from the old one, which is still
            // allocated at this point.
            ptr::copy_nonoverlapping(ptr, new_ptr, old_payload_size.min(new_size));
            self.deallocate(ptr);
        }

        new_ptr
    }

    /// Iterator over every block in the heap in address order, sentinel
    /// included. Mostly a diagnostic: it is what a heap checker walks.
    pub fn blocks(&self) -> Blocks<'_, B> {
        Blocks {
            heap: &self.heap,
            cur: SENTINEL_PAYLOAD,
        }
    }

    /// Current length of the managed region in bytes.
    pub fn heap_size(&self) -> usize {
        self.heap.len()
    }

    fn alloc_offset(&mut self, size: usize, align: usize) -> Option<usize> {
        if size == 0 || align > ALIGNMENT {
            return None;
        }

        let block_size = block_size_for(size);

        match self.lists.find(&self.heap, block_size) {
            Some(fit) => Some(self.carve(fit, block_size)),
            None => {
                let payload = self.heap.grow(block_size)?;
                self.heap.set_tags(payload, block_size, true);
                Some(payload)
            }
        }
    }

    /// Takes `block_size` bytes out of the free block at `fit`. The tail
    /// is split off as a new free block when it still makes a legal one;
    /// otherwise the caller keeps the whole block, slack included.
    fn carve(&mut self, fit: usize, block_size: usize) -> usize {
        let found_size = self.heap.block_size(fit);
        let remainder = found_size - block_size;

        self.lists.remove(&mut self.heap, fit);

        if remainder >= MIN_BLOCK_SIZE {
            self.heap.set_tags(fit, block_size, true);

            let tail = fit + block_size;
            self.heap.set_tags(tail, remainder, false);
            self.lists.push(&mut self.heap, tail);
        } else {
            self.heap.set_tags(fit, found_size, true);
        }

        fit
    }

    /// Merges the newly freed block at `payload` with whichever of its
    /// neighbours are free, then threads the result into its class list.
    ///
    /// The block itself is on no list when this runs; only the absorbed
    /// neighbours need unlinking. The sentinel reads as allocated and
    /// the guard on `next` fails past the heap end, so neither direction
    /// ever merges out of bounds.
    fn coalesce(&mut self, payload: usize, size: usize) {
        let prev = self.heap.prev_block(payload);
        let next = self.heap.next_block(payload);

        let prev_free = self.heap.contains(prev) && !self.heap.is_allocated(prev);
        let next_free = self.heap.contains(next) && !self.heap.is_allocated(next);

        let mut start = payload;
        let mut total = size;

        if prev_free {
            total += self.heap.block_size(prev);
            self.lists.remove(&mut self.heap, prev);
            start = prev;
        }

        if next_free {
            total += self.heap.block_size(next);
            self.lists.remove(&mut self.heap, next);
        }

        self.heap.set_tags(start, total, false);
        self.lists.push(&mut self.heap, start);
    }
}

/// One block as seen by the heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Payload offset from the heap start.
    pub offset: usize,
    /// Total block size, tags included.
    pub size: usize,
    pub allocated: bool,
}

/// Address ordered walk over all blocks. See [`SegAlloc::blocks`].
pub struct Blocks<'a, B: Brk> {
    heap: &'a Heap<B>,
    cur: usize,
}

impl<B: Brk> Iterator for Blocks<'_, B> {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if !self.heap.contains(self.cur) {
            return None;
        }

        let span = Span {
            offset: self.cur,
            size: self.heap.block_size(self.cur),
            allocated: self.heap.is_allocated(self.cur),
        };

        if span.size == 0 {
            // A corrupted tag would pin the walk in place; stop instead.
            return None;
        }

        self.cur += span.size;
        Some(span)
    }
}
