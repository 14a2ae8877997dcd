//! Raw view over the managed heap bytes.
//!
//! [`Heap`] owns the provider and addresses everything inside the region
//! by byte offset from the heap start:
//!
//! ```text
//!  offset 0    4         20
//!    |         |          |
//!    v         v          v
//!    +---------+----------+---------+---------+-- - -
//!    |   pad   | sentinel | block 1 | block 2 |  ...
//!    +---------+----------+---------+---------+-- - -
//!    |<------ prologue -->|
//! ```
//!
//! The 4 byte pad shifts every block by one tag word, which is what puts
//! payload offsets on 8 byte boundaries. The sentinel is a permanently
//! allocated minimum size block whose footer keeps previous neighbour
//! reads of the first real block inside the heap.
//!
//! Tag words and free list links are read and written through unaligned
//! safe helpers; no structured type is ever overlaid on heap memory.

use std::ptr::{self, NonNull};

use crate::{
    brk::Brk,
    segalloc::InitError,
    tag::{
        self, footer_offset, header_offset, pack, ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD,
        PROLOGUE_SIZE, SENTINEL_PAYLOAD, WORD,
    },
    utils::is_aligned,
};

pub(crate) struct Heap<B: Brk> {
    brk: B,
    /// First byte of the region. Offset 0.
    lo: NonNull<u8>,
    /// Cached length of the grown region in bytes. Kept in sync with the
    /// provider on every successful grow.
    len: usize,
}

impl<B: Brk> Heap<B> {
    /// Takes ownership of the provider and grows the prologue: the
    /// alignment pad plus the sentinel block, tagged allocated.
    pub fn init(mut brk: B) -> Result<Self, InitError> {
        let lo = brk.sbrk(PROLOGUE_SIZE).ok_or(InitError)?;

        if !is_aligned(lo.as_ptr() as usize, ALIGNMENT) {
            return Err(InitError);
        }

        let mut heap = Self {
            brk,
            lo,
            len: PROLOGUE_SIZE,
        };

        heap.set_tags(SENTINEL_PAYLOAD, MIN_BLOCK_SIZE, true);
        debug_assert_eq!(heap.brk.heap_lo(), heap.lo.as_ptr());

        Ok(heap)
    }

    /// Length of the grown region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether `off` can be the payload offset of some block: at or past
    /// the sentinel and strictly inside the grown region. This is the
    /// guard every list traversal applies to links read from payloads.
    pub fn contains(&self, off: usize) -> bool {
        (SENTINEL_PAYLOAD..self.len).contains(&off)
    }

    /// Address of the payload at `off`.
    pub fn payload_ptr(&self, off: usize) -> *mut u8 {
        unsafe { self.lo.as_ptr().add(off) }
    }

    /// Payload offset of the address `ptr`.
    ///
    /// **SAFETY**: `ptr` must be a payload address previously produced by
    /// [`payload_ptr`](Self::payload_ptr); anything else yields a
    /// nonsense offset.
    pub fn offset_of(&self, ptr: *mut u8) -> usize {
        ptr as usize - self.lo.as_ptr() as usize
    }

    pub(crate) fn read_word(&self, off: usize) -> u32 {
        debug_assert!(off + WORD <= self.len);
        unsafe { ptr::read_unaligned(self.lo.as_ptr().add(off) as *const u32) }
    }

    fn write_word(&mut self, off: usize, word: u32) {
        debug_assert!(off + WORD <= self.len);
        unsafe { ptr::write_unaligned(self.lo.as_ptr().add(off) as *mut u32, word) }
    }

    /// Writes matching header and footer tags for the block at `payload`.
    pub fn set_tags(&mut self, payload: usize, size: usize, allocated: bool) {
        let word = pack(size, allocated);
        self.write_word(header_offset(payload), word);
        self.write_word(footer_offset(payload, size), word);
    }

    /// Total size of the block at `payload`, read from its header.
    pub fn block_size(&self, payload: usize) -> usize {
        tag::unpack_size(self.read_word(header_offset(payload)))
    }

    /// Allocated flag of the block at `payload`, read from its header.
    pub fn is_allocated(&self, payload: usize) -> bool {
        tag::unpack_allocated(self.read_word(header_offset(payload)))
    }

    /// Payload offset of the block after the one at `payload`. Only
    /// meaningful while [`contains`](Self::contains) says so.
    pub fn next_block(&self, payload: usize) -> usize {
        payload + self.block_size(payload)
    }

    /// Payload offset of the block before the one at `payload`, read
    /// from that block's footer. Wraps rather than panics on a garbage
    /// footer; callers must apply [`contains`](Self::contains) before
    /// trusting the result.
    pub fn prev_block(&self, payload: usize) -> usize {
        let prev_size = tag::unpack_size(self.read_word(payload - OVERHEAD));
        payload.wrapping_sub(prev_size)
    }

    /// Free list link stored in the first word of the payload at `off`.
    /// Zero encodes the end of a list; no payload ever sits at offset 0.
    pub fn next_free(&self, off: usize) -> Option<usize> {
        let raw = unsafe { ptr::read_unaligned(self.lo.as_ptr().add(off) as *const u64) };

        match raw {
            0 => None,
            link => Some(link as usize),
        }
    }

    /// Stores a free list link in the first word of the payload at `off`.
    pub fn set_next_free(&mut self, off: usize, link: Option<usize>) {
        let raw = link.unwrap_or(0) as u64;
        unsafe { ptr::write_unaligned(self.lo.as_ptr().add(off) as *mut u64, raw) }
    }

    /// Grows the heap by `n` bytes and shapes the new space into one free
    /// block tiling exactly against the old heap end. Returns the new
    /// block's payload offset, or None when the provider refuses.
    ///
    /// The caller decides what happens next: tag it allocated right away
    /// or thread it into a free list.
    pub fn grow(&mut self, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }

        let old_end = self.brk.sbrk(n)?;
        debug_assert_eq!(old_end.as_ptr() as usize, self.lo.as_ptr() as usize + self.len);

        // Header at the old end, payload one word after.
        let payload = self.len + WORD;
        self.len += n;
        self.set_tags(payload, n, false);

        debug_assert_eq!(
            self.brk.heap_hi() as usize,
            self.lo.as_ptr() as usize + self.len - 1
        );

        Some(payload)
    }
}
