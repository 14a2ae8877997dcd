//! Boundary tag layout and arithmetic.
//!
//! Every block, free or allocated, carries the same shape:
//!
//! ```text
//! +------------+------------------------+------------+
//! |   header   |        payload         |   footer   |
//! |  (4 bytes) |       (>= 8 bytes)     |  (4 bytes) |
//! +------------+------------------------+------------+
//!              ^
//!              +--> the address handed to the user (8 byte aligned)
//! ```
//!
//! Header and footer are the same 4 byte word packing the total block
//! size together with the allocated flag. Sizes are always multiples of
//! 8, so the low three bits are free to carry the flag. Having the size
//! at both ends is what makes neighbour lookup O(1): the next block
//! starts `size` bytes after this payload, and the previous block's size
//! can be read from the word right before this header.
//!
//! Blocks are referred to by the byte offset of their payload from the
//! start of the heap. Offsets rather than raw addresses also live inside
//! free payloads (see [`crate::seglist`]), which keeps the heap image
//! position independent.

use crate::utils::align_up;

/// Size in bytes of one boundary tag word.
pub(crate) const WORD: usize = 4;

/// Combined header plus footer overhead of a block.
pub(crate) const OVERHEAD: usize = 2 * WORD;

/// Payload addresses are aligned to this many bytes.
pub(crate) const ALIGNMENT: usize = 8;

/// Smallest legal block: header, enough payload to thread a free list
/// link through, and footer.
pub(crate) const MIN_BLOCK_SIZE: usize = 16;

/// Bytes of alignment padding at the very start of the heap. Shifting
/// everything by one word is what makes payload offsets come out as
/// multiples of [`ALIGNMENT`].
pub(crate) const PAD: usize = WORD;

/// Payload offset of the sentinel block.
///
/// The sentinel is a permanently allocated [`MIN_BLOCK_SIZE`] block
/// sitting at the heap start. Its footer is what the first real block
/// reads when it looks for its previous neighbour, so that lookup never
/// touches memory outside the heap.
pub(crate) const SENTINEL_PAYLOAD: usize = PAD + WORD;

/// Heap bytes consumed by the padding plus the sentinel block.
pub(crate) const PROLOGUE_SIZE: usize = PAD + MIN_BLOCK_SIZE;

/// Packs a block size and its allocated flag into one tag word.
pub(crate) fn pack(size: usize, allocated: bool) -> u32 {
    debug_assert!(size % ALIGNMENT == 0);
    size as u32 | allocated as u32
}

/// Total block size recorded in a tag word.
pub(crate) fn unpack_size(word: u32) -> usize {
    (word & !0x7) as usize
}

/// Allocated flag recorded in a tag word.
pub(crate) fn unpack_allocated(word: u32) -> bool {
    word & 0x1 != 0
}

/// Offset of the header word of the block whose payload sits at `payload`.
pub(crate) const fn header_offset(payload: usize) -> usize {
    payload - WORD
}

/// Offset of the footer word of a `size` byte block with payload at `payload`.
pub(crate) const fn footer_offset(payload: usize, size: usize) -> usize {
    payload + size - OVERHEAD
}

/// Block size that serves a `request` byte allocation: tag overhead added,
/// rounded up to [`ALIGNMENT`], floored at [`MIN_BLOCK_SIZE`].
pub(crate) fn block_size_for(request: usize) -> usize {
    align_up(request + OVERHEAD, ALIGNMENT).max(MIN_BLOCK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trips() {
        for size in [16usize, 24, 112, 4096] {
            for allocated in [false, true] {
                let word = pack(size, allocated);
                assert_eq!(size, unpack_size(word));
                assert_eq!(allocated, unpack_allocated(word));
            }
        }
    }

    #[test]
    fn block_size_floor_is_sixteen() {
        assert_eq!(16, block_size_for(1));
        assert_eq!(16, block_size_for(8));
        assert_eq!(24, block_size_for(9));
        assert_eq!(32, block_size_for(24));
        assert_eq!(112, block_size_for(100));
    }

    #[test]
    fn geometry() {
        // A 24 byte block with payload at offset 24 spans [20, 44).
        assert_eq!(20, header_offset(24));
        assert_eq!(40, footer_offset(24, 24));

        // The prologue tiles: pad, then the sentinel's 16 bytes.
        assert_eq!(8, SENTINEL_PAYLOAD);
        assert_eq!(20, PROLOGUE_SIZE);
        assert_eq!(PAD, header_offset(SENTINEL_PAYLOAD));
        assert_eq!(PROLOGUE_SIZE, footer_offset(SENTINEL_PAYLOAD, MIN_BLOCK_SIZE) + WORD);
    }
}
