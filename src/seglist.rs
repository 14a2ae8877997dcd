//! The segregated fits table.
//!
//! One LIFO singly linked list of free blocks per size class, threaded
//! through the payloads of the blocks themselves:
//!
//! ```text
//! heads
//! -------------------------------------------------------------------
//! | class 0 (size < 64)    ---> free block ---> free block ---> end
//! -------------------------------------------------------------------
//! | ...
//! -------------------------------------------------------------------
//! | class 7 (size >= 448)  ---> end
//! -------------------------------------------------------------------
//! ```
//!
//! A free block's payload is not used by anyone, so its first word is
//! borrowed to store the offset of the next free block in the same
//! class (see [`crate::heap::Heap::next_free`]). Nothing extra is ever
//! allocated to keep the lists.
//!
//! The class mapping is a coarse 64 byte banding on purpose: the search
//! keeps probing higher classes when the mapped one has no fit, so a
//! misclassified block costs throughput, never correctness.

use crate::{brk::Brk, heap::Heap};

/// Number of size classes.
pub(crate) const CLASS_COUNT: usize = 8;

/// Width in bytes of one size class band.
const CLASS_BAND: usize = 64;

/// Maps a block size to its class index.
pub(crate) fn class_of(size: usize) -> usize {
    (size / CLASS_BAND).min(CLASS_COUNT - 1)
}

/// Walks one class list, stopping at the end marker or at the first
/// link that points outside the heap. The bounds test is what keeps a
/// stale or corrupted link from taking the walk on a tour through
/// arbitrary memory.
pub(crate) struct FreeCursor {
    cur: Option<usize>,
}

impl FreeCursor {
    pub fn new(head: Option<usize>) -> Self {
        Self { cur: head }
    }

    pub fn next<B: Brk>(&mut self, heap: &Heap<B>) -> Option<usize> {
        let cur = self.cur.filter(|&off| heap.contains(off))?;
        self.cur = heap.next_free(cur);
        Some(cur)
    }
}

/// The table itself: just the eight heads. Each head is either empty or
/// the payload offset of the first free block of its class.
pub(crate) struct SegList {
    heads: [Option<usize>; CLASS_COUNT],
}

impl SegList {
    pub fn new() -> Self {
        Self {
            heads: [None; CLASS_COUNT],
        }
    }

    /// Pushes the free block at `payload` onto its class list. LIFO.
    ///
    /// Tolerates being handed the current head again: the link is left
    /// empty in that case instead of pointing the block at itself.
    pub fn push<B: Brk>(&mut self, heap: &mut Heap<B>, payload: usize) {
        let class = class_of(heap.block_size(payload));

        let next = match self.heads[class] {
            Some(head) if head != payload => Some(head),
            _ => None,
        };

        heap.set_next_free(payload, next);
        self.heads[class] = Some(payload);
    }

    /// Unlinks the block at `payload` from its class list, stitching its
    /// predecessor (or the head) to its successor. A block that is not
    /// on the list, or an empty list, makes this a no-op.
    pub fn remove<B: Brk>(&mut self, heap: &mut Heap<B>, payload: usize) {
        let class = class_of(heap.block_size(payload));

        let mut prev: Option<usize> = None;
        let mut cursor = FreeCursor::new(self.heads[class]);

        while let Some(cur) = cursor.next(heap) {
            if cur == payload {
                let next = heap.next_free(cur).filter(|&off| heap.contains(off));

                match prev {
                    Some(prev) => heap.set_next_free(prev, next),
                    None => self.heads[class] = next,
                }

                heap.set_next_free(payload, None);
                return;
            }

            prev = Some(cur);
        }
    }

    /// First fit: the first free block of at least `size` bytes, probing
    /// the mapped class first and then every larger one. None when the
    /// whole table has nothing big enough.
    pub fn find<B: Brk>(&self, heap: &Heap<B>, size: usize) -> Option<usize> {
        for class in class_of(size)..CLASS_COUNT {
            let mut cursor = FreeCursor::new(self.heads[class]);

            while let Some(cur) = cursor.next(heap) {
                if !heap.is_allocated(cur) && heap.block_size(cur) >= size {
                    return Some(cur);
                }
            }
        }

        None
    }
}

#[cfg(test)]
impl SegList {
    /// Payload offsets on one class list, in list order.
    pub(crate) fn class_items<B: Brk>(&self, heap: &Heap<B>, class: usize) -> Vec<usize> {
        let mut items = Vec::new();
        let mut cursor = FreeCursor::new(self.heads[class]);

        while let Some(off) = cursor.next(heap) {
            items.push(off);
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brk::FixedBrk;

    #[test]
    fn class_mapping() {
        assert_eq!(0, class_of(16));
        assert_eq!(0, class_of(63));
        assert_eq!(1, class_of(64));
        assert_eq!(3, class_of(224));
        assert_eq!(7, class_of(448));
        assert_eq!(7, class_of(1 << 20));
    }

    /// A heap with one free block of each given size, in address order.
    fn heap_with_blocks(sizes: &[usize]) -> (Heap<FixedBrk>, Vec<usize>) {
        let mut heap = Heap::init(FixedBrk::with_capacity(1 << 16).unwrap()).unwrap();
        let blocks = sizes.iter().map(|&s| heap.grow(s).unwrap()).collect();

        (heap, blocks)
    }

    #[test]
    fn push_is_lifo() {
        let (mut heap, blocks) = heap_with_blocks(&[32, 40, 48]);
        let mut lists = SegList::new();

        for &block in &blocks {
            lists.push(&mut heap, block);
        }

        assert_eq!(
            vec![blocks[2], blocks[1], blocks[0]],
            lists.class_items(&heap, 0),
        );
    }

    #[test]
    fn push_of_the_head_does_not_self_loop() {
        let (mut heap, blocks) = heap_with_blocks(&[32]);
        let mut lists = SegList::new();

        lists.push(&mut heap, blocks[0]);
        lists.push(&mut heap, blocks[0]);

        assert_eq!(vec![blocks[0]], lists.class_items(&heap, 0));
    }

    #[test]
    fn remove_head_middle_and_tail() {
        let (mut heap, blocks) = heap_with_blocks(&[32, 32, 32, 32]);
        let mut lists = SegList::new();

        for &block in &blocks {
            lists.push(&mut heap, block);
        }

        // List order is reversed address order: b3, b2, b1, b0.
        lists.remove(&mut heap, blocks[2]);
        assert_eq!(
            vec![blocks[3], blocks[1], blocks[0]],
            lists.class_items(&heap, 0),
        );

        lists.remove(&mut heap, blocks[3]);
        assert_eq!(vec![blocks[1], blocks[0]], lists.class_items(&heap, 0));

        lists.remove(&mut heap, blocks[0]);
        assert_eq!(vec![blocks[1]], lists.class_items(&heap, 0));

        lists.remove(&mut heap, blocks[1]);
        assert!(lists.class_items(&heap, 0).is_empty());
    }

    #[test]
    fn remove_from_empty_list_is_a_noop() {
        let (mut heap, blocks) = heap_with_blocks(&[32]);
        let mut lists = SegList::new();

        lists.remove(&mut heap, blocks[0]);
        assert!(lists.class_items(&heap, 0).is_empty());
    }

    #[test]
    fn removed_block_link_is_cleared() {
        let (mut heap, blocks) = heap_with_blocks(&[32, 32]);
        let mut lists = SegList::new();

        lists.push(&mut heap, blocks[1]);
        lists.push(&mut heap, blocks[0]);

        // blocks[0] heads the list and points at blocks[1].
        assert_eq!(Some(blocks[1]), heap.next_free(blocks[0]));

        lists.remove(&mut heap, blocks[0]);
        assert_eq!(None, heap.next_free(blocks[0]));
    }

    #[test]
    fn find_prefers_the_mapped_class() {
        // One small block in class 0 and one large in class 2.
        let (mut heap, blocks) = heap_with_blocks(&[32, 160]);
        let mut lists = SegList::new();

        lists.push(&mut heap, blocks[0]);
        lists.push(&mut heap, blocks[1]);

        assert_eq!(Some(blocks[0]), lists.find(&heap, 24));
        assert_eq!(Some(blocks[1]), lists.find(&heap, 130));
    }

    #[test]
    fn find_advances_to_larger_classes() {
        // Class 0 holds only a block too small for the request; the fit
        // lives two classes up.
        let (mut heap, blocks) = heap_with_blocks(&[16, 144]);
        let mut lists = SegList::new();

        lists.push(&mut heap, blocks[0]);
        lists.push(&mut heap, blocks[1]);

        assert_eq!(Some(blocks[1]), lists.find(&heap, 40));
    }

    #[test]
    fn find_reports_exhaustion() {
        let (mut heap, blocks) = heap_with_blocks(&[32]);
        let mut lists = SegList::new();

        lists.push(&mut heap, blocks[0]);
        assert_eq!(None, lists.find(&heap, 64));
    }

    #[test]
    fn traversal_stops_at_a_link_outside_the_heap() {
        let (mut heap, blocks) = heap_with_blocks(&[32, 32]);
        let mut lists = SegList::new();

        lists.push(&mut heap, blocks[1]);
        lists.push(&mut heap, blocks[0]);

        // Corrupt the head's link so it points far outside the heap.
        heap.set_next_free(blocks[0], Some(1 << 40));

        assert_eq!(vec![blocks[0]], lists.class_items(&heap, 0));
        assert_eq!(None, lists.find(&heap, 64));
    }
}
