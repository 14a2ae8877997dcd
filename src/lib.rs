//! segalloc is a segregated-fits implementation of a memory allocator.
//! It manages one contiguous heap that only ever grows, requesting the
//! space from an sbrk style provider (see [`Brk`]).
//!
//! The internal structure of the heap looks like this:
//!
//! ```text
//!              class lists (one LIFO list per size class)
//!
//!                  next free                   next free
//!             +----------------+  +--------------------------------+
//!             |                |  |                                |
//! +-----------|----------------|--|--------------------------------|-------+
//! |          +|---+    +-----+ +--|-+    +-----+    +-----+    +---|+      |
//! | sentinel |free|    |block| |free|    |block|    |block|    |free|      |
//! |          +----+    +-----+ +----+    +-----+    +-----+    +----+      |
//! +------------------------------------------------------------------------+
//!  ^
//!  +--> heap start, grows to the right via the provider's sbrk
//! ```
//!
//! Every block is boundary tagged: a 4 byte header and footer on either
//! side of the payload record the block size and whether it is in use,
//! which makes both neighbours reachable in O(1) and lets a freed block
//! merge with any free neighbour immediately. Free blocks additionally
//! lend the first word of their payload to the class list they sit on,
//! so the bookkeeping costs no memory of its own.
//!
//! Allocation is first fit across the segregated table: start at the
//! class the rounded size maps to, take the first block big enough,
//! split off the tail when it still makes a legal block, and fall back
//! to growing the heap when the whole table has nothing to offer.
//!
//! The main structure is [`SegAlloc`], you can follow the codebase from
//! there.

mod brk;
mod heap;
mod platform;
mod segalloc;
mod seglist;
mod tag;
mod utils;

pub use brk::{Brk, FixedBrk};
pub use segalloc::{Blocks, InitError, SegAlloc, Span};

#[cfg(unix)]
pub use brk::SystemBrk;
