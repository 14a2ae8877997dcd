//! Heap providers.
//!
//! The allocator manages one contiguous region that only ever grows, the
//! way a classic `malloc` sits on top of [`sbrk`](https://man7.org/linux/man-pages/man2/sbrk.2.html).
//! The [`Brk`] trait captures exactly that contract, and two providers
//! implement it:
//!
//! - [`SystemBrk`] drives the real program break (Unix only).
//! - [`FixedBrk`] emulates a break inside a region reserved up front
//!   through [`crate::platform`], refusing to grow past its capacity.
//!   This is what the tests run against, and what you want whenever the
//!   process global break can't be claimed for the allocator alone.

use std::ptr::NonNull;

use crate::utils::align_up;

#[cfg(unix)]
use crate::tag::ALIGNMENT;

#[cfg(unix)]
use libc::{intptr_t, sbrk};

/// An sbrk style heap provider.
///
/// Implementations hand out one contiguous, monotonically growing byte
/// region. Two guarantees are required of every implementation:
///
/// - [`heap_lo`](Brk::heap_lo) is aligned to 8 bytes and never changes.
/// - [`sbrk`](Brk::sbrk) extends the region in place: the address it
///   returns is always `heap_lo +` the sum of all sizes granted before.
///
/// The region is never shrunk and never relocated, so addresses inside
/// it stay valid for as long as the provider is alive.
pub trait Brk {
    /// Grows the heap by `n` bytes. Returns the old heap end, which is
    /// the first byte of the freshly granted space, or None if no more
    /// memory can be obtained.
    fn sbrk(&mut self, n: usize) -> Option<NonNull<u8>>;

    /// First valid byte of the heap.
    fn heap_lo(&self) -> *mut u8;

    /// Last valid byte of the heap. Meaningless until the first
    /// successful [`sbrk`](Brk::sbrk).
    fn heap_hi(&self) -> *mut u8;
}

/// A soft program break inside a region reserved up front.
///
/// ```text
///   base                    brk                      capacity
///    |                       |                           |
///    v                       v                           v
///    +-----------------------+---------------------------+
///    |     granted space     |     reserved, unused      |
///    +-----------------------+---------------------------+
/// ```
///
/// `sbrk` just moves `brk` forward; once it would pass `capacity` the
/// provider reports out of memory. The whole region goes back to the
/// operating system when the provider is dropped.
pub struct FixedBrk {
    base: NonNull<u8>,
    capacity: usize,
    brk: usize,
}

impl FixedBrk {
    /// Reserves room for at least `capacity` bytes, rounded up to the
    /// page size. Returns None if the reservation syscall fails.
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        let capacity = align_up(capacity.max(1), crate::platform::page_size());
        let base = unsafe { crate::platform::reserve(capacity)? };

        Some(Self {
            base,
            capacity,
            brk: 0,
        })
    }

    /// Bytes granted so far.
    pub fn len(&self) -> usize {
        self.brk
    }

    /// Whether nothing has been granted yet.
    pub fn is_empty(&self) -> bool {
        self.brk == 0
    }

    /// Total bytes this provider can ever grant.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Brk for FixedBrk {
    fn sbrk(&mut self, n: usize) -> Option<NonNull<u8>> {
        if n > self.capacity - self.brk {
            return None;
        }

        let old = self.brk;
        self.brk += n;

        unsafe { Some(NonNull::new_unchecked(self.base.as_ptr().add(old))) }
    }

    fn heap_lo(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    fn heap_hi(&self) -> *mut u8 {
        self.base.as_ptr().wrapping_add(self.brk).wrapping_sub(1)
    }
}

impl Drop for FixedBrk {
    fn drop(&mut self) {
        unsafe { crate::platform::release(self.base.as_ptr(), self.capacity) }
    }
}

/// The real program break.
///
/// Construction records the current break as `heap_lo`, padding it first
/// so the region starts 8 byte aligned.
#[cfg(unix)]
pub struct SystemBrk {
    lo: NonNull<u8>,
}

#[cfg(unix)]
impl SystemBrk {
    /// Claims the program break from the current position onwards.
    ///
    /// **SAFETY**: from this point on no other code in the process may
    /// move the break (no `brk`/`sbrk` calls, which also rules out any
    /// other sbrk based allocator being live at the same time).
    pub unsafe fn new() -> Option<Self> {
        unsafe {
            let cur = sbrk(0);
            if cur == usize::MAX as *mut libc::c_void {
                return None;
            }

            // The break is not guaranteed to sit on an 8 byte boundary.
            let pad = align_up(cur as usize, ALIGNMENT) - cur as usize;
            if pad > 0 && sbrk(pad as intptr_t) == usize::MAX as *mut libc::c_void {
                return None;
            }

            Some(Self {
                lo: NonNull::new_unchecked((cur as *mut u8).add(pad)),
            })
        }
    }
}

#[cfg(unix)]
impl Brk for SystemBrk {
    fn sbrk(&mut self, n: usize) -> Option<NonNull<u8>> {
        unsafe {
            let old = sbrk(n as intptr_t);

            if old == usize::MAX as *mut libc::c_void {
                // sbrk returns (void*)-1 on failure.
                None
            } else {
                Some(NonNull::new_unchecked(old as *mut u8))
            }
        }
    }

    fn heap_lo(&self) -> *mut u8 {
        self.lo.as_ptr()
    }

    fn heap_hi(&self) -> *mut u8 {
        unsafe { (sbrk(0) as *mut u8).wrapping_sub(1) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::ALIGNMENT;

    #[test]
    fn fixed_brk_grants_contiguous_space() {
        let mut brk = FixedBrk::with_capacity(4096).unwrap();
        assert!(brk.is_empty());

        let first = brk.sbrk(24).unwrap();
        let second = brk.sbrk(40).unwrap();

        assert_eq!(first.as_ptr(), brk.heap_lo());
        assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 24);
        assert_eq!(64, brk.len());
        assert_eq!(brk.heap_hi() as usize, brk.heap_lo() as usize + 63);
    }

    #[test]
    fn fixed_brk_base_is_aligned() {
        let brk = FixedBrk::with_capacity(1).unwrap();
        assert_eq!(0, brk.heap_lo() as usize % ALIGNMENT);
    }

    #[test]
    fn fixed_brk_refuses_past_capacity() {
        let mut brk = FixedBrk::with_capacity(1).unwrap();
        let capacity = brk.capacity();

        assert!(brk.sbrk(capacity).is_some());
        assert!(brk.sbrk(1).is_none());

        // A failed grow must not move the break.
        assert_eq!(capacity, brk.len());
    }

    #[test]
    fn fixed_brk_space_is_writable() {
        let mut brk = FixedBrk::with_capacity(128).unwrap();
        let addr = brk.sbrk(128).unwrap();

        unsafe {
            for i in 0..128 {
                addr.as_ptr().add(i).write(i as u8);
            }
            for i in 0..128 {
                assert_eq!(i as u8, addr.as_ptr().add(i).read());
            }
        }
    }
}
