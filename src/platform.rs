//! Raw memory region reservation.
//!
//! [`crate::brk::FixedBrk`] needs one big region of address space to
//! emulate a program break inside of. How such a region is obtained has
//! nothing to do with the allocator itself and everything to do with the
//! operating system, so the concrete syscalls live here:
//!
//! [`mmap`](https://man7.org/linux/man-pages/man2/mmap.2.html) on Unix
//! [`VirtualAlloc`](https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-virtualalloc)
//! on Windows.

use std::ptr::NonNull;

/// Abstraction over the low level memory syscalls of each platform.
trait PlatformMemory {
    /// Reserve a readable and writable region of `len` bytes. Returns a
    /// pointer to it, or None if the underlying syscall fails.
    unsafe fn reserve(len: usize) -> Option<NonNull<u8>>;

    /// Returns the region of `len` bytes starting at `addr` back to the
    /// operating system.
    unsafe fn release(addr: *mut u8, len: usize);

    /// Virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// The operating system we were compiled for.
struct Os;

/// Wrapper to use [`PlatformMemory::reserve`].
#[inline]
pub(crate) unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
    unsafe { Os::reserve(len) }
}

/// Wrapper to use [`PlatformMemory::release`].
#[inline]
pub(crate) unsafe fn release(addr: *mut u8, len: usize) {
    unsafe { Os::release(addr, len) }
}

/// Wrapper to use [`PlatformMemory::page_size`].
#[inline]
pub(crate) fn page_size() -> usize {
    unsafe { Os::page_size() }
}

#[cfg(unix)]
mod unix {
    use super::{Os, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Os {
        unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => Some(NonNull::new_unchecked(addr).cast::<u8>()),
                }
            }
        }

        unsafe fn release(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{Os, PlatformMemory};

    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Os {
        unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn release(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
