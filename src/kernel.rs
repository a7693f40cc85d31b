use core::{ptr::NonNull, sync::atomic::{AtomicUsize, Ordering}};

/// Virtual memory page size of the computer, usually 4096. Queried from
/// the kernel on first use; we can't make it a constant since the value
/// is unknown at compile time.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// This trait provides an abstraction over the two memory sources and
/// the page-size query. The allocator policy above has nothing to do
/// with the concrete syscalls, so they live behind this seam.
trait PlatformMemory {
    /// Extends the program break by `len` bytes and returns the start of
    /// the new region (the old break), or `None` if the kernel refuses.
    unsafe fn extend_break(len: usize) -> Option<NonNull<u8>>;

    /// Requests a private anonymous read/write mapping of `len` bytes.
    unsafe fn request_mapping(len: usize) -> Option<NonNull<u8>>;

    /// Returns the mapping of `len` bytes starting at `addr` back to the
    /// kernel. `false` if the kernel rejected the range.
    unsafe fn release_mapping(addr: *mut u8, len: usize) -> bool;

    /// Virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

pub(crate) struct Kernel;

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{c_int, c_void, intptr_t, off_t, size_t};

    use core::ptr::NonNull;

    impl PlatformMemory for Kernel {
        unsafe fn extend_break(len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let addr = libc::sbrk(len as intptr_t);

                // sbrk reports failure with (void *)-1.
                if addr == usize::MAX as *mut c_void {
                    None
                } else {
                    NonNull::new(addr.cast::<u8>())
                }
            }
        }

        unsafe fn request_mapping(len: usize) -> Option<NonNull<u8>> {
            const ADDR: *mut c_void = core::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = libc::mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                if addr == libc::MAP_FAILED {
                    None
                } else {
                    Some(NonNull::new_unchecked(addr).cast::<u8>())
                }
            }
        }

        unsafe fn release_mapping(addr: *mut u8, len: usize) -> bool {
            unsafe { libc::munmap(addr as *mut c_void, len as size_t) == 0 }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

/// Emits `msg` on standard error and terminates the process.
///
/// Exhaustion of either memory source is not recoverable in this design,
/// and the allocator cannot reach for any formatting machinery that might
/// itself allocate, hence the raw write.
fn die(msg: &str) -> ! {
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::abort()
    }
}

/// Wrapper over [`PlatformMemory::page_size`] caching the answer.
#[inline]
pub(crate) fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }

    let queried = unsafe { Kernel::page_size() };
    PAGE_SIZE.store(queried, Ordering::Relaxed);
    queried
}

/// Extends the program break by `len` bytes. Fatal on failure.
#[inline]
pub(crate) unsafe fn brk_extend(len: usize) -> NonNull<u8> {
    match unsafe { Kernel::extend_break(len) } {
        Some(addr) => addr,
        None => die("osalloc: sbrk failed\n"),
    }
}

/// Maps `len` bytes of fresh anonymous memory. Fatal on failure.
#[inline]
pub(crate) unsafe fn map_region(len: usize) -> NonNull<u8> {
    match unsafe { Kernel::request_mapping(len) } {
        Some(addr) => addr,
        None => die("osalloc: mmap failed\n"),
    }
}

/// Releases the mapping of `len` bytes at `addr`. Fatal on failure.
#[inline]
pub(crate) unsafe fn unmap_region(addr: *mut u8, len: usize) {
    if !unsafe { Kernel::release_mapping(addr, len) } {
        die("osalloc: munmap failed\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane_and_cached() {
        let first = page_size();
        assert!(first.is_power_of_two());
        assert!(first >= 4096);
        assert_eq!(first, page_size());
    }

    #[test]
    fn mapping_round_trip() {
        unsafe {
            let len = page_size();
            let addr = map_region(len);

            // The kernel hands out zeroed, writable pages.
            assert_eq!(*addr.as_ptr(), 0);
            addr.as_ptr().write(0xA5);
            assert_eq!(*addr.as_ptr(), 0xA5);

            unmap_region(addr.as_ptr(), len);
        }
    }
}
