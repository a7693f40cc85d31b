use core::{
    alloc::{GlobalAlloc, Layout},
    ptr,
};

use spin::Mutex;

use crate::{
    block::ALIGNMENT,
    heap::{AllocIntent, Heap},
};

/// The allocator handle.
///
/// Wraps the single-threaded [`Heap`] core in a lock so one instance can
/// back a `static`, the C entry points and `#[global_allocator]` at the
/// same time. The lock never allocates, which keeps the wrapper usable
/// from inside the very allocation paths it protects.
///
/// ```rust,ignore
/// use osalloc::OsAlloc;
///
/// #[global_allocator]
/// static ALLOCATOR: OsAlloc = OsAlloc::new();
/// ```
pub struct OsAlloc {
    inner: Mutex<Heap>,
}

impl OsAlloc {
    /// Creates an allocator with an empty registry. Nothing is requested
    /// from the kernel until the first allocation.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Heap::new()),
        }
    }

    /// Allocates `size` bytes aligned to 8. Null when `size` is zero.
    ///
    /// # Safety
    ///
    /// The returned pointer is only valid until it is passed to
    /// [`OsAlloc::free`] or [`OsAlloc::realloc`], and must only be
    /// released through this allocator.
    pub unsafe fn malloc(&self, size: usize) -> *mut u8 {
        unsafe { self.inner.lock().malloc(size, AllocIntent::Normal) }
    }

    /// Releases an allocation. Null pointers and double frees are
    /// silently ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this
    /// allocator.
    pub unsafe fn free(&self, ptr: *mut u8) {
        unsafe { self.inner.lock().free(ptr) }
    }

    /// Allocates room for `count` elements of `elem_size` bytes and
    /// zeroes the whole payload. Null when either factor is zero or the
    /// product overflows.
    ///
    /// # Safety
    ///
    /// Same contract as [`OsAlloc::malloc`].
    pub unsafe fn calloc(&self, count: usize, elem_size: usize) -> *mut u8 {
        unsafe { self.inner.lock().calloc(count, elem_size) }
    }

    /// Resizes an allocation, preserving its contents up to the smaller
    /// of both payload sizes. Behaves like [`OsAlloc::malloc`] on a null
    /// pointer and like [`OsAlloc::free`] on a zero size.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this
    /// allocator that has not been released since.
    pub unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        unsafe { self.inner.lock().realloc(ptr, size) }
    }
}

impl Default for OsAlloc {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks are always 8-aligned and never more; stricter layouts are
/// reported as allocation failure.
unsafe impl GlobalAlloc for OsAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        unsafe { self.malloc(layout.size()) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.free(ptr) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        unsafe { self.calloc(1, layout.size()) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        unsafe { OsAlloc::realloc(self, ptr, new_size) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn basic_allocation_and_write() {
        let _guard = test_util::serialize();
        let allocator = OsAlloc::new();

        unsafe {
            let block1 = allocator.malloc(4) as *mut u32;

            *block1 = 12415;
            assert_eq!(*block1, 12415);

            let block2 = allocator.malloc(4) as *mut u32;

            *block2 = 36353;
            assert_eq!(*block2, 36353);

            // Check block1 has not been overwritten
            assert_eq!(*block1, 12415);
        }
    }

    #[test]
    fn alloc_dealloc_reuse() {
        let _guard = test_util::serialize();
        let allocator = OsAlloc::new();

        unsafe {
            // Consume the prealloc slab so later requests go through the
            // reuse pipeline.
            let slab = allocator.malloc(8);
            allocator.free(slab);

            let block1 = allocator.malloc(8);
            assert!(!block1.is_null());

            allocator.free(block1);

            let block2 = allocator.malloc(8);
            assert_eq!(block1, block2);

            let block3 = allocator.malloc(8);

            // We should get a different block since block2 is still live.
            assert_ne!(block3, block2);
        }
    }

    #[test]
    fn global_alloc_rejects_oversized_alignment() {
        let _guard = test_util::serialize();
        let allocator = OsAlloc::new();

        unsafe {
            let layout = Layout::from_size_align(64, 16).unwrap();
            assert!(GlobalAlloc::alloc(&allocator, layout).is_null());

            let layout = Layout::from_size_align(64, 8).unwrap();
            let ptr = GlobalAlloc::alloc(&allocator, layout);
            assert!(!ptr.is_null());
            GlobalAlloc::dealloc(&allocator, ptr, layout);
        }
    }

    #[test]
    fn global_alloc_zeroed_is_zero() {
        let _guard = test_util::serialize();
        let allocator = OsAlloc::new();

        unsafe {
            let layout = Layout::from_size_align(32, 8).unwrap();
            let ptr = GlobalAlloc::alloc_zeroed(&allocator, layout);
            for i in 0..32 {
                assert_eq!(ptr.add(i).read(), 0);
            }
        }
    }
}
