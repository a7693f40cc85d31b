//! C ABI entry points.
//!
//! The crate builds as a `cdylib` exporting the classic allocation
//! quartet under `os_`-prefixed names, all backed by one process-wide
//! allocator instance. The symbols follow the C contracts: null returns
//! on zero sizes, null-tolerant free, content-preserving realloc.

use libc::c_void;

use crate::OsAlloc;

/// The process-wide allocator behind the C entry points.
static ALLOCATOR: OsAlloc = OsAlloc::new();

/// Allocates `size` bytes, 8-aligned. Null when `size` is zero.
///
/// # Safety
///
/// The returned pointer must only be released through [`os_free`] or
/// [`os_realloc`].
#[no_mangle]
pub unsafe extern "C" fn os_malloc(size: usize) -> *mut c_void {
    unsafe { ALLOCATOR.malloc(size).cast() }
}

/// Releases an allocation. Null pointers and repeated frees are ignored.
///
/// # Safety
///
/// `ptr` must be null or a pointer previously returned by one of the
/// `os_` entry points.
#[no_mangle]
pub unsafe extern "C" fn os_free(ptr: *mut c_void) {
    unsafe { ALLOCATOR.free(ptr.cast()) }
}

/// Allocates a zeroed array of `nmemb` elements of `size` bytes each.
/// Null when either factor is zero or their product overflows.
///
/// # Safety
///
/// Same contract as [`os_malloc`].
#[no_mangle]
pub unsafe extern "C" fn os_calloc(nmemb: usize, size: usize) -> *mut c_void {
    unsafe { ALLOCATOR.calloc(nmemb, size).cast() }
}

/// Resizes an allocation, preserving contents up to the smaller payload.
/// Acts as [`os_malloc`] on a null pointer and as [`os_free`] on a zero
/// size.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from one of the `os_` entry
/// points.
#[no_mangle]
pub unsafe extern "C" fn os_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    unsafe { ALLOCATOR.realloc(ptr.cast(), size).cast() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn c_entry_points_round_trip() {
        let _guard = test_util::serialize();

        unsafe {
            let p = os_malloc(24).cast::<u8>();
            assert!(!p.is_null());
            assert_eq!(p as usize % 8, 0);
            p.write(7);

            let p = os_realloc(p.cast(), 48).cast::<u8>();
            assert_eq!(p.read(), 7);

            let z = os_calloc(4, 8).cast::<u8>();
            for i in 0..32 {
                assert_eq!(z.add(i).read(), 0);
            }

            os_free(p.cast());
            os_free(z.cast());
            os_free(core::ptr::null_mut());

            assert!(os_malloc(0).is_null());
        }
    }
}
