use core::{cmp, ptr::{self, NonNull}};

use crate::{
    block::{self, BlockMeta, BlockNode, BlockStatus, ALIGNMENT, BLOCK_HEADER_SIZE},
    kernel,
    list::List,
    utils::align,
};

/// Requests whose total (payload plus header) reaches this cutoff are
/// served by a standalone mapping instead of the arena.
pub(crate) const MMAP_THRESHOLD: usize = 128 * 1024;

/// Size of the arena slab claimed by the very first arena allocation.
pub(crate) const ARENA_PREALLOC: usize = MMAP_THRESHOLD;

/// What an allocation is for. Zero-initialized requests trade the mmap
/// cutoff down to one page: the kernel hands out already-zeroed pages,
/// so large zeroed blocks are cheaper as fresh mappings.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocIntent {
    Normal,
    ZeroInit,
}

/// The core allocator: the block registry plus the arena policy state.
///
/// ```text
///                      Arena (program break region)
///  +-----------------------------------------------+
///  | +-------+    +-------+    +-------+           |      standalone
///  | | Alloc | -> | Free  | -> | Alloc |           |      mappings
///  | +-------+    +-------+    +-------+           |     +--------+
///  +-----------------------------------------------+     | Mapped |
///        |            |            |                     +--------+
///        +------------+------------+-----------------------+
///                          one registry, insertion order
/// ```
///
/// Every block ever handed out, arena or mapped, lives in the one
/// registry. Arena blocks appear in address order because the arena only
/// grows at the end; mapped blocks are interleaved wherever they were
/// inserted.
///
/// `Heap` is strictly single-threaded: callers that share one across
/// threads must provide their own mutual exclusion (see `OsAlloc`).
pub(crate) struct Heap {
    /// The block registry.
    pub(crate) blocks: List<BlockMeta>,
    /// Whether the first arena slab has been claimed.
    arena_preallocated: bool,
}

// Registry nodes are reachable only through the owning heap; moving the
// heap to another thread moves exclusive access to all of them with it.
unsafe impl Send for Heap {}

impl Heap {
    pub const fn new() -> Self {
        Self {
            blocks: List::new(),
            arena_preallocated: false,
        }
    }

    /// Allocates `size` bytes and returns the user pointer, or null when
    /// `size` is zero.
    ///
    /// Requests at or above the threshold get their own mapping. Below
    /// it, the first request claims the whole prealloc slab whatever the
    /// caller asked for; later ones go through the arena reuse pipeline
    /// and only extend the program break when nothing can be recycled.
    pub unsafe fn malloc(&mut self, size: usize, intent: AllocIntent) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }

        let total = align(size, ALIGNMENT) + BLOCK_HEADER_SIZE;
        let threshold = match intent {
            AllocIntent::ZeroInit => kernel::page_size(),
            AllocIntent::Normal => MMAP_THRESHOLD,
        };

        unsafe {
            let node = if total >= threshold {
                self.allocate_mapped(total)
            } else if !self.arena_preallocated {
                self.arena_preallocated = true;
                self.allocate_brk(ARENA_PREALLOC)
            } else {
                match self.try_all(total) {
                    Some(node) => node,
                    None => self.allocate_brk(total),
                }
            };

            block::user_ptr(node)
        }
    }

    /// Releases the block behind `ptr`.
    ///
    /// Arena blocks are only flipped to free; folding them into their
    /// neighbors is deferred to the next allocation's reuse pipeline.
    /// Mapped blocks leave the registry and their mapping is returned to
    /// the kernel wholesale. Null and already-free pointers are ignored.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        unsafe {
            let mut node = block::from_user_ptr(ptr);

            match node.as_ref().data.status {
                BlockStatus::Alloc => node.as_mut().data.status = BlockStatus::Free,
                BlockStatus::Mapped => {
                    // For mapped blocks `size` is the full mapping
                    // length, header included.
                    let len = node.as_ref().data.size;
                    self.blocks.remove(node);
                    kernel::unmap_region(node.as_ptr().cast(), len);
                }
                BlockStatus::Free => {}
            }
        }
    }

    /// Allocates room for `count` elements of `elem_size` bytes each and
    /// zeroes the whole aligned payload. Null when either factor is zero
    /// or the product overflows.
    pub unsafe fn calloc(&mut self, count: usize, elem_size: usize) -> *mut u8 {
        if count == 0 || elem_size == 0 {
            return ptr::null_mut();
        }

        let bytes = match count.checked_mul(elem_size) {
            Some(bytes) => bytes,
            None => return ptr::null_mut(),
        };
        let len = align(bytes, ALIGNMENT);

        unsafe {
            let ptr = self.malloc(len, AllocIntent::ZeroInit);
            if !ptr.is_null() {
                ptr.write_bytes(0, len);
            }
            ptr
        }
    }

    /// Resizes the allocation behind `ptr` to `size` bytes.
    ///
    /// Shrinking always stays in place. Growing tries the cheap routes
    /// first: absorbing a free successor, or pushing the program break
    /// when the block is the trailing one. Only when both fail (or for
    /// mapped blocks, always) is the payload relocated.
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        if size == 0 {
            unsafe { self.free(ptr) };
            return ptr::null_mut();
        }

        if ptr.is_null() {
            return unsafe { self.malloc(size, AllocIntent::Normal) };
        }

        unsafe {
            let node = block::from_user_ptr(ptr);

            // Reallocating a freed block is undefined; refuse it here.
            if node.as_ref().data.status == BlockStatus::Free {
                return ptr::null_mut();
            }

            let new_payload = align(size, ALIGNMENT);
            if new_payload == node.as_ref().data.size {
                return ptr;
            }

            if node.as_ref().data.status == BlockStatus::Mapped {
                let old_payload = node.as_ref().data.size - BLOCK_HEADER_SIZE;
                let new_ptr = self.malloc(size, AllocIntent::Normal);

                ptr::copy_nonoverlapping(ptr, new_ptr, cmp::min(new_payload, old_payload));
                self.free(ptr);
                return new_ptr;
            }

            if new_payload < node.as_ref().data.size {
                self.split_for_realloc(node, new_payload);
                return ptr;
            }

            let grown = if node.as_ref().next.is_some() {
                self.extend_into_successor(node, new_payload)
            } else {
                self.extend_last_in_place(node, new_payload)
            };
            if grown {
                return ptr;
            }

            // In-place growth failed; relocate. A failed successor
            // absorption may have enlarged the block, so reread the
            // size. It is still below `new_payload`.
            let old_payload = node.as_ref().data.size;
            let new_ptr = self.malloc(size, AllocIntent::Normal);

            ptr::copy_nonoverlapping(ptr, new_ptr, old_payload);
            self.free(ptr);
            new_ptr
        }
    }

    /// Takes `total` fresh bytes from the program break and registers
    /// them as one allocated arena block.
    unsafe fn allocate_brk(&mut self, total: usize) -> NonNull<BlockNode> {
        unsafe {
            let addr = kernel::brk_extend(total);
            self.blocks.append(
                BlockMeta::arena(total - BLOCK_HEADER_SIZE, BlockStatus::Alloc),
                addr,
            )
        }
    }

    /// Takes a fresh `total`-byte mapping and registers it.
    unsafe fn allocate_mapped(&mut self, total: usize) -> NonNull<BlockNode> {
        unsafe {
            let addr = kernel::map_region(total);
            self.blocks.append(BlockMeta::mapped(total), addr)
        }
    }
}
