//! osalloc is a userspace heap allocator that manages virtual memory
//! obtained straight from the kernel, through:
//!
//! [`sbrk`](https://man7.org/linux/man-pages/man2/sbrk.2.html) for the
//! contiguous heap arena, and
//! [`mmap`](https://man7.org/linux/man-pages/man2/mmap.2.html) for large
//! standalone blocks.
//!
//! The internal structure of the allocator looks like this:
//!
//! ```text
//!                 Arena (grows with the program break)
//! +-----------------------------------------------+
//! | +-------+    +-------+    +-------+           |    +----------+
//! | | Block | -> | Free  | -> | Block |           |    |  Mapped  |
//! | +-------+    +-------+    +-------+           |    +----------+
//! +-----------------------------------------------+          |
//!       |            |            |                          |
//!       +------------+------------+--------------------------+
//!                        block registry
//! ```
//!
//! Every block carries an in-band metadata header right before its
//! payload, and all blocks, arena and mapped alike, are linked into one
//! registry. Small requests are carved from the arena, which is reused
//! aggressively before it ever grows:
//!
//! - **Block merging**: adjacent free arena blocks are coalesced before
//!   every search
//! - **Best-fit search**: the smallest free block that fits wins
//! - **Block splitting**: oversized blocks are split and the remainder
//!   kept free
//! - **Tail extension**: a trailing free block is grown in place instead
//!   of taking a fresh slab
//!
//! Requests past a threshold bypass the arena entirely and get their own
//! anonymous mapping, released wholesale on free.
//!
//! The main structure is [`OsAlloc`], you can follow the codebase from
//! there. It also backs the C-ABI entry points in [`api`] and can serve
//! as `#[global_allocator]`.

mod arena;
mod block;
mod heap;
mod kernel;
mod list;
mod osalloc;
mod utils;

pub mod api;

pub use crate::osalloc::OsAlloc;

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Every heap in this process shares the one program break, and the
    /// arena paths assume no interleaved `sbrk` from other tests, so
    /// all allocator tests run under this lock.
    static LOCK: Mutex<()> = Mutex::new(());

    pub(crate) fn serialize() -> MutexGuard<'static, ()> {
        LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
