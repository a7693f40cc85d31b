use core::ptr::NonNull;

use crate::{
    block::{BlockMeta, BlockNode, BlockStatus, ALIGNMENT, BLOCK_HEADER_SIZE},
    heap::Heap,
    kernel,
    utils::align,
};

/// Smallest payload worth splitting off: one aligned byte. A remainder
/// below a header plus this much stays attached to the chosen block.
pub(crate) const MIN_SPLIT_PAYLOAD: usize = align(1, ALIGNMENT);

/// Arena management: everything that reuses or grows heap-arena space.
/// Mapped blocks never participate here; they are not contiguous with
/// anything.
impl Heap {
    /// The arena reuse pipeline: coalesce, then best-fit with split,
    /// then try to grow a trailing free block. `None` means the caller
    /// has to take fresh memory from the kernel.
    pub(crate) unsafe fn try_all(&mut self, total: usize) -> Option<NonNull<BlockNode>> {
        unsafe {
            self.merge_free_blocks();

            if let Some(found) = self.search_and_split(total) {
                return Some(found);
            }

            self.extend_tail(total)
        }
    }

    /// Sweeps the registry once, folding every run of consecutive free
    /// blocks into its first member. Consecutive free registry nodes are
    /// always arena-adjacent: arena blocks tile the arena in insertion
    /// order, and mapped nodes are never `Free` while linked.
    pub(crate) unsafe fn merge_free_blocks(&mut self) {
        if self.blocks.is_empty() {
            return;
        }

        let mut current = self.blocks.first();

        while let Some(mut node) = current {
            unsafe {
                let free_successor = match node.as_ref().next {
                    Some(next) if next.as_ref().data.status == BlockStatus::Free => Some(next),
                    _ => None,
                };

                match free_successor {
                    Some(next) if node.as_ref().data.status == BlockStatus::Free => {
                        node.as_mut().data.size += BLOCK_HEADER_SIZE + next.as_ref().data.size;
                        self.blocks.remove(next);
                        // Stay on this block: the new successor may be free too.
                    }
                    _ => current = node.as_ref().next,
                }
            }
        }
    }

    /// Folds the immediate successor into `node` if that successor is
    /// free. `node` itself does not have to be free: this is how a
    /// reallocated block grows over its free neighbor.
    pub(crate) unsafe fn absorb_next_free(&mut self, mut node: NonNull<BlockNode>) {
        unsafe {
            if let Some(next) = node.as_ref().next {
                if next.as_ref().data.status == BlockStatus::Free {
                    node.as_mut().data.size += BLOCK_HEADER_SIZE + next.as_ref().data.size;
                    self.blocks.remove(next);
                }
            }
        }
    }

    /// Walks the registry for the smallest free block that can hold
    /// `total - BLOCK_HEADER_SIZE` payload bytes, first-encountered on
    /// ties. The chosen block is marked in use and, when the remainder
    /// can hold a header plus at least [`MIN_SPLIT_PAYLOAD`], carved in
    /// two with the tail spliced back in as a free block.
    pub(crate) unsafe fn search_and_split(&mut self, total: usize) -> Option<NonNull<BlockNode>> {
        let requested_payload = total - BLOCK_HEADER_SIZE;

        let mut best: Option<NonNull<BlockNode>> = None;
        let mut best_size = usize::MAX;
        let mut current = self.blocks.first();

        while let Some(node) = current {
            unsafe {
                let meta = &node.as_ref().data;
                if meta.status == BlockStatus::Free
                    && meta.size >= requested_payload
                    && meta.size < best_size
                {
                    best = Some(node);
                    best_size = meta.size;
                }
                current = node.as_ref().next;
            }
        }

        let mut chosen = best?;

        unsafe {
            chosen.as_mut().data.status = BlockStatus::Alloc;

            if chosen.as_ref().data.size >= MIN_SPLIT_PAYLOAD + total {
                let leftover = chosen.as_ref().data.size - total;
                let addr = NonNull::new_unchecked(chosen.as_ptr().cast::<u8>().add(total));

                self.blocks
                    .insert_after(chosen, BlockMeta::arena(leftover, BlockStatus::Free), addr);
                chosen.as_mut().data.size = requested_payload;
            }
        }

        Some(chosen)
    }

    /// Grows the trailing registry block in place when it is free,
    /// extending the program break by just the missing bytes. The tail
    /// of the registry is also the block ending at the current break,
    /// since mapped blocks never move it.
    pub(crate) unsafe fn extend_tail(&mut self, total: usize) -> Option<NonNull<BlockNode>> {
        let mut tail = self.blocks.last()?;

        unsafe {
            if tail.as_ref().data.status != BlockStatus::Free {
                return None;
            }

            let payload = total - BLOCK_HEADER_SIZE;
            kernel::brk_extend(payload - tail.as_ref().data.size);
            tail.as_mut().data.size = payload;
            tail.as_mut().data.status = BlockStatus::Alloc;
        }

        Some(tail)
    }

    /// Realloc-grow of the block ending at the current break: extends
    /// the break by the payload delta and resizes `node` in place. Fails
    /// if `node` has a successor, i.e. is not the trailing block.
    pub(crate) unsafe fn extend_last_in_place(
        &mut self,
        mut node: NonNull<BlockNode>,
        new_payload: usize,
    ) -> bool {
        unsafe {
            if node.as_ref().next.is_some() {
                return false;
            }

            kernel::brk_extend(new_payload - node.as_ref().data.size);
            node.as_mut().data.size = new_payload;
            node.as_mut().data.status = BlockStatus::Alloc;
        }

        true
    }

    /// Realloc-grow over the free successor: absorb it, then trim the
    /// enlarged block back down to `new_payload` if it overshot. When
    /// the absorbed space still is not enough the block keeps its
    /// enlarged size and the caller falls back to relocating.
    ///
    /// The pointer came from the caller, so `node` is revalidated
    /// against the registry before any neighbor is touched.
    pub(crate) unsafe fn extend_into_successor(
        &mut self,
        node: NonNull<BlockNode>,
        new_payload: usize,
    ) -> bool {
        unsafe {
            let mut current = self.blocks.first();
            while let Some(candidate) = current {
                if candidate == node {
                    break;
                }
                current = candidate.as_ref().next;
            }
            if current.is_none() {
                return false;
            }

            self.absorb_next_free(node);

            if node.as_ref().data.size >= new_payload {
                self.split_for_realloc(node, new_payload);
                return true;
            }
        }

        false
    }

    /// Trims `node` down to `new_payload` bytes, turning the remainder
    /// into a free successor, provided the remainder can hold a header
    /// plus [`MIN_SPLIT_PAYLOAD`]. Otherwise the block is left as is.
    pub(crate) unsafe fn split_for_realloc(&mut self, mut node: NonNull<BlockNode>, new_payload: usize) {
        unsafe {
            if node.as_ref().data.size >= MIN_SPLIT_PAYLOAD + new_payload + BLOCK_HEADER_SIZE {
                let leftover = node.as_ref().data.size - (new_payload + BLOCK_HEADER_SIZE);
                let addr = NonNull::new_unchecked(
                    node.as_ptr().cast::<u8>().add(BLOCK_HEADER_SIZE + new_payload),
                );

                self.blocks
                    .insert_after(node, BlockMeta::arena(leftover, BlockStatus::Free), addr);
                node.as_mut().data.size = new_payload;
            }
        }
    }
}
