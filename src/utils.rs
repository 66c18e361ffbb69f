//! Helper functions for the allocator that don't belong to any concrete module.

use std::mem;

/// Machine word size. Every block size is a multiple of this so that headers
/// never straddle a word boundary.
pub(crate) const WORD_SIZE: usize = mem::size_of::<usize>();

/// Rounds `to_be_aligned` up to the next multiple of `alignment`, which must be
/// a power of two. Returns `None` instead of wrapping around when the result
/// does not fit in a `usize`.
pub(crate) fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    to_be_aligned
        .checked_add(alignment - 1)
        .map(|size| size & !(alignment - 1))
}
