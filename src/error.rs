use thiserror::Error;

/// Everything that can make a heap operation fail.
///
/// The public entry points of [`crate::Heap`] never hand these out: a failed
/// request is reported as `None`, the same way a caller recognizes any other
/// allocation failure. Only [`crate::Heap::validate`] returns them directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// Zero sized requests are rejected without touching the region.
    #[error("zero sized allocation request")]
    ZeroSize,
    /// A size computation (`count * size`, alignment, header overhead) overflowed.
    #[error("requested size overflows the address space")]
    Overflow,
    /// The region source refused to grow.
    #[error("region source refused to grow by {requested} bytes")]
    Exhausted { requested: usize },
    /// The block list no longer describes the managed region.
    #[error("heap corrupted at offset {offset:#x}: {reason}")]
    Corrupt { offset: usize, reason: &'static str },
}
