//! Where the managed region gets its bytes from.

/// The single point of contact with the host environment: a contiguous span
/// of bytes that can only grow at its high end.
///
/// Addresses inside the span are offsets from its start, so an implementation
/// is free to move the underlying storage around as long as the contents are
/// preserved.
pub trait RegionSource {
    /// Grows the region by exactly `len` bytes, returning the previous break
    /// (the offset where the new bytes start), or `None` when the host refuses
    /// to give out more memory. A failed call leaves the region unchanged.
    fn grow(&mut self, len: usize) -> Option<usize>;

    /// Current end of the region.
    fn brk(&self) -> usize;

    /// Every byte in `0..brk()`.
    fn bytes(&self) -> &[u8];

    /// Every byte in `0..brk()`, mutably.
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// A growable in-memory arena.
///
/// Backed by a `Vec<u8>` that may be reallocated as it grows, which is fine
/// because blocks are addressed by offset. An optional `limit` caps the
/// region size to simulate an exhausted host.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl Buffer {
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            limit: None,
        }
    }

    /// Buffer that refuses to grow past `limit` bytes in total.
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl RegionSource for Buffer {
    fn grow(&mut self, len: usize) -> Option<usize> {
        let previous = self.bytes.len();
        let new_len = previous.checked_add(len)?;

        if self.limit.is_some_and(|limit| new_len > limit) {
            return None;
        }

        self.bytes.try_reserve_exact(len).ok()?;
        self.bytes.resize(new_len, 0);

        Some(previous)
    }

    #[inline]
    fn brk(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_returns_previous_break() {
        let mut buffer = Buffer::new();

        assert_eq!(buffer.grow(64), Some(0));
        assert_eq!(buffer.grow(32), Some(64));
        assert_eq!(buffer.brk(), 96);
        assert_eq!(buffer.bytes().len(), 96);
    }

    #[test]
    fn growth_keeps_contents() {
        let mut buffer = Buffer::new();
        buffer.grow(4);
        buffer.bytes_mut().copy_from_slice(&[1, 2, 3, 4]);

        buffer.grow(4096);

        assert_eq!(&buffer.bytes()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn limit_refuses_growth_without_side_effects() {
        let mut buffer = Buffer::with_limit(100);

        assert_eq!(buffer.grow(60), Some(0));
        assert_eq!(buffer.grow(41), None);
        assert_eq!(buffer.brk(), 60);
        assert_eq!(buffer.grow(40), Some(60));
        assert_eq!(buffer.grow(1), None);
    }

    #[test]
    fn overflowing_growth_is_refused() {
        let mut buffer = Buffer::new();
        buffer.grow(8);

        assert_eq!(buffer.grow(usize::MAX), None);
        assert_eq!(buffer.brk(), 8);
    }
}
