use std::{fmt, num::NonZeroUsize};

use crate::{list::Link, utils::WORD_SIZE};

/// Size of a block header in bytes. The header is stored as four native
/// endian words, so it is always word aligned as long as payload sizes are.
pub const HEADER_SIZE: usize = 4 * WORD_SIZE;

/// Encoding of a missing neighbour inside a stored header.
const NO_LINK: usize = usize::MAX;

/// Offset of a block header inside the managed region.
///
/// This is the handle the block list uses instead of raw pointers. A block is
/// laid out like this:
///
/// ```text
/// +---------------------+ <------+ BlockRef
/// |    payload_size     |        |
/// +---------------------+        |
/// |       is_open       |        |
/// +---------------------+        | -> Header (HEADER_SIZE bytes)
/// |        prev         |        |
/// +---------------------+        |
/// |        next         |        |
/// +---------------------+ <------+ Addr (returned to the caller)
/// |       Payload       |        |
/// |         ...         |        | -> payload_size bytes
/// |         ...         |        |
/// +---------------------+ <------+ next BlockRef
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockRef(usize);

impl BlockRef {
    #[inline]
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Address of the payload that follows this header.
    #[inline]
    pub fn payload(self) -> Addr {
        Addr::from_block(self)
    }

    /// Offset one past the last payload byte, i.e. where the next block starts.
    #[inline]
    pub const fn end(self, payload_size: usize) -> usize {
        self.0 + HEADER_SIZE + payload_size
    }
}

/// Address of a payload handed out by [`crate::Heap`].
///
/// It is the offset of the first payload byte from the start of the managed
/// region. Since every payload is preceded by a header it is never zero, which
/// lets `Option<Addr>` stay word sized.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(NonZeroUsize);

impl Addr {
    /// Offset of the payload from the start of the managed region.
    #[inline]
    pub const fn offset(self) -> usize {
        self.0.get()
    }

    #[inline]
    fn from_block(block: BlockRef) -> Self {
        match NonZeroUsize::new(block.offset() + HEADER_SIZE) {
            Some(offset) => Self(offset),
            None => unreachable!("HEADER_SIZE is never zero"),
        }
    }

    /// Header of the block owning this payload, assuming the address came from
    /// this allocator.
    #[inline]
    pub(crate) const fn block(self) -> BlockRef {
        // Payload offsets are built from block offsets, so this never wraps.
        BlockRef::new(self.offset() - HEADER_SIZE)
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Addr({:#x})", self.offset())
    }
}

/// Bookkeeping fields of a block, decoded from the managed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    /// Usable bytes after the header.
    pub payload_size: usize,
    /// Free and reusable when set, handed out to a caller otherwise.
    pub is_open: bool,
    /// Neighbour at the next lower address.
    pub prev: Link,
    /// Neighbour at the next higher address.
    pub next: Link,
}

impl Header {
    pub const fn open(payload_size: usize, prev: Link, next: Link) -> Self {
        Self {
            payload_size,
            is_open: true,
            prev,
            next,
        }
    }

    /// Decodes the header stored at `at`.
    ///
    /// Panics if the header does not lie within `bytes`, which can only happen
    /// when the list is corrupted or a foreign address was passed in.
    pub fn read(bytes: &[u8], at: BlockRef) -> Self {
        let raw = &bytes[at.offset()..at.offset() + HEADER_SIZE];

        Self {
            payload_size: word(raw, 0),
            is_open: word(raw, 1) != 0,
            prev: decode_link(word(raw, 2)),
            next: decode_link(word(raw, 3)),
        }
    }

    /// Encodes this header at `at`.
    pub fn write(&self, bytes: &mut [u8], at: BlockRef) {
        let raw = &mut bytes[at.offset()..at.offset() + HEADER_SIZE];

        set_word(raw, 0, self.payload_size);
        set_word(raw, 1, self.is_open as usize);
        set_word(raw, 2, encode_link(self.prev));
        set_word(raw, 3, encode_link(self.next));
    }
}

fn word(raw: &[u8], index: usize) -> usize {
    let mut buf = [0u8; WORD_SIZE];
    buf.copy_from_slice(&raw[index * WORD_SIZE..(index + 1) * WORD_SIZE]);
    usize::from_ne_bytes(buf)
}

fn set_word(raw: &mut [u8], index: usize, value: usize) {
    raw[index * WORD_SIZE..(index + 1) * WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
}

fn encode_link(link: Link) -> usize {
    link.map_or(NO_LINK, BlockRef::offset)
}

fn decode_link(raw: usize) -> Link {
    (raw != NO_LINK).then_some(BlockRef::new(raw))
}

/// Read-only view of a block, as yielded by [`crate::Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload address of the block.
    pub addr: Addr,
    pub payload_size: usize,
    pub is_open: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_survives_the_managed_bytes() {
        let mut bytes = vec![0xAAu8; 3 * HEADER_SIZE];
        let at = BlockRef::new(HEADER_SIZE);
        let header = Header {
            payload_size: 48,
            is_open: false,
            prev: Some(BlockRef::new(0)),
            next: None,
        };

        header.write(&mut bytes, at);

        assert_eq!(Header::read(&bytes, at), header);
        // Neighbouring bytes are left alone.
        assert!(bytes[..HEADER_SIZE].iter().all(|&b| b == 0xAA));
        assert!(bytes[2 * HEADER_SIZE..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn payload_address_skips_the_header() {
        let block = BlockRef::new(5 * WORD_SIZE);
        let addr = block.payload();

        assert_eq!(addr.offset(), 5 * WORD_SIZE + HEADER_SIZE);
        assert_eq!(addr.block(), block);
        assert_eq!(block.end(16), addr.offset() + 16);
    }

    #[test]
    fn optional_address_is_word_sized() {
        assert_eq!(std::mem::size_of::<Option<Addr>>(), WORD_SIZE);
    }
}
