use log::{debug, trace, warn};

use crate::{
    block::{BlockRef, HEADER_SIZE, Header},
    error::HeapError,
    list::{Iter, Link, List, Relink},
    source::RegionSource,
    utils::WORD_SIZE,
};

/// The managed region together with the list of blocks that tiles it.
///
/// Blocks cover the region from offset 0 up to the break without gaps or
/// overlaps, and no two neighbouring blocks are ever open at the same time.
/// Every method here leaves both properties intact.
///
/// ```text
/// 0                                                               brk
/// +--------+---------+--------+-------------+--------+-------------+
/// | Header | closed  | Header |    open     | Header |   closed    |
/// +--------+---------+--------+-------------+--------+-------------+
/// ```
pub(crate) struct Region<S> {
    source: S,
    blocks: List,
}

impl<S: RegionSource> Region<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            blocks: List::new(),
        }
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[inline]
    pub fn blocks(&self) -> &List {
        &self.blocks
    }

    #[inline]
    pub fn brk(&self) -> usize {
        self.source.brk()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.source.bytes()
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.source.bytes_mut()
    }

    #[inline]
    pub fn header(&self, at: BlockRef) -> Header {
        Header::read(self.source.bytes(), at)
    }

    pub fn iter(&self) -> Iter<'_> {
        self.blocks.iter(self.source.bytes())
    }

    /// Flips the open tag of a block. Neighbours are not touched.
    pub fn set_open(&mut self, at: BlockRef, is_open: bool) {
        let bytes = self.source.bytes_mut();
        let mut header = Header::read(bytes, at);
        header.is_open = is_open;
        header.write(bytes, at);
    }

    /// Grows the region by `payload_size` plus one header and appends the new
    /// span as a single open block at the high address end.
    pub fn extend(&mut self, payload_size: usize) -> Result<BlockRef, HeapError> {
        let requested = payload_size
            .checked_add(HEADER_SIZE)
            .ok_or(HeapError::Overflow)?;

        let previous = self
            .source
            .grow(requested)
            .ok_or(HeapError::Exhausted { requested })?;

        let block = BlockRef::new(previous);

        debug_assert_eq!(
            self.blocks
                .last()
                .map_or(0, |tail| tail.end(self.header(tail).payload_size)),
            previous,
            "region grew somewhere other than its break"
        );

        self.blocks
            .append(self.source.bytes_mut(), block, payload_size);

        debug!(
            "region grew by {requested} bytes, new block at {:#x}, break at {:#x}",
            block.offset(),
            self.brk()
        );

        Ok(block)
    }

    /// Stages the back reference of the block following a rewritten one.
    ///
    /// `next` is the forward link the rewritten block `to` ends up with: the
    /// block behind it must point back to `to`, or `to` becomes the tail.
    fn stage_back_link(&self, relink: &mut Relink, next: Link, to: BlockRef) {
        match next {
            Some(far) => {
                let mut far_header = relink.header(self.source.bytes(), far);
                far_header.prev = Some(to);
                relink.write(far, far_header);
            }
            None => relink.set_tail(Some(to)),
        }
    }

    /// Absorbs the higher neighbour of `at` if both are open. Returns the
    /// block that now covers `at`, which is always `at` itself.
    pub fn merge_with_next(&mut self, at: BlockRef) -> BlockRef {
        let bytes = self.source.bytes();
        let mut header = Header::read(bytes, at);

        let Some(next) = header.next else {
            return at;
        };

        let next_header = Header::read(bytes, next);

        if !(header.is_open && next_header.is_open) {
            return at;
        }

        let mut relink = Relink::new();

        // The absorbed header becomes payload of the survivor.
        header.payload_size += HEADER_SIZE + next_header.payload_size;
        header.next = next_header.next;

        relink.write(at, header);
        self.stage_back_link(&mut relink, next_header.next, at);
        relink.removed();

        self.blocks.apply(self.source.bytes_mut(), relink);

        trace!(
            "merged block {:#x} into {:#x}, payload now {} bytes",
            next.offset(),
            at.offset(),
            header.payload_size
        );

        at
    }

    /// Folds `at` into its lower neighbour if both are open. Returns the block
    /// that now covers `at`.
    pub fn merge_with_prev(&mut self, at: BlockRef) -> BlockRef {
        let header = self.header(at);

        match header.prev {
            Some(prev) if header.is_open && self.header(prev).is_open => self.merge_with_next(prev),
            _ => at,
        }
    }

    /// Merges a freshly opened block with whichever neighbours are open, lower
    /// one first. Returns the block that ends up covering `at`.
    pub fn coalesce(&mut self, at: BlockRef) -> BlockRef {
        let subject = self.merge_with_prev(at);
        self.merge_with_next(subject)
    }

    /// Hands out `required` bytes of the open block `at`, closing it.
    ///
    /// When the leftover space can hold a useful block of its own, `at` is cut
    /// down to exactly `required` bytes and the rest becomes a new open block
    /// right after it, merged with its higher neighbour if that one is open.
    /// Otherwise the whole block is handed out.
    ///
    /// ```text
    ///  at                                          at           remainder
    ///  +--------+------------------------+         +--------+----+--------+-----------+
    ///  | Header |    payload_size        |   ==>   | Header |req | Header |   rest    |
    ///  +--------+------------------------+         +--------+----+--------+-----------+
    /// ```
    pub fn split(&mut self, at: BlockRef, required: usize) -> BlockRef {
        let bytes = self.source.bytes();
        let header = Header::read(bytes, at);

        let remainder_size = header
            .payload_size
            .checked_sub(required)
            .and_then(|leftover| leftover.checked_sub(HEADER_SIZE))
            .filter(|&size| size >= 2 * HEADER_SIZE);

        let Some(remainder_size) = remainder_size else {
            self.set_open(at, false);
            return at;
        };

        let remainder = BlockRef::new(at.end(required));

        if remainder.end(remainder_size) > self.brk() {
            warn!(
                "block {:#x} claims {} bytes past the break, handing it out whole",
                at.offset(),
                header.payload_size
            );
            self.set_open(at, false);
            return at;
        }

        let mut relink = Relink::new();
        let mut remainder_header = Header::open(remainder_size, Some(at), header.next);

        // The remainder is coalesced before it is linked in, so it never sits
        // open right below another open block.
        if let Some(next) = header.next {
            let next_header = Header::read(bytes, next);

            if next_header.is_open {
                remainder_header.payload_size += HEADER_SIZE + next_header.payload_size;
                remainder_header.next = next_header.next;
                relink.removed();
            }
        }

        self.stage_back_link(&mut relink, remainder_header.next, remainder);

        relink.write(remainder, remainder_header);
        relink.write(
            at,
            Header {
                payload_size: required,
                is_open: false,
                prev: header.prev,
                next: Some(remainder),
            },
        );
        relink.inserted();

        self.blocks.apply(self.source.bytes_mut(), relink);

        trace!(
            "split block {:#x}: {required} bytes handed out, {} bytes left open at {:#x}",
            at.offset(),
            remainder_header.payload_size,
            remainder.offset()
        );

        at
    }

    /// Walks the whole list and reports the first structural inconsistency.
    pub fn validate(&self) -> Result<(), HeapError> {
        let bytes = self.source.bytes();
        let brk = self.brk();

        let corrupt =
            |offset: usize, reason: &'static str| Err(HeapError::Corrupt { offset, reason });

        let mut cursor = self.blocks.first();
        let mut expected = 0;
        let mut prev: Link = None;
        let mut prev_open = false;
        let mut count = 0;

        while let Some(block) = cursor {
            let offset = block.offset();

            if offset != expected {
                return corrupt(offset, "block does not start where its lower neighbour ends");
            }

            if block.end(0) > brk {
                return corrupt(offset, "header lies past the break");
            }

            let header = Header::read(bytes, block);

            if header.prev != prev {
                return corrupt(offset, "stale back reference");
            }

            if header.payload_size % WORD_SIZE != 0 {
                return corrupt(offset, "payload size is not word aligned");
            }

            let end = match offset
                .checked_add(HEADER_SIZE)
                .and_then(|start| start.checked_add(header.payload_size))
            {
                Some(end) if end <= brk => end,
                _ => return corrupt(offset, "payload runs past the break"),
            };

            if prev_open && header.is_open {
                return corrupt(offset, "two neighbouring blocks are open");
            }

            count += 1;

            if count > self.blocks.len() {
                return corrupt(offset, "more blocks linked than recorded");
            }

            prev = Some(block);
            prev_open = header.is_open;
            expected = end;
            cursor = header.next;
        }

        if self.blocks.last() != prev {
            return corrupt(prev.map_or(0, BlockRef::offset), "tail is not the highest block");
        }

        if count != self.blocks.len() {
            return corrupt(expected, "fewer blocks linked than recorded");
        }

        if expected != brk {
            return corrupt(expected, "blocks do not reach the break");
        }

        Ok(())
    }
}
