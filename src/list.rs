use crate::block::{BlockRef, Header};

/// Reference to a neighbouring block, `None` at the region boundaries.
pub(crate) type Link = Option<BlockRef>;

/// Most header writes a single list operation needs: the block itself, the
/// block it creates or absorbs, and the far side neighbour.
const MAX_WRITES: usize = 3;

/// Address ordered, doubly linked list of blocks.
///
/// The nodes live inside the managed region itself, so the list only keeps
/// its boundaries around. Every method that touches a node receives the
/// region bytes where the headers are stored.
///
/// ```text
///  head                                                     tail
///   |                                                        |
/// +-v------+-----------+    +--------+-----------+    +------v-+-----------+
/// | Header |  payload  | -> | Header |  payload  | -> | Header |  payload  |
/// |        |           | <- |        |           | <- |        |           |
/// +--------+-----------+    +--------+-----------+    +--------+-----------+
/// 0                                                                     break
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct List {
    head: Link,
    tail: Link,
    len: usize,
}

impl List {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Block at the lowest address.
    #[inline]
    pub fn first(&self) -> Link {
        self.head
    }

    /// Block at the highest address.
    #[inline]
    pub fn last(&self) -> Link {
        self.tail
    }

    /// Appends an open block at the high address boundary and returns its header.
    ///
    /// The caller guarantees that `at` is exactly where the current tail ends.
    pub fn append(&mut self, bytes: &mut [u8], at: BlockRef, payload_size: usize) -> Header {
        let header = Header::open(payload_size, self.tail, None);
        let mut relink = Relink::new();

        match self.tail {
            Some(tail) => {
                let mut tail_header = relink.header(bytes, tail);
                tail_header.next = Some(at);
                relink.write(tail, tail_header);
            }
            None => relink.set_head(Some(at)),
        }

        relink.write(at, header);
        relink.set_tail(Some(at));
        relink.inserted();

        self.apply(bytes, relink);

        header
    }

    /// Applies every staged change of `relink` at once.
    pub fn apply(&mut self, bytes: &mut [u8], relink: Relink) {
        for (at, header) in relink.writes.into_iter().flatten() {
            header.write(bytes, at);
        }

        if let Some(head) = relink.head {
            self.head = head;
        }

        if let Some(tail) = relink.tail {
            self.tail = tail;
        }

        self.len = self.len + relink.inserted - relink.removed;
    }

    pub fn iter<'a>(&self, bytes: &'a [u8]) -> Iter<'a> {
        Iter {
            bytes,
            front: self.head,
            back: self.tail,
            remaining: self.len,
        }
    }
}

/// Walks the blocks in address order, from either boundary.
pub(crate) struct Iter<'a> {
    bytes: &'a [u8],
    front: Link,
    back: Link,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = (BlockRef, Header);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let block = self.front?;
        let header = Header::read(self.bytes, block);

        self.front = header.next;
        self.remaining -= 1;

        Some((block, header))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let block = self.back?;
        let header = Header::read(self.bytes, block);

        self.back = header.prev;
        self.remaining -= 1;

        Some((block, header))
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// Staged set of changes to the block list.
///
/// Splitting and merging rewrite up to three headers plus the list
/// boundaries. All new values are computed into a `Relink` first and written
/// by [`List::apply`] in one go, so no step ever reads a half updated
/// neighbour.
#[derive(Debug, Default)]
pub(crate) struct Relink {
    writes: [Option<(BlockRef, Header)>; MAX_WRITES],
    head: Option<Link>,
    tail: Option<Link>,
    inserted: usize,
    removed: usize,
}

impl Relink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header of `at` as it will look after this batch is applied.
    pub fn header(&self, bytes: &[u8], at: BlockRef) -> Header {
        self.writes
            .iter()
            .flatten()
            .find(|(block, _)| *block == at)
            .map_or_else(|| Header::read(bytes, at), |(_, header)| *header)
    }

    /// Stages `header` to be written at `at`, replacing any earlier staged value.
    pub fn write(&mut self, at: BlockRef, header: Header) {
        let slot = self
            .writes
            .iter_mut()
            .find(|slot| slot.is_none_or(|(block, _)| block == at));

        match slot {
            Some(slot) => *slot = Some((at, header)),
            None => unreachable!("a list operation never rewrites more than {MAX_WRITES} headers"),
        }
    }

    pub fn set_head(&mut self, head: Link) {
        self.head = Some(head);
    }

    pub fn set_tail(&mut self, tail: Link) {
        self.tail = Some(tail);
    }

    /// Records that a new block joins the list.
    pub fn inserted(&mut self) {
        self.inserted += 1;
    }

    /// Records that a block was absorbed by its neighbour.
    pub fn removed(&mut self) {
        self.removed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::HEADER_SIZE;

    fn three_blocks() -> (List, Vec<u8>, [BlockRef; 3]) {
        let mut bytes = vec![0u8; 3 * HEADER_SIZE + 8 + 16 + 24];
        let mut list = List::new();

        let a = BlockRef::new(0);
        let b = BlockRef::new(a.end(8));
        let c = BlockRef::new(b.end(16));

        list.append(&mut bytes, a, 8);
        list.append(&mut bytes, b, 16);
        list.append(&mut bytes, c, 24);

        (list, bytes, [a, b, c])
    }

    #[test]
    fn new_list_is_empty() {
        let list = List::new();

        assert_eq!(list.len(), 0);
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
        assert!(list.iter(&[]).next().is_none());
    }

    #[test]
    fn append_links_both_directions() {
        let (list, bytes, [a, b, c]) = three_blocks();

        assert_eq!(list.len(), 3);
        assert_eq!(list.first(), Some(a));
        assert_eq!(list.last(), Some(c));

        let forward: Vec<_> = list.iter(&bytes).map(|(block, _)| block).collect();
        let backward: Vec<_> = list.iter(&bytes).rev().map(|(block, _)| block).collect();

        assert_eq!(forward, vec![a, b, c]);
        assert_eq!(backward, vec![c, b, a]);

        let middle = Header::read(&bytes, b);
        assert_eq!(middle.prev, Some(a));
        assert_eq!(middle.next, Some(c));
        assert_eq!(middle.payload_size, 16);
    }

    #[test]
    fn iterating_from_both_ends_never_crosses() {
        let (list, bytes, [a, b, c]) = three_blocks();
        let mut iter = list.iter(&bytes);

        assert_eq!(iter.next().map(|(block, _)| block), Some(a));
        assert_eq!(iter.next_back().map(|(block, _)| block), Some(c));
        assert_eq!(iter.next().map(|(block, _)| block), Some(b));
        assert!(iter.next_back().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn relink_is_invisible_until_applied() {
        let (mut list, mut bytes, [a, b, _]) = three_blocks();
        let before = Header::read(&bytes, a);

        let mut relink = Relink::new();
        let mut staged = before;
        staged.payload_size = 99;
        relink.write(a, staged);
        relink.set_head(Some(b));
        relink.removed();

        assert_eq!(Header::read(&bytes, a), before);
        assert_eq!(relink.header(&bytes, a).payload_size, 99);
        assert_eq!(list.first(), Some(a));

        list.apply(&mut bytes, relink);

        assert_eq!(Header::read(&bytes, a).payload_size, 99);
        assert_eq!(list.first(), Some(b));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn relink_rewrites_reuse_the_same_slot() {
        let (_, bytes, [a, b, c]) = three_blocks();
        let mut relink = Relink::new();

        for size in [1, 2, 3] {
            let mut header = Header::read(&bytes, a);
            header.payload_size = size;
            relink.write(a, header);
        }
        relink.write(b, Header::read(&bytes, b));
        relink.write(c, Header::read(&bytes, c));

        assert_eq!(relink.header(&bytes, a).payload_size, 3);
    }
}
