use log::{debug, error, trace, warn};

use crate::{
    block::{Addr, BlockInfo, BlockRef, Header},
    config::HeapConfig,
    error::HeapError,
    kernel::SystemRegion,
    region::Region,
    source::RegionSource,
    utils::{WORD_SIZE, checked_align},
};

/// A first-fit allocator over a single growable region.
///
/// All bookkeeping lives inside the region it manages. Requests are served by
/// searching the block list from the most recently grown end, splitting
/// oversized blocks, and growing the region when nothing suitable turns up.
/// Released blocks are merged with their open neighbours right away.
///
/// A `Heap` is not thread safe. Wrap the whole heap in one lock if it has to
/// be shared.
pub struct Heap<S = SystemRegion> {
    region: Region<S>,
    config: HeapConfig,
}

/// Snapshot of how the managed region is used.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub blocks: usize,
    pub open_blocks: usize,
    pub closed_blocks: usize,
    /// Payload bytes available for reuse.
    pub open_bytes: usize,
    /// Payload bytes handed out to callers.
    pub closed_bytes: usize,
    /// Size of the managed region, headers included.
    pub region_size: usize,
}

impl Heap<SystemRegion> {
    /// Heap backed by the process address space, reserved on first use.
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        Self::from_source(SystemRegion::with_config(&config), config)
    }
}

impl Default for Heap<SystemRegion> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RegionSource> Heap<S> {
    /// Heap that manages the bytes of `source`, which should be empty.
    pub fn from_source(source: S, config: HeapConfig) -> Self {
        Self {
            region: Region::new(source),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[inline]
    pub fn source(&self) -> &S {
        self.region.source()
    }

    /// Current size of the managed region in bytes, headers included.
    #[inline]
    pub fn region_size(&self) -> usize {
        self.region.brk()
    }

    /// Returns the address of at least `size` writable bytes, or `None` if
    /// `size` is zero or the region cannot grow any further.
    pub fn allocate(&mut self, size: usize) -> Option<Addr> {
        self.try_allocate(size)
            .inspect_err(|err| debug!("allocate({size}) not available: {err}"))
            .ok()
    }

    /// Same as [`Heap::allocate`] for `count * size` bytes, with the whole
    /// payload zeroed.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Option<Addr> {
        self.try_allocate_zeroed(count, size)
            .inspect_err(|err| debug!("allocate_zeroed({count}, {size}) not available: {err}"))
            .ok()
    }

    /// Gives a block back. `None` is a no-op.
    ///
    /// Passing an address that did not come from this heap, or releasing the
    /// same address twice, is a caller bug. Debug builds panic on the cases
    /// they can detect.
    pub fn deallocate(&mut self, addr: Option<Addr>) {
        let Some(addr) = addr else {
            return;
        };

        let Some(block) = self.owned_block(addr) else {
            return;
        };

        self.region.set_open(block, true);
        let merged = self.region.coalesce(block);

        trace!(
            "released {addr:?}, open block at {:#x} now holds {} bytes",
            merged.offset(),
            self.region.header(merged).payload_size
        );

        self.debug_validate();
    }

    /// Grows or keeps the block at `addr` so that it holds `new_size` bytes.
    ///
    /// - `None` behaves as [`Heap::allocate`].
    /// - A `new_size` of zero releases the block and returns `None`.
    /// - If the block is already big enough the same address comes back.
    /// - Otherwise the contents move to a new block and the old one is
    ///   released. If no new block can be found the old one stays untouched
    ///   and `None` is returned.
    pub fn resize(&mut self, addr: Option<Addr>, new_size: usize) -> Option<Addr> {
        let Some(addr) = addr else {
            return self.allocate(new_size);
        };

        if new_size == 0 {
            self.deallocate(Some(addr));
            return None;
        }

        self.try_resize(addr, new_size)
            .inspect_err(|err| debug!("resize({addr:?}, {new_size}) not available: {err}"))
            .ok()
    }

    /// Payload of a live block.
    ///
    /// It may be longer than requested: sizes are rounded up to the word size
    /// and small leftovers are never split off.
    ///
    /// Panics if `addr` does not lie within the managed region.
    pub fn payload(&self, addr: Addr) -> &[u8] {
        let size = self.region.header(addr.block()).payload_size;
        &self.region.bytes()[addr.offset()..addr.offset() + size]
    }

    /// Mutable payload of a live block. See [`Heap::payload`].
    pub fn payload_mut(&mut self, addr: Addr) -> &mut [u8] {
        let size = self.region.header(addr.block()).payload_size;
        &mut self.region.bytes_mut()[addr.offset()..addr.offset() + size]
    }

    /// Every block in address order. Reverse it to walk from the break down.
    pub fn blocks(&self) -> impl DoubleEndedIterator<Item = BlockInfo> + ExactSizeIterator + '_ {
        self.region.iter().map(|(block, header)| BlockInfo {
            addr: block.payload(),
            payload_size: header.payload_size,
            is_open: header.is_open,
        })
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            blocks: self.region.blocks().len(),
            region_size: self.region_size(),
            ..HeapStats::default()
        };

        for (_, header) in self.region.iter() {
            if header.is_open {
                stats.open_blocks += 1;
                stats.open_bytes += header.payload_size;
            } else {
                stats.closed_blocks += 1;
                stats.closed_bytes += header.payload_size;
            }
        }

        stats
    }

    /// Checks that the block list still tiles the region exactly and that no
    /// two neighbouring blocks are open.
    pub fn validate(&self) -> Result<(), HeapError> {
        self.region.validate().inspect_err(|err| error!("{err}"))
    }

    fn try_allocate(&mut self, size: usize) -> Result<Addr, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }

        let needed = checked_align(size, WORD_SIZE).ok_or(HeapError::Overflow)?;

        let block = match self.find_open_block(needed) {
            Some((block, header)) if header.payload_size > needed => {
                trace!(
                    "splitting open block {:#x} of {} bytes for {needed}",
                    block.offset(),
                    header.payload_size
                );
                self.region.split(block, needed)
            }
            Some((block, _)) => {
                trace!("reusing open block {:#x} for {needed}", block.offset());
                self.region.set_open(block, false);
                block
            }
            None => {
                let block = self.region.extend(needed)?;
                self.region.set_open(block, false);
                block
            }
        };

        self.debug_validate();

        Ok(block.payload())
    }

    fn try_allocate_zeroed(&mut self, count: usize, size: usize) -> Result<Addr, HeapError> {
        let size = count.checked_mul(size).ok_or(HeapError::Overflow)?;
        let addr = self.try_allocate(size)?;

        self.payload_mut(addr).fill(0);

        Ok(addr)
    }

    fn try_resize(&mut self, addr: Addr, new_size: usize) -> Result<Addr, HeapError> {
        let old_size = self.region.header(addr.block()).payload_size;

        if new_size <= old_size {
            return Ok(addr);
        }

        let new_addr = self.try_allocate(new_size)?;
        let copied = old_size.min(new_size);

        self.region
            .bytes_mut()
            .copy_within(addr.offset()..addr.offset() + copied, new_addr.offset());

        self.deallocate(Some(addr));

        trace!("moved {copied} bytes from {addr:?} to {new_addr:?}");

        Ok(new_addr)
    }

    /// First open block of at least `size` bytes among the `scan_limit` blocks
    /// closest to the break.
    fn find_open_block(&self, size: usize) -> Option<(BlockRef, Header)> {
        self.region
            .iter()
            .rev()
            .take(self.config.scan_limit)
            .find(|(_, header)| header.is_open && header.payload_size >= size)
    }

    /// Block owning `addr`, if it looks like a live allocation of this heap.
    fn owned_block(&self, addr: Addr) -> Option<BlockRef> {
        let block = addr.block();

        if addr.offset() > self.region.brk() {
            provenance_misuse(addr, "address outside the managed region");
            return None;
        }

        if cfg!(debug_assertions) && !self.region.iter().any(|(candidate, _)| candidate == block) {
            provenance_misuse(addr, "address does not start a payload");
            return None;
        }

        if self.region.header(block).is_open {
            provenance_misuse(addr, "block released twice");
            return None;
        }

        Some(block)
    }

    #[inline]
    fn debug_validate(&self) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.validate() {
                panic!("{err}");
            }
        }
    }
}

fn provenance_misuse(addr: Addr, reason: &str) {
    warn!("ignoring release of {addr:?}: {reason}");

    if cfg!(debug_assertions) {
        panic!("{reason}: {addr:?}");
    }
}
