/// Default number of blocks the allocation search looks at before giving up
/// and growing the region.
pub const DEFAULT_SCAN_LIMIT: usize = 10;

/// Default address space reservation of a [`crate::SystemRegion`] (1 GiB).
pub const DEFAULT_RESERVE: usize = 1 << 30;

/// Tunable policy of a [`crate::Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Maximum number of blocks inspected per allocation, open or not.
    ///
    /// Bounding the search keeps allocation time predictable, at the price of
    /// growing the region when a suitable free block lies further down the list.
    pub scan_limit: usize,
    /// Bytes of address space reserved up front by [`crate::SystemRegion`],
    /// rounded up to whole pages. Growth past this point is reported as
    /// exhaustion.
    pub reserve: usize,
}

impl HeapConfig {
    pub const fn new() -> Self {
        Self {
            scan_limit: DEFAULT_SCAN_LIMIT,
            reserve: DEFAULT_RESERVE,
        }
    }

    pub const fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit;
        self
    }

    pub const fn with_reserve(mut self, reserve: usize) -> Self {
        self.reserve = reserve;
        self
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
