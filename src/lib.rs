//! # brkalloc
//!
//! A first-fit memory allocator that manages one contiguous, monotonically
//! growing region and keeps all of its bookkeeping inside that region.
//!
//! ```text
//!  0                                                                  break
//!  +--------+--------+--------+-----------------+--------+--------+ - - -
//!  | Header | closed | Header |      open       | Header | closed |  grows
//!  +--------+--------+--------+-----------------+--------+--------+ - - ->
//!       ^  prev/next  ^                     prev/next  ^
//!       +-------------+----------------------------------+
//! ```
//!
//! Every block starts with a header holding its payload size, whether it is
//! open (free) and the offsets of its neighbours. The headers form an address
//! ordered, doubly linked list that covers the region without gaps:
//!
//! - [`Heap::allocate`] looks for an open block among the blocks closest to
//!   the break, splits it if it is much larger than needed, and grows the
//!   region when nothing fits.
//! - [`Heap::deallocate`] opens the block again and merges it with open
//!   neighbours, so two open blocks are never adjacent.
//! - [`Heap::resize`] keeps the block when it is already big enough and
//!   otherwise moves the contents to a fresh block.
//! - [`Heap::allocate_zeroed`] is `allocate` plus zeroing.
//!
//! Addresses are offsets into the region ([`Addr`]) and payloads are reached
//! through [`Heap::payload`] and [`Heap::payload_mut`], so the allocator can run
//! on top of any [`RegionSource`]: the process address space
//! ([`SystemRegion`]) or a plain in-memory [`Buffer`].
//!
//! ```rust
//! use brkalloc::{Buffer, Heap, HeapConfig};
//!
//! let mut heap = Heap::from_source(Buffer::new(), HeapConfig::default());
//!
//! let addr = heap.allocate(32).unwrap();
//! heap.payload_mut(addr)[..5].copy_from_slice(b"hello");
//!
//! let addr = heap.resize(Some(addr), 4096).unwrap();
//! assert_eq!(&heap.payload(addr)[..5], b"hello");
//!
//! // Released space is reused before the region grows again.
//! let region_size = heap.region_size();
//! heap.deallocate(Some(addr));
//! assert!(heap.allocate(4096).is_some());
//! assert_eq!(heap.region_size(), region_size);
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization, wrap the heap in one lock
//!   to share it.
//! - **Grow only**: memory goes back to the OS when the heap is dropped, never
//!   before.
//! - **Word alignment**: payloads are aligned to the machine word and no more.

mod block;
mod config;
mod error;
mod heap;
mod kernel;
mod list;
mod region;
mod source;
mod utils;

pub use block::{Addr, BlockInfo, HEADER_SIZE};
pub use config::{DEFAULT_RESERVE, DEFAULT_SCAN_LIMIT, HeapConfig};
pub use error::HeapError;
pub use heap::{Heap, HeapStats};
pub use kernel::SystemRegion;
pub use source::{Buffer, RegionSource};
