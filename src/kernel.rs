use std::{ptr::NonNull, slice};

use log::debug;

use crate::{config::HeapConfig, source::RegionSource, utils::checked_align};

/// Zero sized handle for the platform dependant memory syscalls.
pub(crate) struct Kernel;

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. As the allocator, our top level view of this has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Reserves `len` bytes of contiguous address space without making them
    /// accessible. Returns `None` if the underlying syscall fails.
    unsafe fn reserve(len: usize) -> Option<NonNull<u8>>;

    /// Makes `len` bytes starting at the page aligned `addr` readable and
    /// writable. Returns whether the kernel agreed.
    unsafe fn commit(addr: NonNull<u8>, len: usize) -> bool;

    /// Returns the whole reservation of size `len` starting at `addr` back to
    /// the kernel.
    unsafe fn release(addr: NonNull<u8>, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    fn page_size() -> usize;
}

/// A managed region carved out of the process address space.
///
/// The first call to [`RegionSource::grow`] reserves `reserve` bytes of
/// contiguous address space; every later growth commits just enough pages to
/// move the break forward. The break never moves back, and the reservation is
/// only handed back to the kernel when the region is dropped.
///
/// ```text
///  base                     brk        committed               base + reserve
///   |                        |             |                          |
///   +------------------------+-------------+--------------------------+
///   |     managed blocks     |  committed  |  reserved, inaccessible  |
///   +------------------------+-------------+--------------------------+
/// ```
#[derive(Debug)]
pub struct SystemRegion {
    /// Start of the reservation, `None` until the first growth.
    base: Option<NonNull<u8>>,
    /// Size of the reservation, a multiple of the page size.
    reserve: usize,
    /// Bytes from `base` that are readable and writable.
    committed: usize,
    /// Current end of the managed region.
    brk: usize,
    page_size: usize,
}

impl SystemRegion {
    /// Region able to grow up to `reserve` bytes, rounded up to whole pages.
    pub fn new(reserve: usize) -> Self {
        let page_size = Kernel::page_size();
        let reserve = checked_align(reserve, page_size).unwrap_or(usize::MAX & !(page_size - 1));

        Self {
            base: None,
            reserve,
            committed: 0,
            brk: 0,
            page_size,
        }
    }

    pub fn with_config(config: &HeapConfig) -> Self {
        Self::new(config.reserve)
    }

    /// Upper bound for the region size.
    pub fn reserve(&self) -> usize {
        self.reserve
    }

    fn base(&mut self) -> Option<NonNull<u8>> {
        if self.base.is_none() {
            // SAFETY: reserving fresh address space has no preconditions.
            self.base = unsafe { Kernel::reserve(self.reserve) };
            debug!(
                "reserved {} bytes of address space at {:?}",
                self.reserve, self.base
            );
        }

        self.base
    }
}

impl Default for SystemRegion {
    fn default() -> Self {
        Self::with_config(&HeapConfig::default())
    }
}

impl RegionSource for SystemRegion {
    fn grow(&mut self, len: usize) -> Option<usize> {
        let new_brk = self.brk.checked_add(len)?;

        if new_brk > self.reserve {
            return None;
        }

        let base = self.base()?;

        if new_brk > self.committed {
            let target = checked_align(new_brk, self.page_size)?.min(self.reserve);

            // SAFETY: `committed` is page aligned and `target` lies within the
            // reservation, so the whole range belongs to us.
            let committed = unsafe {
                let start = base.add(self.committed);
                Kernel::commit(start, target - self.committed)
            };

            if !committed {
                return None;
            }

            self.committed = target;
        }

        let previous = self.brk;
        self.brk = new_brk;

        Some(previous)
    }

    #[inline]
    fn brk(&self) -> usize {
        self.brk
    }

    fn bytes(&self) -> &[u8] {
        match self.base {
            // SAFETY: `0..brk` is committed read-write memory that only this
            // region hands out, and `&self` keeps it from being mutated.
            Some(base) => unsafe { slice::from_raw_parts(base.as_ptr(), self.brk) },
            None => &[],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self.base {
            // SAFETY: same as `bytes`, and `&mut self` makes the borrow unique.
            Some(base) => unsafe { slice::from_raw_parts_mut(base.as_ptr(), self.brk) },
            None => &mut [],
        }
    }
}

impl Drop for SystemRegion {
    fn drop(&mut self) {
        if let Some(base) = self.base.take() {
            // SAFETY: `base` was reserved with exactly `reserve` bytes and no
            // slice into it can outlive `self`.
            unsafe { Kernel::release(base, self.reserve) };
        }
    }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, mprotect, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Inaccessible until committed.
            const PROT: c_int = libc::PROT_NONE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            let addr = unsafe { mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) };

            if addr == libc::MAP_FAILED {
                return None;
            }

            NonNull::new(addr.cast::<u8>())
        }

        unsafe fn commit(addr: NonNull<u8>, len: usize) -> bool {
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;

            unsafe { mprotect(addr.as_ptr().cast::<c_void>(), len as size_t, PROT) == 0 }
        }

        unsafe fn release(addr: NonNull<u8>, len: usize) {
            unsafe {
                munmap(addr.as_ptr().cast::<c_void>(), len as size_t);
            }
        }

        fn page_size() -> usize {
            // SAFETY: sysconf only reads a system constant.
            unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{ffi::c_void, mem::MaybeUninit, ptr::NonNull};

    use super::{Kernel, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let addr =
                    Memory::VirtualAlloc(None, len, Memory::MEM_RESERVE, Memory::PAGE_NOACCESS);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn commit(addr: NonNull<u8>, len: usize) -> bool {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            unsafe {
                let addr = Memory::VirtualAlloc(
                    Some(addr.as_ptr().cast_const().cast::<c_void>()),
                    len,
                    Memory::MEM_COMMIT,
                    protection,
                );

                !addr.is_null()
            }
        }

        unsafe fn release(addr: NonNull<u8>, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE);
            }
        }

        fn page_size() -> usize {
            // SAFETY: GetSystemInfo fills the whole struct before we read it.
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
