// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::errors::MapError;
use libc::{c_void, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE};
use nix::errno::Errno;
use std::ptr;

/// Anonymous memory mapped straight from the kernel.
///
/// The general purpose allocator may be corrupted when a process crashes, so memory needed after
/// a crash (stacks for cloned processes, signal stacks) comes from `mmap` instead. Both `mmap` and
/// `munmap` are plain syscalls and may be used from a signal handler.
pub struct PageBuffer {
    mapping: *mut c_void,
    mapping_len: usize,
    guard_len: usize,
}

// SAFETY: the buffer exclusively owns its mapping.
unsafe impl Send for PageBuffer {}

impl PageBuffer {
    /// Maps at least `size` readable and writable bytes, rounded up to whole pages.
    pub fn new(size: usize) -> Result<Self, MapError> {
        Self::map(size, false)
    }

    /// Like [`PageBuffer::new`], with an additional inaccessible page below the usable region so
    /// that a stack running off its end faults instead of silently corrupting adjacent memory.
    pub fn with_guard_page(size: usize) -> Result<Self, MapError> {
        Self::map(size, true)
    }

    fn map(size: usize, guard: bool) -> Result<Self, MapError> {
        if size == 0 {
            return Err(MapError::EmptyRegion);
        }
        let page_size = page_size::get();
        let usable = size.div_ceil(page_size) * page_size;
        let guard_len = if guard { page_size } else { 0 };
        let mapping_len = usable + guard_len;

        // SAFETY: anonymous private mapping, no file or fixed address involved.
        let mapping = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapping_len,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANON,
                -1,
                0,
            )
        };
        if mapping == MAP_FAILED {
            return Err(MapError::MapFailed {
                size: mapping_len,
                errno: Errno::last(),
            });
        }

        let buffer = Self {
            mapping,
            mapping_len,
            guard_len,
        };
        if guard {
            // SAFETY: the first page belongs to the mapping we just created.
            let rval = unsafe { libc::mprotect(mapping, page_size, PROT_NONE) };
            if rval != 0 {
                return Err(MapError::ProtectFailed(Errno::last()));
            }
        }
        Ok(buffer)
    }

    /// Usable length in bytes (excludes the guard page).
    pub fn len(&self) -> usize {
        self.mapping_len - self.guard_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of the usable region.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        // SAFETY: `guard_len` is within the mapping.
        unsafe { self.mapping.cast::<u8>().add(self.guard_len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len();
        // SAFETY: the usable region is mapped read/write and exclusively owned by `self`.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), len) }
    }

    /// Gives up ownership of the mapping, which then stays mapped for the rest of the process.
    /// Returns the start and length of the usable region.
    pub fn leak(mut self) -> (*mut u8, usize) {
        let region = (self.as_mut_ptr(), self.len());
        std::mem::forget(self);
        region
    }
}

impl Drop for PageBuffer {
    fn drop(&mut self) {
        // SAFETY: we own the mapping and nothing borrows from it once `self` is dropped.
        let _ = unsafe { libc::munmap(self.mapping, self.mapping_len) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_up_to_pages() {
        let page_size = page_size::get();
        let mut buffer = PageBuffer::new(1).unwrap();
        assert_eq!(buffer.len(), page_size);
        let slice = buffer.as_mut_slice();
        slice[0] = 0xaa;
        slice[page_size - 1] = 0xbb;
        assert_eq!(slice[0], 0xaa);
        assert_eq!(slice[page_size - 1], 0xbb);
    }

    #[test]
    fn test_guard_page_is_excluded() {
        let page_size = page_size::get();
        let mut buffer = PageBuffer::with_guard_page(3 * page_size).unwrap();
        assert_eq!(buffer.len(), 3 * page_size);
        // The usable region starts one page past the mapping.
        let start = buffer.as_mut_ptr() as usize;
        assert_eq!(start - buffer.mapping as usize, page_size);
        buffer.as_mut_slice().fill(1);
    }

    #[test]
    fn test_empty_region_is_rejected() {
        assert!(matches!(PageBuffer::new(0), Err(MapError::EmptyRegion)));
    }
}
