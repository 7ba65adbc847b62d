//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Aligned benchmark buffer.

use std::{
    alloc::{Layout, alloc_zeroed, dealloc},
    ptr::NonNull,
};

use crate::{BUFFER_ALIGNMENT, BenchmarkError, PAGE_SIZE};

/// A contiguous, 32-byte aligned region of `size` bytes followed by one page
/// of slack.
///
/// Only the first `size` bytes are ever handed out. The slack page keeps the
/// prefetching kernels, which hint a couple of elements past the current one,
/// inside the allocation.
#[derive(Debug)]
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    size: usize,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate a zeroed buffer of `size` bytes plus the slack page.
    ///
    /// The memory is requested zeroed so the OS can hand out lazily mapped
    /// pages; call [`AlignedBuffer::prefault`] before timing anything.
    pub fn new(size: usize) -> Result<Self, BenchmarkError> {
        if size == 0 || size % BUFFER_ALIGNMENT != 0 {
            return Err(BenchmarkError::InvalidBufferSize(size));
        }
        let total = size.checked_add(PAGE_SIZE).ok_or(BenchmarkError::AllocationFailed(size))?;
        let layout = Layout::from_size_align(total, BUFFER_ALIGNMENT)
            .map_err(|_| BenchmarkError::AllocationFailed(size))?;

        // Safety: the layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(BenchmarkError::AllocationFailed(size))?;

        log::debug!("allocated {} byte buffer at {:p}", total, ptr);
        Ok(Self { ptr, size, layout })
    }

    /// Size of the measured region in bytes, excluding the slack page.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fill the measured region with `byte` and clear the start of the slack
    /// page, touching every page so no page fault lands in a timed sample.
    pub fn prefault(&mut self, byte: u8) {
        self.as_mut_slice().fill(byte);
        // Safety: the slack page is part of the allocation and at least 8 bytes
        // long; the offset `size` is a multiple of the buffer alignment.
        unsafe { self.ptr.as_ptr().add(self.size).cast::<u64>().write(0) };
    }

    pub fn as_slice(&self) -> &[u8] {
        // Safety: `ptr` is valid for `size` initialized bytes for the lifetime of
        // `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // Safety: `ptr` was allocated with exactly this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// Safety: the buffer uniquely owns its allocation, like a `Box<[u8]>`.
unsafe impl Send for AlignedBuffer {}
// Safety: shared access only hands out `&[u8]`.
unsafe impl Sync for AlignedBuffer {}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[googletest::test]
    fn test_buffer_is_aligned_and_sized() {
        let buffer = AlignedBuffer::new(4096).unwrap();

        assert_that!(buffer.size(), eq(4096));
        assert_that!(buffer.as_slice().len(), eq(4096));
        assert_that!(buffer.as_slice().as_ptr() as usize % BUFFER_ALIGNMENT, eq(0));
    }

    #[googletest::test]
    fn test_new_buffer_is_zeroed() {
        let buffer = AlignedBuffer::new(1024).unwrap();

        assert_that!(buffer.as_slice().iter().all(|&b| b == 0), eq(true));
    }

    #[googletest::test]
    fn test_prefault_fills_region() {
        let mut buffer = AlignedBuffer::new(1024).unwrap();

        buffer.prefault(0xFF);

        assert_that!(buffer.as_slice().iter().all(|&b| b == 0xFF), eq(true));
    }

    #[googletest::test]
    fn test_rejects_zero_size() {
        assert_that!(AlignedBuffer::new(0), err(eq(&BenchmarkError::InvalidBufferSize(0))));
    }

    #[googletest::test]
    fn test_rejects_unaligned_size() {
        assert_that!(AlignedBuffer::new(1000), err(eq(&BenchmarkError::InvalidBufferSize(1000))));
    }
}
