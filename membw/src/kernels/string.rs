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

//! Block-move kernels built on the x86 string instructions.
//!
//! The direction flag is guaranteed clear on entry to inline assembly, so
//! both kernels walk the region upwards without an explicit `cld`.

use core::arch::asm;

use super::STORE_PATTERN;

/// Store the pattern over `len` bytes with `rep stosq`.
///
/// # Safety
///
/// `ptr` must be valid for writes of `len` bytes, 8-byte aligned, and `len`
/// must be a multiple of 8.
pub(super) unsafe fn rep_stosq(ptr: *mut u8, len: usize) {
    unsafe {
        asm!(
            "rep stosq",
            inout("rcx") len / 8 => _,
            inout("rdi") ptr => _,
            in("rax") STORE_PATTERN,
            options(nostack, preserves_flags)
        );
    }
}

/// Load every quadword of `len` bytes with `rep lodsq`.
///
/// The loaded values are discarded. The assembly block is opaque to the
/// compiler, so unlike the loop kernels it needs no accumulator guard.
///
/// # Safety
///
/// `ptr` must be valid for reads of `len` bytes, 8-byte aligned, and `len`
/// must be a multiple of 8.
pub(super) unsafe fn rep_lodsq(ptr: *const u8, len: usize) {
    unsafe {
        asm!(
            "rep lodsq",
            inout("rcx") len / 8 => _,
            inout("rsi") ptr => _,
            out("rax") _,
            options(nostack, readonly, preserves_flags)
        );
    }
}
