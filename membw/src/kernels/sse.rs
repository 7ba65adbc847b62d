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

//! 128-bit kernels.
//!
//! Safety contract shared by every function in this module: the CPU supports
//! SSE4.1, `ptr` is 16-byte aligned and valid for `len` bytes, and `len` is a
//! multiple of 16.

use core::arch::x86_64::{
    __m128i, _mm_add_epi16, _mm_load_si128, _mm_set1_epi32, _mm_set1_epi64x, _mm_setzero_si128,
    _mm_sfence, _mm_store_si128, _mm_stream_si128, _mm_testz_si128, _mm_xor_si128,
};

use super::{STORE_PATTERN, guard};
use crate::POISON;

const LANES: usize = size_of::<__m128i>();

#[target_feature(enable = "sse4.1")]
pub(super) unsafe fn store(ptr: *mut u8, len: usize) {
    let vptr = ptr.cast::<__m128i>();
    let vals = _mm_set1_epi64x(STORE_PATTERN as i64);
    for i in 0..len / LANES {
        unsafe { _mm_store_si128(vptr.add(i), vals) };
    }
}

#[target_feature(enable = "sse4.1")]
pub(super) unsafe fn store_nontemporal(ptr: *mut u8, len: usize) {
    let vptr = ptr.cast::<__m128i>();
    let vals = _mm_set1_epi64x(STORE_PATTERN as i64);
    for i in 0..len / LANES {
        unsafe { _mm_stream_si128(vptr.add(i), vals) };
    }
    // Streaming stores are weakly ordered; make them visible before returning.
    _mm_sfence();
}

#[target_feature(enable = "sse4.1")]
pub(super) unsafe fn load(ptr: *const u8, len: usize) {
    let vptr = ptr.cast::<__m128i>();
    let mut accum = _mm_setzero_si128();
    for i in 0..len / LANES {
        accum = _mm_add_epi16(unsafe { _mm_load_si128(vptr.add(i)) }, accum);
    }

    let diff = _mm_xor_si128(accum, _mm_set1_epi32(POISON as i32));
    guard("memory_load_sse", _mm_testz_si128(diff, diff) == 1);
}
