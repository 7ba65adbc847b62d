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

//! 256-bit kernels.
//!
//! Safety contract shared by every function in this module: the CPU supports
//! AVX, `ptr` is 32-byte aligned and valid for `len` bytes, and `len` is a
//! multiple of 32.
//!
//! The loads accumulate as packed single precision floats because integer
//! adds on 256-bit registers need AVX2.

use core::arch::x86_64::{
    __m256, __m256i, _MM_HINT_NTA, _mm_prefetch, _mm_sfence, _mm256_add_ps, _mm256_castps_si256,
    _mm256_castsi256_ps, _mm256_load_ps, _mm256_set1_epi32, _mm256_set1_epi64x,
    _mm256_setzero_ps, _mm256_store_si256, _mm256_stream_si256, _mm256_testz_si256,
    _mm256_xor_ps,
};

use super::{STORE_PATTERN, guard};
use crate::POISON;

const LANES: usize = size_of::<__m256i>();

/// How many vectors ahead of the current load the prefetch hint points.
const PREFETCH_DISTANCE: usize = 2;

#[target_feature(enable = "avx")]
pub(super) unsafe fn store(ptr: *mut u8, len: usize) {
    let vptr = ptr.cast::<__m256i>();
    let vals = _mm256_set1_epi64x(STORE_PATTERN as i64);
    for i in 0..len / LANES {
        unsafe { _mm256_store_si256(vptr.add(i), vals) };
    }
}

#[target_feature(enable = "avx")]
pub(super) unsafe fn store_nontemporal(ptr: *mut u8, len: usize) {
    let vptr = ptr.cast::<__m256i>();
    let vals = _mm256_set1_epi64x(STORE_PATTERN as i64);
    for i in 0..len / LANES {
        unsafe { _mm256_stream_si256(vptr.add(i), vals) };
    }
    // Streaming stores are weakly ordered; make them visible before returning.
    _mm_sfence();
}

#[target_feature(enable = "avx")]
pub(super) unsafe fn load(ptr: *const u8, len: usize) {
    let mut accum = _mm256_setzero_ps();
    for i in 0..len / LANES {
        let vals = unsafe { _mm256_load_ps(ptr.add(i * LANES).cast::<f32>()) };
        accum = _mm256_add_ps(vals, accum);
    }
    guard("memory_load_avx", is_poisoned(accum));
}

/// Same as [`load`], but hints the line `PREFETCH_DISTANCE` vectors ahead as
/// non-temporal, the recommended pattern for single pass streaming reads.
#[target_feature(enable = "avx")]
pub(super) unsafe fn load_prefetch(ptr: *const u8, len: usize) {
    let mut accum = _mm256_setzero_ps();
    for i in 0..len / LANES {
        // Hints past the end of the region land in the buffer's slack page or
        // the next worker's chunk, and prefetches never fault.
        let ahead = ptr.wrapping_add((i + PREFETCH_DISTANCE) * LANES);
        _mm_prefetch::<_MM_HINT_NTA>(ahead.cast::<i8>());
        let vals = unsafe { _mm256_load_ps(ptr.add(i * LANES).cast::<f32>()) };
        accum = _mm256_add_ps(vals, accum);
    }
    guard("memory_load_prefetch_avx", is_poisoned(accum));
}

#[target_feature(enable = "avx")]
unsafe fn is_poisoned(accum: __m256) -> bool {
    let poison = _mm256_castsi256_ps(_mm256_set1_epi32(POISON as i32));
    let diff = _mm256_castps_si256(_mm256_xor_ps(accum, poison));
    _mm256_testz_si256(diff, diff) == 1
}
