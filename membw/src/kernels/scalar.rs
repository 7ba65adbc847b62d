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

//! Portable kernels: the library fill and the word-at-a-time loops.

use zerocopy::FromBytes;

use super::{MEMSET_BYTE, STORE_PATTERN, guard};
use crate::POISON;

pub(super) fn store_memset(region: &mut [u8]) {
    region.fill(MEMSET_BYTE);
}

pub(super) fn store_loop(region: &mut [u8]) {
    let words = <[u64]>::mut_from_bytes(region).expect("region must be u64 aligned and sized");
    for word in words.iter_mut() {
        *word = STORE_PATTERN;
    }
}

pub(super) fn load_loop(region: &[u8]) {
    let words = <[u64]>::ref_from_bytes(region).expect("region must be u64 aligned and sized");
    let mut sum = 0u64;
    for word in words {
        sum = sum.wrapping_add(*word);
    }
    guard("memory_load_loop", sum == POISON as u64);
}
