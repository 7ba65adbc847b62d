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

//! Behavioural checks run against every kernel this CPU supports.

use googletest::prelude::*;
use membw::{AccessKind, AlignedBuffer, Kernel};

const REGION_SIZE: usize = 64 * 1024;

fn kernels(kind: AccessKind) -> Vec<Kernel> {
    Kernel::available().into_iter().filter(|kernel| kernel.access_kind() == kind).collect()
}

#[googletest::test]
fn test_store_kernels_overwrite_every_byte() {
    for kernel in kernels(AccessKind::Store) {
        let mut buffer = AlignedBuffer::new(REGION_SIZE).unwrap();

        kernel.run(buffer.as_mut_slice());

        let zeros = buffer.as_slice().iter().filter(|&&b| b == 0).count();
        expect_that!(zeros, eq(0), "{} left zero bytes behind", kernel);
    }
}

#[googletest::test]
fn test_store_kernels_leave_slack_untouched() {
    for kernel in kernels(AccessKind::Store) {
        let mut buffer = AlignedBuffer::new(REGION_SIZE).unwrap();
        let (head, tail) = buffer.as_mut_slice().split_at_mut(REGION_SIZE / 2);

        kernel.run(head);

        expect_that!(tail.iter().all(|&b| b == 0), eq(true), "{} wrote past its region", kernel);
    }
}

#[googletest::test]
fn test_store_kernels_on_smallest_region() {
    for kernel in kernels(AccessKind::Store) {
        let mut buffer = AlignedBuffer::new(membw::BUFFER_ALIGNMENT).unwrap();

        kernel.run(&mut buffer.as_mut_slice()[..kernel.element_width()]);

        expect_that!(buffer.as_slice()[0], ne(0), "{}", kernel);
    }
}

#[googletest::test]
fn test_load_kernels_pass_guard_on_all_ones() {
    for kernel in kernels(AccessKind::Load) {
        let mut buffer = AlignedBuffer::new(REGION_SIZE).unwrap();
        buffer.prefault(0xFF);

        // Panics if the accumulator matched the poison sentinel.
        kernel.run(buffer.as_mut_slice());

        expect_that!(buffer.as_slice().iter().all(|&b| b == 0xFF), eq(true), "{}", kernel);
    }
}

#[googletest::test]
fn test_load_kernels_pass_guard_on_zeros() {
    for kernel in kernels(AccessKind::Load) {
        let mut buffer = AlignedBuffer::new(REGION_SIZE).unwrap();

        kernel.run(buffer.as_mut_slice());
    }
}

#[googletest::test]
fn test_load_kernels_read_store_output() {
    for store in kernels(AccessKind::Store) {
        let mut buffer = AlignedBuffer::new(REGION_SIZE).unwrap();
        store.run(buffer.as_mut_slice());

        for load in kernels(AccessKind::Load) {
            load.run(buffer.as_mut_slice());
        }
    }
}

#[googletest::test]
fn test_kernels_are_repeatable() {
    for kernel in Kernel::available() {
        let mut buffer = AlignedBuffer::new(REGION_SIZE).unwrap();
        buffer.prefault(0xFF);

        kernel.run(buffer.as_mut_slice());
        let first = buffer.as_slice().to_vec();
        kernel.run(buffer.as_mut_slice());

        expect_that!(buffer.as_slice() == first.as_slice(), eq(true), "{}", kernel);
    }
}
