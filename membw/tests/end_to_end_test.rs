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

//! Runs the full measurement path the way the driver does.

use googletest::prelude::*;
use membw::{
    AlignedBuffer, BenchmarkConfig, DEFAULT_BUFFER_SIZE, Kernel, OutputFormat, format_result,
    measure, measure_parallel, timer,
};

/// Loose plausibility bounds for any real machine's memory bandwidth.
const MIN_PLAUSIBLE_GIB_PER_SEC: f64 = 0.1;
const MAX_PLAUSIBLE_GIB_PER_SEC: f64 = 1000.0;

fn run_store_loop(size: usize) -> String {
    timer::init().unwrap();
    let mut buffer = AlignedBuffer::new(size).unwrap();
    buffer.prefault(0xFF);

    let result = measure(Kernel::StoreLoop, &mut buffer, &BenchmarkConfig::default()).unwrap();

    assert_that!(result.bandwidth, gt(MIN_PLAUSIBLE_GIB_PER_SEC));
    assert_that!(result.bandwidth, lt(MAX_PLAUSIBLE_GIB_PER_SEC));
    format_result(&result, OutputFormat::Human)
}

fn parse_bandwidth(line: &str) -> f64 {
    let (name, rest) = line.split_once(':').unwrap();
    assert_that!(name.trim(), eq("memory_store_loop"));
    rest.trim().strip_suffix("GiB/s").unwrap().trim().parse().unwrap()
}

#[googletest::test]
fn test_store_loop_reports_one_plausible_line() {
    let line = run_store_loop(64 * 1024 * 1024);

    assert_that!(line, ends_with(" GiB/s"));
    assert_that!(line.lines().count(), eq(1));
    assert_that!(parse_bandwidth(&line), gt(0.0));
}

#[googletest::test]
#[ignore = "allocates and streams over 1 GiB"]
fn test_store_loop_full_size() {
    let line = run_store_loop(DEFAULT_BUFFER_SIZE);

    assert_that!(parse_bandwidth(&line), gt(0.0));
}

#[googletest::test]
fn test_parallel_pass_over_available_kernels() {
    timer::init().unwrap();
    let workers = 4;
    let mut buffer = AlignedBuffer::new(4 * 1024 * 1024).unwrap();
    buffer.prefault(0xFF);
    let config = BenchmarkConfig { samples: 2, runs: 2 };

    for kernel in Kernel::available() {
        let result = measure_parallel(kernel, &mut buffer, workers, &config).unwrap();
        let line = format_result(&result, OutputFormat::Human);

        expect_that!(line, contains_substring(format!("{}_par:", kernel)));
        expect_that!(result.bandwidth, gt(0.0));
    }
}
