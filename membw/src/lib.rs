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

//! Sequential memory bandwidth measurement.
//!
//! This crate measures the best sustained bandwidth of streaming stores and
//! loads over a large buffer, one kernel (memory access strategy) at a time,
//! either on a single thread or split across a fixed pool of workers.
//!
//! # Organization
//!
//! - `buffer`: the aligned, driver-owned buffer the kernels run over
//! - `kernels`: the closed set of access strategies and the capability
//!   registry that selects the ones this CPU can run
//! - `timer`: the monotonic clock (OS clock or calibrated cycle counter)
//! - `harness`: the single-threaded sampling protocol
//! - `parallel`: the barrier-synchronised multi-worker variant
//! - `report`: human and JSON formatting of results

pub mod buffer;
pub mod harness;
pub mod kernels;
pub mod parallel;
pub mod report;
pub mod timer;

// Re-exports for convenience.
pub use buffer::AlignedBuffer;
pub use harness::{BenchmarkConfig, compute_bw, measure, measure_with, min_duration};
pub use kernels::{AccessKind, CpuFeature, Kernel};
pub use parallel::{available_workers, measure_parallel, measure_parallel_with, partition};
pub use report::{OutputFormat, format_result};
pub use timer::{ClockSource, MonotonicClock};

/// Number of bytes in a gibibyte, the unit bandwidth is reported in.
pub const BYTES_PER_GIB: u64 = 1 << 30;

/// Size of the trailing slack page behind every buffer.
pub const PAGE_SIZE: usize = 1 << 12;

/// Alignment of every buffer, the widest vector width of any kernel.
pub const BUFFER_ALIGNMENT: usize = 32;

/// Default size of the measured region (1 GiB).
pub const DEFAULT_BUFFER_SIZE: usize = BYTES_PER_GIB as usize;

/// Default number of samples per trial set.
pub const DEFAULT_SAMPLES: usize = 5;

/// Default number of back-to-back kernel invocations per sample.
pub const DEFAULT_RUNS: usize = 5;

/// Value a load kernel's accumulator must never end up equal to.
///
/// Load kernels fold everything they read into an accumulator and check it
/// against this sentinel, so the optimizer cannot drop the loads.
pub const POISON: u32 = 0xdead_beef;

/// Execution mode of a trial set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The kernel ran on the calling thread over the whole buffer.
    Sequential,
    /// The kernel ran concurrently on `workers` disjoint chunks.
    Parallel { workers: usize },
}

/// Result of one trial set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkResult {
    /// Kernel that was measured.
    pub kernel: Kernel,
    /// How the kernel was executed.
    pub mode: Mode,
    /// Bytes moved by one sample (all runs, all workers).
    pub bytes_per_sample: u64,
    /// Duration of the fastest sample in seconds.
    pub min_duration: f64,
    /// Bandwidth of the fastest sample in GiB/s.
    pub bandwidth: f64,
}

impl BenchmarkResult {
    /// Create a new benchmark result from the fastest sample of a trial set.
    pub fn new(kernel: Kernel, mode: Mode, bytes_per_sample: u64, min_duration: f64) -> Self {
        Self {
            kernel,
            mode,
            bytes_per_sample,
            min_duration,
            bandwidth: compute_bw(bytes_per_sample, min_duration),
        }
    }
}

/// Errors for benchmark setup.
///
/// All of these are detected before any timed work starts. Failures inside a
/// timed region (a tripped load guard, a kernel precondition violation) are
/// fatal and panic instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchmarkError {
    /// Buffer size is zero or not a multiple of [`BUFFER_ALIGNMENT`].
    InvalidBufferSize(usize),
    /// The allocator could not provide the buffer.
    AllocationFailed(usize),
    /// Sample or run count is zero.
    InvalidConfig(&'static str),
    /// The buffer cannot be split evenly across the workers.
    UnevenPartition { size: usize, workers: usize },
    /// No monotonic clock could be read.
    ClockUnavailable(String),
}

impl std::fmt::Display for BenchmarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchmarkError::InvalidBufferSize(size) => write!(
                f,
                "buffer size {} must be a non-zero multiple of {} bytes",
                size, BUFFER_ALIGNMENT
            ),
            BenchmarkError::AllocationFailed(size) => {
                write!(f, "couldn't allocate a {} byte buffer", size)
            }
            BenchmarkError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            BenchmarkError::UnevenPartition { size, workers } => write!(
                f,
                "buffer size {} is not divisible into {} equal worker chunks",
                size, workers
            ),
            BenchmarkError::ClockUnavailable(reason) => {
                write!(f, "monotonic clock unavailable: {}", reason)
            }
        }
    }
}

impl std::error::Error for BenchmarkError {}
