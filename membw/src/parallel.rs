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

//! Multi-worker measurement.
//!
//! The region is split into one equal chunk per worker. Workers are spawned
//! once per trial set and each sample is bracketed by two barriers: worker 0
//! reads the clock right after the start barrier releases and again after
//! every worker has reached the end barrier, so the span covers the slowest
//! worker.
//!
//! Bandwidth is accounted as `runs * region size` per sample, the same as the
//! single-threaded harness, since every worker runs all `runs` invocations on
//! its own chunk concurrently.

use std::{
    num::NonZeroUsize,
    ops::Range,
    panic::{self, AssertUnwindSafe},
    process,
    sync::Barrier,
    thread,
};

use crate::{
    AlignedBuffer, BenchmarkError, BenchmarkResult, Kernel, Mode,
    harness::{BenchmarkConfig, min_duration},
    timer::{self, MonotonicClock},
};

/// Number of workers to use when none is requested: one per available CPU.
pub fn available_workers() -> usize {
    thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Split `[0, size)` into `workers` equal, contiguous, disjoint ranges.
pub fn partition(size: usize, workers: usize) -> Result<Vec<Range<usize>>, BenchmarkError> {
    if workers == 0 || size % workers != 0 {
        return Err(BenchmarkError::UnevenPartition { size, workers });
    }
    let chunk_size = size / workers;
    Ok((0..workers).map(|index| index * chunk_size..(index + 1) * chunk_size).collect())
}

/// Measure `kernel` on `workers` threads over `buffer` with the process-wide
/// clock.
pub fn measure_parallel(
    kernel: Kernel,
    buffer: &mut AlignedBuffer,
    workers: usize,
    config: &BenchmarkConfig,
) -> Result<BenchmarkResult, BenchmarkError> {
    let clock = timer::init()?;
    measure_parallel_with(clock, kernel, buffer.as_mut_slice(), workers, config)
}

/// Measure `kernel` on `workers` threads over `region` with the given clock.
///
/// # Panics
///
/// Panics before any thread is started if `region` cannot be split into
/// `workers` equal chunks sized in multiples of the kernel's element width.
/// A failing kernel in any worker aborts the process, as the remaining workers
/// would otherwise wait at a barrier forever.
pub fn measure_parallel_with<C: MonotonicClock>(
    clock: &C,
    kernel: Kernel,
    region: &mut [u8],
    workers: usize,
    config: &BenchmarkConfig,
) -> Result<BenchmarkResult, BenchmarkError> {
    config.validate()?;
    if region.is_empty() {
        return Err(BenchmarkError::InvalidBufferSize(0));
    }
    let size = region.len();
    let chunk_size = match partition(size, workers) {
        Ok(chunks) if chunks[0].len() % kernel.element_width() == 0 => chunks[0].len(),
        _ => panic!("{}: {}", kernel, BenchmarkError::UnevenPartition { size, workers }),
    };
    log::debug!("{}: {} workers, {} byte chunks", kernel, workers, chunk_size);

    let start = Barrier::new(workers);
    let end = Barrier::new(workers);

    let durations = thread::scope(|scope| {
        let handles: Vec<_> = region
            .chunks_exact_mut(chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                let (start, end) = (&start, &end);
                scope.spawn(move || {
                    let work = move || {
                        let mut durations = Vec::with_capacity(config.samples);
                        for _ in 0..config.samples {
                            start.wait();
                            let before = (index == 0).then(|| clock.now());
                            for _ in 0..config.runs {
                                kernel.run(chunk);
                            }
                            end.wait();
                            if let Some(before) = before {
                                durations.push(clock.now() - before);
                            }
                        }
                        durations
                    };
                    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
                        log::error!("{}: worker {} failed, aborting", kernel, index);
                        process::abort()
                    })
                })
            })
            .collect();

        // Only the designated worker records durations; the others return none.
        handles
            .into_iter()
            .flat_map(|handle| {
                handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload))
            })
            .collect::<Vec<f64>>()
    });

    for (sample, duration) in durations.iter().enumerate() {
        log::debug!("{} sample {}: {:.6} s", kernel, sample, duration);
    }
    let min = min_duration(durations).ok_or(BenchmarkError::InvalidConfig("no samples taken"))?;

    let result = BenchmarkResult::new(
        kernel,
        Mode::Parallel { workers },
        config.bytes_per_sample(size),
        min,
    );
    log::info!("{} ({} workers): {:.2} GiB/s", kernel, workers, result.bandwidth);
    Ok(result)
}
