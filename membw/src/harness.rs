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

//! Single-threaded measurement.
//!
//! A trial set is `samples` samples; a sample is `runs` back-to-back kernel
//! invocations over the whole region, timed as one span. The fastest sample
//! is reported: scheduler and interrupt noise only ever makes a sample
//! slower, so the minimum is the closest observation of what the memory
//! system can sustain.

use crate::{
    AlignedBuffer, BYTES_PER_GIB, BenchmarkError, BenchmarkResult, DEFAULT_RUNS, DEFAULT_SAMPLES,
    Kernel, Mode,
    timer::{self, MonotonicClock},
};

/// Sampling protocol parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Number of independently timed samples per kernel.
    pub samples: usize,
    /// Number of kernel invocations inside one sample.
    pub runs: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self { samples: DEFAULT_SAMPLES, runs: DEFAULT_RUNS }
    }
}

impl BenchmarkConfig {
    pub fn validate(&self) -> Result<(), BenchmarkError> {
        if self.samples == 0 {
            return Err(BenchmarkError::InvalidConfig("samples must be at least 1"));
        }
        if self.runs == 0 {
            return Err(BenchmarkError::InvalidConfig("runs must be at least 1"));
        }
        Ok(())
    }

    /// Bytes moved by one sample over a region of `size` bytes.
    pub fn bytes_per_sample(&self, size: usize) -> u64 {
        self.runs as u64 * size as u64
    }
}

/// Bandwidth in GiB/s of moving `bytes` in `secs` seconds.
pub fn compute_bw(bytes: u64, secs: f64) -> f64 {
    (bytes as f64 / BYTES_PER_GIB as f64) / secs
}

/// The shortest of a set of sample durations, or `None` if there are none.
pub fn min_duration(durations: impl IntoIterator<Item = f64>) -> Option<f64> {
    durations.into_iter().reduce(f64::min)
}

/// Measure `kernel` over `buffer` with the process-wide clock.
pub fn measure(
    kernel: Kernel,
    buffer: &mut AlignedBuffer,
    config: &BenchmarkConfig,
) -> Result<BenchmarkResult, BenchmarkError> {
    let clock = timer::init()?;
    measure_with(clock, kernel, buffer.as_mut_slice(), config)
}

/// Measure `kernel` over `region` with the given clock.
pub fn measure_with<C: MonotonicClock>(
    clock: &C,
    kernel: Kernel,
    region: &mut [u8],
    config: &BenchmarkConfig,
) -> Result<BenchmarkResult, BenchmarkError> {
    config.validate()?;

    let durations = (0..config.samples).map(|sample| {
        let before = clock.now();
        for _ in 0..config.runs {
            kernel.run(region);
        }
        let after = clock.now();

        let duration = after - before;
        log::debug!("{} sample {}: {:.6} s", kernel, sample, duration);
        duration
    });
    // `validate` guarantees at least one sample.
    let min = min_duration(durations).ok_or(BenchmarkError::InvalidConfig("no samples taken"))?;

    let result =
        BenchmarkResult::new(kernel, Mode::Sequential, config.bytes_per_sample(region.len()), min);
    log::info!("{}: {:.2} GiB/s", kernel, result.bandwidth);
    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use googletest::prelude::*;

    use super::*;

    /// A clock that replays a fixed list of readings.
    pub(crate) struct ScriptedClock {
        readings: Mutex<std::vec::IntoIter<f64>>,
    }

    impl ScriptedClock {
        /// A clock whose consecutive (start, end) reading pairs are `durations`
        /// apart.
        pub(crate) fn from_durations(durations: &[f64]) -> Self {
            let mut readings = Vec::new();
            let mut t = 100.0;
            for duration in durations {
                readings.push(t);
                readings.push(t + duration);
                t += duration + 1.0;
            }
            Self { readings: Mutex::new(readings.into_iter()) }
        }
    }

    impl MonotonicClock for ScriptedClock {
        fn now(&self) -> f64 {
            self.readings.lock().unwrap().next().expect("clock read more often than scripted")
        }
    }

    #[googletest::test]
    fn test_compute_bw() {
        assert_that!(compute_bw(BYTES_PER_GIB, 1.0), eq(1.0));
        assert_that!(compute_bw(5 * BYTES_PER_GIB, 2.0), eq(2.5));
        assert_that!(compute_bw(3 * BYTES_PER_GIB / 2, 0.5), eq(3.0));
    }

    #[googletest::test]
    fn test_compute_bw_matches_formula() {
        for (bytes, secs) in [(1u64, 1e-9), (4096, 0.25), (123_456_789, 3.7), (1 << 40, 11.0)] {
            assert_that!(
                compute_bw(bytes, secs),
                eq((bytes as f64 / BYTES_PER_GIB as f64) / secs)
            );
        }
    }

    #[googletest::test]
    fn test_min_duration_selects_shortest_sample() {
        assert_that!(min_duration([5.0, 3.0, 4.0, 3.0, 6.0]), some(eq(3.0)));
    }

    #[googletest::test]
    fn test_min_duration_of_nothing() {
        assert_that!(min_duration(Vec::<f64>::new()), none());
    }

    #[googletest::test]
    fn test_measure_reports_fastest_sample() {
        let clock = ScriptedClock::from_durations(&[5.0, 3.0, 4.0, 3.0, 6.0]);
        let mut buffer = AlignedBuffer::new(1024).unwrap();
        let config = BenchmarkConfig::default();

        let result =
            measure_with(&clock, Kernel::StoreLoop, buffer.as_mut_slice(), &config).unwrap();

        assert_that!(result.min_duration, near(3.0, 1e-9));
        assert_that!(result.bytes_per_sample, eq(5 * 1024));
        assert_that!(result.bandwidth, near(compute_bw(5 * 1024, 3.0), 1e-15));
        assert_that!(result.mode, eq(Mode::Sequential));
    }

    #[googletest::test]
    fn test_measure_with_real_clock() {
        let mut buffer = AlignedBuffer::new(1 << 20).unwrap();
        buffer.prefault(0xFF);
        let config = BenchmarkConfig { samples: 3, runs: 2 };

        let result = measure(Kernel::LoadLoop, &mut buffer, &config).unwrap();

        assert_that!(result.kernel, eq(Kernel::LoadLoop));
        assert_that!(result.min_duration, gt(0.0));
        assert_that!(result.bandwidth, gt(0.0));
    }

    #[googletest::test]
    fn test_zero_samples_rejected() {
        let mut buffer = AlignedBuffer::new(64).unwrap();
        let config = BenchmarkConfig { samples: 0, runs: 5 };

        assert_that!(measure(Kernel::StoreLoop, &mut buffer, &config), err(anything()));
    }

    #[googletest::test]
    fn test_zero_runs_rejected() {
        let config = BenchmarkConfig { samples: 5, runs: 0 };

        assert_that!(
            config.validate(),
            err(eq(&BenchmarkError::InvalidConfig("runs must be at least 1")))
        );
    }
}
