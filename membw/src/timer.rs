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

//! Monotonic timing.
//!
//! Two backends are provided:
//!
//! - [`OsClock`]: the raw OS monotonic clock, read through `clock_gettime`.
//! - [`CycleCounter`]: the x86_64 time-stamp counter, converted to seconds
//!   with a frequency measured once against a sleep of
//!   [`CALIBRATION_INTERVAL`]. Any calibration error biases every reading.
//!
//! Unix targets use the OS clock; other x86_64 targets fall back to the cycle
//! counter. The chosen backend is set up by [`init`] and memoized for the
//! lifetime of the process.

use std::{sync::OnceLock, time::Duration};

use crate::BenchmarkError;

#[cfg(not(any(unix, target_arch = "x86_64")))]
compile_error!("no monotonic clock backend for this target");

/// How long the cycle counter is calibrated against.
pub const CALIBRATION_INTERVAL: Duration = Duration::from_secs(1);

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// A clock that never goes backwards and ignores wall-clock adjustments.
pub trait MonotonicClock: Sync {
    /// Seconds since an arbitrary, fixed origin.
    fn now(&self) -> f64;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const OS_CLOCK_ID: nix::time::ClockId = nix::time::ClockId::CLOCK_MONOTONIC_RAW;
#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
const OS_CLOCK_ID: nix::time::ClockId = nix::time::ClockId::CLOCK_MONOTONIC;

/// The OS monotonic clock. Uses the raw, NTP-unslewed clock where the OS has
/// one.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct OsClock;

#[cfg(unix)]
impl OsClock {
    pub fn read() -> nix::Result<f64> {
        let time = nix::time::clock_gettime(OS_CLOCK_ID)?;
        Ok(time.tv_sec() as f64 + time.tv_nsec() as f64 / NANOS_PER_SEC)
    }
}

#[cfg(unix)]
impl MonotonicClock for OsClock {
    fn now(&self) -> f64 {
        // Readability of the clock is checked when the clock source is set up.
        Self::read().expect("monotonic clock stopped being readable")
    }
}

/// Read the time-stamp counter.
///
/// `rdtscp` waits for all earlier instructions to retire and the trailing
/// `lfence` keeps later ones from starting before the read.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn read_tsc() -> u64 {
    use core::arch::x86_64::{__rdtscp, _mm_lfence};

    let mut aux = 0u32;
    // Safety: `rdtscp` and `lfence` are available on every x86_64 CPU this
    // benchmark targets and have no memory side effects.
    unsafe {
        let cycles = __rdtscp(&mut aux);
        _mm_lfence();
        cycles
    }
}

/// The time-stamp counter scaled by a calibrated frequency.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct CycleCounter {
    cycles_per_second: f64,
}

#[cfg(target_arch = "x86_64")]
impl CycleCounter {
    /// Measure the counter frequency by sampling it around a sleep of
    /// `interval`.
    pub fn calibrate(interval: Duration) -> Result<Self, BenchmarkError> {
        let before = read_tsc();
        std::thread::sleep(interval);
        let after = read_tsc();

        let cycles = after.saturating_sub(before);
        if cycles == 0 || interval.is_zero() {
            return Err(BenchmarkError::ClockUnavailable(
                "cycle counter did not advance during calibration".to_string(),
            ));
        }

        let cycles_per_second = cycles as f64 / interval.as_secs_f64();
        log::info!("calibrated cycle counter at {:.0} cycles/s", cycles_per_second);
        Ok(Self { cycles_per_second })
    }

    pub fn cycles_per_second(&self) -> f64 {
        self.cycles_per_second
    }
}

#[cfg(target_arch = "x86_64")]
impl MonotonicClock for CycleCounter {
    fn now(&self) -> f64 {
        read_tsc() as f64 / self.cycles_per_second
    }
}

/// The backend selected for this build.
#[derive(Debug, Clone, Copy)]
pub enum ClockSource {
    #[cfg(unix)]
    Os(OsClock),
    #[cfg(target_arch = "x86_64")]
    CycleCounter(CycleCounter),
}

impl ClockSource {
    /// Set up the backend for this build, calibrating it if needed.
    pub fn detect() -> Result<Self, BenchmarkError> {
        #[cfg(unix)]
        {
            OsClock::read().map_err(|err| BenchmarkError::ClockUnavailable(err.to_string()))?;
            Ok(ClockSource::Os(OsClock))
        }
        #[cfg(not(unix))]
        {
            CycleCounter::calibrate(CALIBRATION_INTERVAL).map(ClockSource::CycleCounter)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            ClockSource::Os(_) => "os monotonic clock",
            #[cfg(target_arch = "x86_64")]
            ClockSource::CycleCounter(_) => "calibrated cycle counter",
        }
    }
}

impl MonotonicClock for ClockSource {
    #[inline]
    fn now(&self) -> f64 {
        match self {
            #[cfg(unix)]
            ClockSource::Os(clock) => clock.now(),
            #[cfg(target_arch = "x86_64")]
            ClockSource::CycleCounter(clock) => clock.now(),
        }
    }
}

static CLOCK: OnceLock<ClockSource> = OnceLock::new();

/// Set up the process-wide clock.
///
/// Idempotent: the first successful call selects and, for the cycle counter,
/// calibrates the backend; later calls return the same source. Call this once
/// at startup so calibration never overlaps a timed region.
pub fn init() -> Result<&'static ClockSource, BenchmarkError> {
    if let Some(source) = CLOCK.get() {
        return Ok(source);
    }
    let source = ClockSource::detect()?;
    let source = CLOCK.get_or_init(|| source);
    log::info!("using {}", source.name());
    Ok(source)
}

/// Seconds on the process-wide clock, set up by [`init`].
///
/// # Panics
///
/// Panics if no clock could be set up.
pub fn now() -> f64 {
    match init() {
        Ok(source) => source.now(),
        Err(err) => panic!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    fn assert_non_decreasing(clock: &impl MonotonicClock) {
        let mut previous = clock.now();
        for _ in 0..1000 {
            let current = clock.now();
            assert_that!(current, ge(previous));
            previous = current;
        }
    }

    #[googletest::test]
    fn test_global_clock_is_non_decreasing() {
        init().unwrap();
        let mut previous = now();
        for _ in 0..1000 {
            let current = now();
            assert_that!(current, ge(previous));
            previous = current;
        }
    }

    #[googletest::test]
    fn test_init_is_idempotent() {
        let first = init().unwrap() as *const ClockSource;
        let second = init().unwrap() as *const ClockSource;

        assert_that!(first, eq(second));
    }

    #[cfg(unix)]
    #[googletest::test]
    fn test_os_clock_is_non_decreasing() {
        assert_non_decreasing(&OsClock);
    }

    #[cfg(unix)]
    #[googletest::test]
    fn test_os_clock_measures_sleep() {
        let before = OsClock.now();
        std::thread::sleep(Duration::from_millis(20));
        let after = OsClock.now();

        assert_that!(after - before, ge(0.019));
    }

    #[cfg(target_arch = "x86_64")]
    #[googletest::test]
    fn test_cycle_counter_is_non_decreasing() {
        let counter = CycleCounter::calibrate(Duration::from_millis(10)).unwrap();

        assert_that!(counter.cycles_per_second(), gt(0.0));
        assert_non_decreasing(&counter);
    }

    #[cfg(target_arch = "x86_64")]
    #[googletest::test]
    fn test_cycle_counter_rejects_zero_interval() {
        assert_that!(CycleCounter::calibrate(Duration::ZERO), err(anything()));
    }
}
