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

//! Memory bandwidth benchmark runner.
//!
//! Runs every kernel the CPU supports over one large buffer and prints the
//! best observed bandwidth of each, one line per kernel. With `--parallel` a
//! second pass repeats the kernels split across a pool of workers.

use anyhow::Context;
use clap::Parser;
use membw::{
    AlignedBuffer, BUFFER_ALIGNMENT, BenchmarkConfig, DEFAULT_BUFFER_SIZE, DEFAULT_RUNS,
    DEFAULT_SAMPLES, Kernel, OutputFormat, available_workers, format_result, measure,
    measure_parallel, partition, timer,
};

/// Fill byte written over the buffer before each pass so every page is
/// resident before timing starts.
const PREFAULT_BYTE: u8 = 0xFF;

#[derive(Parser, Debug)]
#[command(name = "membw")]
#[command(about = "Measure sustained memory bandwidth of streaming stores and loads")]
struct Args {
    /// Size of the measured buffer in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    size: usize,

    /// Number of timed samples per kernel; the fastest is reported.
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    samples: usize,

    /// Number of back-to-back kernel invocations inside one sample.
    #[arg(long, default_value_t = DEFAULT_RUNS)]
    runs: usize,

    /// Also run every kernel split across a pool of worker threads.
    #[arg(long)]
    parallel: bool,

    /// Number of workers for the parallel pass. Defaults to the largest count
    /// up to the number of CPUs that splits the buffer evenly.
    #[arg(long, requires = "parallel")]
    threads: Option<usize>,

    /// Only run the named kernel. May be given more than once.
    #[arg(long = "kernel")]
    kernels: Vec<Kernel>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    output: OutputFormat,

    /// Print the kernels available on this CPU and exit.
    #[arg(long)]
    list: bool,
}

impl Args {
    fn config(&self) -> BenchmarkConfig {
        BenchmarkConfig { samples: self.samples, runs: self.runs }
    }

    /// Kernels to run, in the canonical order, restricted to the ones this CPU
    /// supports.
    fn selected_kernels(&self) -> Vec<Kernel> {
        for kernel in self.kernels.iter().filter(|kernel| !kernel.is_supported()) {
            log::warn!("{} is not supported on this CPU, skipping", kernel);
        }
        Kernel::available()
            .into_iter()
            .filter(|kernel| self.kernels.is_empty() || self.kernels.contains(kernel))
            .collect()
    }

    fn workers(&self) -> usize {
        self.threads.unwrap_or_else(|| default_workers(self.size))
    }
}

/// The largest worker count up to the number of CPUs that splits `size` into
/// equal chunks aligned to [`BUFFER_ALIGNMENT`].
fn default_workers(size: usize) -> usize {
    (1..=available_workers())
        .rev()
        .find(|&workers| size % workers == 0 && (size / workers) % BUFFER_ALIGNMENT == 0)
        .unwrap_or(1)
}

/// Check that `workers` splits `size` into equal chunks every kernel in
/// `kernels` can run over.
fn check_workers(size: usize, workers: usize, kernels: &[Kernel]) -> anyhow::Result<()> {
    let chunks = partition(size, workers)?;
    let chunk_size = chunks[0].len();
    if let Some(kernel) = kernels.iter().find(|kernel| chunk_size % kernel.element_width() != 0) {
        anyhow::bail!(
            "{} byte chunks on {} workers are too narrow for {}",
            chunk_size,
            workers,
            kernel
        );
    }
    Ok(())
}

fn list_kernels() {
    for kernel in Kernel::available() {
        let feature = kernel.required_feature().map_or("baseline", |feature| feature.name());
        println!(
            "{:>32}: {:?}, {} byte elements, {}",
            kernel.name(),
            kernel.access_kind(),
            kernel.element_width(),
            feature
        );
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list {
        list_kernels();
        return Ok(());
    }

    let config = args.config();
    config.validate().context("invalid sampling configuration")?;

    // Set up (and, for the cycle counter, calibrate) the clock before anything
    // is timed.
    timer::init().context("couldn't set up a monotonic clock")?;

    let kernels = args.selected_kernels();
    if kernels.is_empty() {
        anyhow::bail!("none of the requested kernels is supported on this CPU");
    }

    let workers = args.workers();
    if args.parallel {
        check_workers(args.size, workers, &kernels).context("invalid worker count")?;
    }

    let mut buffer = AlignedBuffer::new(args.size).context("couldn't allocate buffer")?;
    log::info!("measuring over {} bytes", buffer.size());
    buffer.prefault(PREFAULT_BYTE);

    for &kernel in &kernels {
        let result = measure(kernel, &mut buffer, &config)
            .with_context(|| format!("couldn't measure {}", kernel))?;
        println!("{}", format_result(&result, args.output));
    }

    if args.parallel {
        log::info!("parallel pass with {} workers", workers);
        buffer.prefault(PREFAULT_BYTE);

        for &kernel in &kernels {
            let result = measure_parallel(kernel, &mut buffer, workers, &config)
                .with_context(|| format!("couldn't measure {} on {} workers", kernel, workers))?;
            println!("{}", format_result(&result, args.output));
        }
    }

    Ok(())
}
