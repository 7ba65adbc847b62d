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

//! Result formatting.

use serde::Serialize;

use crate::{BenchmarkResult, Mode};

/// Suffix appended to the kernel name of multi-worker results.
pub const PARALLEL_SUFFIX: &str = "_par";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One aligned `name: bandwidth GiB/s` line per kernel.
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    kernel: &'a str,
    mode: &'static str,
    workers: usize,
    bytes: u64,
    seconds: f64,
    gib_per_sec: f64,
}

/// Format one result as a single line, without the trailing newline.
pub fn format_result(result: &BenchmarkResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Human => match result.mode {
            Mode::Sequential => {
                format!("{:>32}: {:5.2} GiB/s", result.kernel.name(), result.bandwidth)
            }
            Mode::Parallel { .. } => format!(
                "{:>28}{}: {:5.2} GiB/s",
                result.kernel.name(),
                PARALLEL_SUFFIX,
                result.bandwidth
            ),
        },
        OutputFormat::Json => {
            let (mode, workers) = match result.mode {
                Mode::Sequential => ("sequential", 1),
                Mode::Parallel { workers } => ("parallel", workers),
            };
            let record = JsonRecord {
                kernel: result.kernel.name(),
                mode,
                workers,
                bytes: result.bytes_per_sample,
                seconds: result.min_duration,
                gib_per_sec: result.bandwidth,
            };
            serde_json::to_string(&record).expect("record holds only strings and numbers")
        }
    }
}
