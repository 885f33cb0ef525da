//! Counting strategies.
//!
//! Four peers implement [`Counter`]: a serial scan, a thread-pool scan over
//! partitioned chunks, and two accelerator kernels. Callers depend on the
//! trait only; for a fixed dataset and pattern every implementation returns
//! the same `occurrences`.
//!
//! ```rust,ignore
//! let counters: Vec<Box<dyn Counter>> = vec![
//!     Box::new(SerialCounter::new()),
//!     Box::new(WorkerPoolCounter::new(4)?),
//!     Box::new(KernelCounter::naive(platform.clone(), cache.clone())),
//! ];
//! for counter in &counters {
//!     let record = counter.count("corpus.txt", &text, "word")?;
//! }
//! ```

pub mod accelerator;
pub mod parallel;
pub mod serial;

pub use accelerator::KernelCounter;
pub use parallel::WorkerPoolCounter;
pub use serial::SerialCounter;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CountResult;
use crate::record::MeasurementRecord;

/// Identifier of a counting strategy.
///
/// Every report names a strategy by its display name; configuration files
/// may also use the kebab-case spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    /// Single-threaded resume-after-match scan
    #[serde(rename = "SerialCPU", alias = "serial-cpu")]
    SerialCpu,
    /// Chunked scan on a bounded thread pool
    #[serde(rename = "ParallelCPU", alias = "parallel-cpu")]
    ParallelCpu,
    /// One work-item per offset, global atomic per match
    #[serde(rename = "ParallelGPU", alias = "parallel-gpu")]
    ParallelGpu,
    /// Work-group tree reduction before one atomic per group
    #[serde(rename = "ParallelGPU-Opt", alias = "parallel-gpu-opt")]
    ParallelGpuOpt,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::SerialCpu,
        Method::ParallelCpu,
        Method::ParallelGpu,
        Method::ParallelGpuOpt,
    ];

    /// Display name used in reports
    pub fn name(&self) -> &'static str {
        match self {
            Method::SerialCpu => "SerialCPU",
            Method::ParallelCpu => "ParallelCPU",
            Method::ParallelGpu => "ParallelGPU",
            Method::ParallelGpuOpt => "ParallelGPU-Opt",
        }
    }

    /// Whether the strategy runs on an accelerator device
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Method::ParallelGpu | Method::ParallelGpuOpt)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" | "serial-cpu" | "serialcpu" => Ok(Method::SerialCpu),
            "parallel" | "cpu" | "parallel-cpu" | "parallelcpu" => Ok(Method::ParallelCpu),
            "gpu" | "naive" | "parallel-gpu" | "parallelgpu" => Ok(Method::ParallelGpu),
            "gpu-opt" | "reduced" | "parallel-gpu-opt" | "parallelgpu-opt" => {
                Ok(Method::ParallelGpuOpt)
            }
            other => Err(format!(
                "unknown strategy '{}' (expected serial, parallel, gpu or gpu-opt)",
                other
            )),
        }
    }
}

/// A counting strategy
pub trait Counter: Send + Sync {
    /// Identifier stamped on every record this counter produces
    fn method(&self) -> Method;

    /// Counts occurrences of `pattern` in `text` and times the counting phase.
    ///
    /// Both inputs are case-folded first; a blank pattern is rejected with
    /// `InvalidArgument` before any work starts.
    fn count(&self, dataset: &str, text: &str, pattern: &str) -> CountResult<MeasurementRecord>;
}
