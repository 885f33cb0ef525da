//! Measurement records and the timer that produces them.
//!
//! A [`MeasurementRecord`] is created once per strategy invocation and
//! handed to the caller. Records from different strategies share one shape
//! so reporting never needs to know which strategy produced a row.

use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};

use crate::counter::Method;
use crate::errors::CountResult;

/// Outcome of one strategy invocation over one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    /// Strategy that produced the record
    pub method: Method,
    /// Logical name of the input text
    pub dataset: String,
    /// Number of occurrences under the resume-after-match rule
    pub occurrences: u64,
    /// Elapsed monotonic time of the measured phase
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Worker thread count, only for the thread-pool strategy
    #[serde(rename = "threads")]
    pub parallelism: Option<usize>,
    /// Device class and name, only for accelerator strategies
    #[serde(rename = "device")]
    pub device_label: Option<String>,
}

impl MeasurementRecord {
    /// Elapsed time in fractional milliseconds
    pub fn duration_millis(&self) -> f64 {
        self.duration.as_nanos() as f64 / 1_000_000.0
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// Wraps a counting closure with a monotonic timer.
///
/// The closure runs exactly the phase being measured; whatever setup the
/// strategy does before calling [`MeasurementRecorder::record`] stays out
/// of the measured interval.
#[derive(Debug, Clone)]
pub struct MeasurementRecorder {
    method: Method,
    parallelism: Option<usize>,
    device_label: Option<String>,
}

impl MeasurementRecorder {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            parallelism: None,
            device_label: None,
        }
    }

    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }

    pub fn with_device_label(mut self, label: impl Into<String>) -> Self {
        self.device_label = Some(label.into());
        self
    }

    /// Times `work` and packages its count. Errors propagate unchanged.
    pub fn record<F>(self, dataset: &str, work: F) -> CountResult<MeasurementRecord>
    where
        F: FnOnce() -> CountResult<u64>,
    {
        let start = Instant::now();
        let occurrences = work()?;
        let duration = start.elapsed();

        Ok(MeasurementRecord {
            method: self.method,
            dataset: dataset.to_string(),
            occurrences,
            duration,
            parallelism: self.parallelism,
            device_label: self.device_label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CountError;

    #[test]
    fn test_record_packages_metadata() {
        let record = MeasurementRecorder::new(Method::ParallelCpu)
            .with_parallelism(4)
            .record("sample.txt", || Ok(7))
            .unwrap();

        assert_eq!(record.method, Method::ParallelCpu);
        assert_eq!(record.dataset, "sample.txt");
        assert_eq!(record.occurrences, 7);
        assert_eq!(record.parallelism, Some(4));
        assert_eq!(record.device_label, None);
    }

    #[test]
    fn test_record_measures_elapsed_time() {
        let record = MeasurementRecorder::new(Method::SerialCpu)
            .record("slow", || {
                std::thread::sleep(Duration::from_millis(5));
                Ok(0)
            })
            .unwrap();
        assert!(record.duration >= Duration::from_millis(5));
        assert!(record.duration_millis() >= 5.0);
    }

    #[test]
    fn test_record_propagates_errors() {
        let result = MeasurementRecorder::new(Method::ParallelGpu)
            .with_device_label("CPU (host)")
            .record("data", || Err(CountError::NoDeviceAvailable));
        assert!(matches!(result, Err(CountError::NoDeviceAvailable)));
    }

    #[test]
    fn test_record_serializes_milliseconds() {
        let record = MeasurementRecord {
            method: Method::ParallelGpuOpt,
            dataset: "d".to_string(),
            occurrences: 3,
            duration: Duration::from_micros(1500),
            parallelism: None,
            device_label: Some("GPU (Test)".to_string()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["method"], "ParallelGPU-Opt");
        assert_eq!(json["duration_ms"], 1.5);
        assert_eq!(json["threads"], serde_json::Value::Null);
        assert_eq!(json["device"], "GPU (Test)");
    }
}
