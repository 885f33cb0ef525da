/// Error types for the counting engine.
///
/// Every failure inside the engine surfaces as one of these variants; no
/// strategy substitutes a partial or zero result for a failed count. The
/// orchestrator in [`crate::bench`] decides whether a failure skips one
/// strategy or aborts the run.
///
/// ```rust,ignore
/// match counter.count("corpus.txt", &text, "word") {
///     Ok(record) => // Use record,
///     Err(CountError::NoDeviceAvailable) => // Skip accelerator strategies,
///     Err(e) => // Abort the run
/// }
/// ```
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for counting operations
pub type CountResult<T> = Result<T, CountError>;

/// Errors that can occur while counting or orchestrating a benchmark
#[derive(Error, Debug)]
pub enum CountError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("No compute device available")]
    NoDeviceAvailable,
    #[error("Kernel build failed on {device}: {log}")]
    KernelBuildFailure { device: String, log: String },
    #[error("Worker task failed: {0}")]
    TaskFailure(String),
    #[error("Device error: {0}")]
    Device(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::string::FromUtf8Error,
    },
}

impl CountError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn kernel_build_failure(device: impl Into<String>, log: impl Into<String>) -> Self {
        Self::KernelBuildFailure {
            device: device.into(),
            log: log.into(),
        }
    }

    pub fn task_failure(msg: impl Into<String>) -> Self {
        Self::TaskFailure(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn encoding_error(path: impl AsRef<Path>, source: std::string::FromUtf8Error) -> Self {
        Self::EncodingError {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether the error came from the accelerator path (device discovery,
    /// kernel compilation or a device runtime call).
    pub fn is_accelerator_failure(&self) -> bool {
        matches!(
            self,
            Self::NoDeviceAvailable | Self::KernelBuildFailure { .. } | Self::Device(_)
        )
    }
}
