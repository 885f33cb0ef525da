pub mod bench;
pub mod cache;
pub mod config;
pub mod counter;
pub mod device;
pub mod errors;
pub mod kernel;
pub mod metrics;
pub mod normalize;
pub mod partition;
pub mod record;
pub mod report;
pub mod source;

pub use bench::{BenchmarkPlan, BenchmarkReport, BenchmarkRunner, StrategyFailure};
pub use cache::ResourceCache;
pub use config::{BenchConfig, CliOverrides, EncodingMode};
pub use counter::{Counter, KernelCounter, Method, SerialCounter, WorkerPoolCounter};
pub use device::{default_platform, select_device, AcceleratorPlatform, DeviceDescriptor};
pub use errors::{CountError, CountResult};
pub use kernel::KernelVariant;
pub use record::MeasurementRecord;
pub use source::{load_dataset, Dataset};
