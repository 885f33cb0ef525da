//! Compute device discovery and selection.
//!
//! An [`AcceleratorPlatform`] enumerates devices and builds kernel bundles
//! for them. [`select_device`] picks the first device of the best available
//! class, in strict priority order GPU, then generic accelerator, then CPU.
//!
//! ```rust,ignore
//! let platform = default_platform();
//! let device = select_device(platform.as_ref())?;
//! let kernel = platform.build(&device, KernelVariant::Reduced)?;
//! let count = kernel.launch(&job)?;
//! ```

pub mod host;
#[cfg(feature = "opencl")]
pub mod opencl;

pub use host::HostPlatform;
#[cfg(feature = "opencl")]
pub use opencl::OpenClPlatform;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{CountError, CountResult};
use crate::kernel::{KernelJob, KernelVariant};

/// Device classes in selection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeviceClass {
    Gpu,
    Accelerator,
    Cpu,
}

impl DeviceClass {
    pub fn label(&self) -> &'static str {
        match self {
            DeviceClass::Gpu => "GPU",
            DeviceClass::Accelerator => "Accelerator",
            DeviceClass::Cpu => "CPU",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An enumerated compute device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub platform: String,
    pub name: String,
    pub class: DeviceClass,
    pub max_work_group_size: usize,
}

impl DeviceDescriptor {
    pub fn new(
        platform: impl Into<String>,
        name: impl Into<String>,
        class: DeviceClass,
        max_work_group_size: usize,
    ) -> Self {
        Self {
            platform: platform.into(),
            name: name.into(),
            class,
            max_work_group_size,
        }
    }

    /// Platform-qualified name, stable for the process lifetime
    pub fn identity(&self) -> String {
        format!("{}/{}", self.platform, self.name)
    }

    /// Label stamped on measurement records, e.g. `GPU (Radeon Pro)`
    pub fn label(&self) -> String {
        format!("{} ({})", self.class, self.name)
    }
}

/// A kernel compiled for one device, bound to its context and queue
pub trait CompiledKernel: Send + Sync {
    fn variant(&self) -> KernelVariant;

    /// Runs one launch to completion and returns the counter read back
    fn launch(&self, job: &KernelJob<'_>) -> CountResult<u64>;
}

/// A source of compute devices
pub trait AcceleratorPlatform: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Enumerates devices; a platform with no runtime reports none
    fn devices(&self) -> Vec<DeviceDescriptor>;

    /// Compiles `variant` for `device` and creates its execution resources
    fn build(
        &self,
        device: &DeviceDescriptor,
        variant: KernelVariant,
    ) -> CountResult<Arc<dyn CompiledKernel>>;
}

/// Devices from `platform` sorted by class priority, stable within a class
pub fn enumerate(platform: &dyn AcceleratorPlatform) -> Vec<DeviceDescriptor> {
    let mut devices = platform.devices();
    devices.sort_by_key(|d| d.class);
    devices
}

/// Picks the first device of the highest-priority class
pub fn select_device(platform: &dyn AcceleratorPlatform) -> CountResult<DeviceDescriptor> {
    let device = enumerate(platform)
        .into_iter()
        .next()
        .ok_or(CountError::NoDeviceAvailable)?;
    debug!(
        "Selected {} device {} from {}",
        device.class,
        device.identity(),
        platform.name()
    );
    Ok(device)
}

/// Several platforms presented as one; builds go to the owning member
#[derive(Debug, Default)]
pub struct PlatformChain {
    members: Vec<Arc<dyn AcceleratorPlatform>>,
}

impl PlatformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, platform: Arc<dyn AcceleratorPlatform>) -> Self {
        self.members.push(platform);
        self
    }

    fn owner(&self, device: &DeviceDescriptor) -> Option<&Arc<dyn AcceleratorPlatform>> {
        self.members
            .iter()
            .find(|member| member.devices().iter().any(|d| d == device))
    }
}

impl AcceleratorPlatform for PlatformChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn devices(&self) -> Vec<DeviceDescriptor> {
        self.members
            .iter()
            .flat_map(|member| member.devices())
            .collect()
    }

    fn build(
        &self,
        device: &DeviceDescriptor,
        variant: KernelVariant,
    ) -> CountResult<Arc<dyn CompiledKernel>> {
        let owner = self.owner(device).ok_or_else(|| {
            CountError::device(format!("no platform owns device {}", device.identity()))
        })?;
        owner.build(device, variant)
    }
}

/// Installed OpenCL platforms (with the `opencl` feature), then the host
pub fn default_platform() -> Arc<dyn AcceleratorPlatform> {
    let chain = PlatformChain::new();
    #[cfg(feature = "opencl")]
    let chain = chain.with(Arc::new(OpenClPlatform::new()));
    Arc::new(chain.with(Arc::new(HostPlatform::new())))
}
