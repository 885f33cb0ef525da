use std::sync::Arc;
use tracing::{debug, trace};

use super::{Counter, Method};
use crate::cache::ResourceCache;
use crate::device::{default_platform, select_device, AcceleratorPlatform};
use crate::errors::{CountError, CountResult};
use crate::kernel::{effective_group_size, KernelJob, KernelVariant, LaunchGeometry, DEFAULT_GROUP_SIZE};
use crate::normalize::normalize;
use crate::record::{MeasurementRecord, MeasurementRecorder};

/// Counts on the best available compute device with one of the two kernels.
///
/// Device selection and the kernel build (or cache lookup) happen before
/// the timer starts; the measured phase covers transfers, the launch,
/// synchronization and the read-back.
#[derive(Debug, Clone)]
pub struct KernelCounter {
    variant: KernelVariant,
    platform: Arc<dyn AcceleratorPlatform>,
    cache: Arc<ResourceCache>,
    group_size: usize,
}

impl KernelCounter {
    pub fn new(
        variant: KernelVariant,
        platform: Arc<dyn AcceleratorPlatform>,
        cache: Arc<ResourceCache>,
    ) -> Self {
        Self {
            variant,
            platform,
            cache,
            group_size: DEFAULT_GROUP_SIZE,
        }
    }

    /// One work-item per offset with a global atomic per match
    pub fn naive(platform: Arc<dyn AcceleratorPlatform>, cache: Arc<ResourceCache>) -> Self {
        Self::new(KernelVariant::Naive, platform, cache)
    }

    /// Work-group reduction with one atomic per group
    pub fn reduced(platform: Arc<dyn AcceleratorPlatform>, cache: Arc<ResourceCache>) -> Self {
        Self::new(KernelVariant::Reduced, platform, cache)
    }

    /// A counter on the default platform chain and the process-wide cache
    pub fn with_defaults(variant: KernelVariant) -> Self {
        Self::new(variant, default_platform(), ResourceCache::global())
    }

    /// Sets the reduced kernel's work-group size, a power of two
    pub fn with_group_size(mut self, group_size: usize) -> CountResult<Self> {
        if group_size == 0 || !group_size.is_power_of_two() {
            return Err(CountError::invalid_argument(format!(
                "work-group size must be a power of two, got {}",
                group_size
            )));
        }
        self.group_size = group_size;
        Ok(self)
    }

    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }
}

impl Counter for KernelCounter {
    fn method(&self) -> Method {
        match self.variant {
            KernelVariant::Naive => Method::ParallelGpu,
            KernelVariant::Reduced => Method::ParallelGpuOpt,
        }
    }

    fn count(&self, dataset: &str, text: &str, pattern: &str) -> CountResult<MeasurementRecord> {
        let input = normalize(text, pattern)?;
        let text = input.text_bytes();
        let pattern = input.pattern_bytes();

        let device = select_device(self.platform.as_ref())?;
        let kernel = self
            .cache
            .get_or_build(self.platform.as_ref(), &device, self.variant)?;
        let recorder = MeasurementRecorder::new(self.method()).with_device_label(device.label());

        if text.len() < pattern.len() {
            trace!("Text of {} shorter than pattern, skipping launch", dataset);
            return recorder.record(dataset, || Ok(0));
        }

        let geometry = match self.variant {
            KernelVariant::Naive => LaunchGeometry::naive(text.len()),
            KernelVariant::Reduced => LaunchGeometry::reduced(
                text.len(),
                effective_group_size(self.group_size, device.max_work_group_size)?,
            ),
        };
        let job = KernelJob::new(text, pattern, geometry)?;
        debug!(
            "Launching {} on {} for {}: global {}, local {:?}",
            self.variant,
            device.identity(),
            dataset,
            geometry.global_size,
            geometry.local_size
        );

        recorder.record(dataset, || kernel.launch(&job))
    }
}
