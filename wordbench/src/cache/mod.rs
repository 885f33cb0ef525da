//! Per-device kernel bundle cache.
//!
//! Each (device identity, kernel variant) key owns a slot holding a
//! `OnceCell`. The first caller for a key runs the build while concurrent
//! callers for the same key wait on the cell and then share the result. A
//! failed build leaves the cell empty, so the next caller tries again.

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::device::{AcceleratorPlatform, CompiledKernel, DeviceDescriptor};
use crate::errors::CountResult;
use crate::kernel::KernelVariant;
use crate::metrics::{CacheMetrics, CacheStats};

static GLOBAL_CACHE: Lazy<Arc<ResourceCache>> = Lazy::new(|| Arc::new(ResourceCache::new()));

type Slot = Arc<OnceCell<Arc<dyn CompiledKernel>>>;

/// Key of one cached bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub device: String,
    pub variant: KernelVariant,
}

impl CacheKey {
    pub fn new(device: &DeviceDescriptor, variant: KernelVariant) -> Self {
        Self {
            device: device.identity(),
            variant,
        }
    }
}

/// Process-wide registry of compiled kernel bundles
#[derive(Default)]
pub struct ResourceCache {
    slots: DashMap<CacheKey, Slot>,
    metrics: CacheMetrics,
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every counter that is not given its own
    pub fn global() -> Arc<ResourceCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    /// Returns the bundle for `device` and `variant`, building it on first use
    pub fn get_or_build(
        &self,
        platform: &dyn AcceleratorPlatform,
        device: &DeviceDescriptor,
        variant: KernelVariant,
    ) -> CountResult<Arc<dyn CompiledKernel>> {
        let key = CacheKey::new(device, variant);
        let slot: Slot = self.slots.entry(key.clone()).or_default().clone();

        if let Some(kernel) = slot.get() {
            self.metrics.record_hit();
            debug!("Kernel cache hit for {} {}", key.device, variant);
            return Ok(Arc::clone(kernel));
        }

        let mut built = false;
        let result = slot.get_or_try_init(|| {
            built = true;
            self.metrics.record_miss();
            platform.build(device, variant)
        });

        match result {
            Ok(kernel) => {
                if built {
                    self.metrics.record_build(&key.device);
                } else {
                    self.metrics.record_hit();
                }
                Ok(Arc::clone(kernel))
            }
            Err(e) => {
                self.metrics.record_build_failure(&key.device);
                Err(e)
            }
        }
    }

    /// Whether a ready bundle exists for the key
    pub fn contains(&self, device: &DeviceDescriptor, variant: KernelVariant) -> bool {
        self.slots
            .get(&CacheKey::new(device, variant))
            .is_some_and(|slot| slot.value().get().is_some())
    }

    /// Number of ready bundles
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.get_stats()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}
