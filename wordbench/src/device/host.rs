//! The host CPU as a compute device.
//!
//! Kernels run through an NDRange emulation on a rayon pool. The link and
//! jump passes are parallel maps over every resume offset, double-buffered
//! like their device counterparts. For the reduced kernel, work-groups are
//! scheduled in parallel and the items of one group run in lockstep over a
//! group-local scratch array: filling the scratch is the phase before the
//! first barrier, and each halving step ends at the next one. The global
//! counter is an atomic shared by all groups.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{AcceleratorPlatform, CompiledKernel, DeviceClass, DeviceDescriptor};
use crate::errors::{CountError, CountResult};
use crate::kernel::{jump_rounds, matches_at, scan_link, KernelJob, KernelVariant};

const PLATFORM_NAME: &str = "host";
const DEVICE_NAME: &str = "Host CPU";
const MAX_WORK_GROUP_SIZE: usize = 1024;

/// Platform exposing a single CPU-class device
#[derive(Debug)]
pub struct HostPlatform {
    threads: usize,
    builds: AtomicUsize,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self::with_threads(num_cpus::get())
    }

    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor::new(
            PLATFORM_NAME,
            DEVICE_NAME,
            DeviceClass::Cpu,
            MAX_WORK_GROUP_SIZE,
        )
    }

    /// Number of kernel bundles built so far
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl AcceleratorPlatform for HostPlatform {
    fn name(&self) -> &str {
        PLATFORM_NAME
    }

    fn devices(&self) -> Vec<DeviceDescriptor> {
        vec![self.descriptor()]
    }

    fn build(
        &self,
        device: &DeviceDescriptor,
        variant: KernelVariant,
    ) -> CountResult<Arc<dyn CompiledKernel>> {
        if *device != self.descriptor() {
            return Err(CountError::device(format!(
                "{} is not a host device",
                device.identity()
            )));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("wordbench-host-{}", i))
            .build()
            .map_err(|e| CountError::kernel_build_failure(device.identity(), e.to_string()))?;

        self.builds.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Built {} for {} on {} threads",
            variant,
            device.identity(),
            self.threads
        );

        Ok(Arc::new(HostKernel { variant, pool }))
    }
}

struct HostKernel {
    variant: KernelVariant,
    pool: ThreadPool,
}

impl HostKernel {
    /// Matches the greedy scan selects from every resume offset onward
    fn remaining_counts(&self, job: &KernelJob<'_>) -> Vec<u32> {
        let end = job.text.len();
        self.pool.install(|| {
            let (mut next, mut weight): (Vec<u32>, Vec<u32>) = (0..=end)
                .into_par_iter()
                .map(|t| scan_link(job.text, job.pattern, t))
                .unzip();

            for _ in 0..jump_rounds(end) {
                (next, weight) = (0..=end)
                    .into_par_iter()
                    .map(|t| {
                        let hop = next[t] as usize;
                        (next[hop], weight[t] + weight[hop])
                    })
                    .unzip();
            }
            weight
        })
    }

    fn flag(job: &KernelJob<'_>, remaining: &[u32], gid: usize) -> u32 {
        if gid + job.pattern.len() > job.text.len() {
            return 0;
        }
        if job.self_overlapping() {
            remaining[gid] - remaining[gid + 1]
        } else {
            matches_at(job.text, job.pattern, gid) as u32
        }
    }

    fn prepare(&self, job: &KernelJob<'_>) -> Vec<u32> {
        if job.self_overlapping() {
            self.remaining_counts(job)
        } else {
            Vec::new()
        }
    }

    fn run_naive(&self, job: &KernelJob<'_>, counter: &AtomicU64) {
        let remaining = self.prepare(job);
        self.pool.install(|| {
            (0..job.geometry.global_size)
                .into_par_iter()
                .filter(|&gid| Self::flag(job, &remaining, gid) == 1)
                .for_each(|_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
        });
    }

    fn run_reduced(&self, job: &KernelJob<'_>, counter: &AtomicU64) -> CountResult<()> {
        let local = job.geometry.local_size.ok_or_else(|| {
            CountError::invalid_argument("reduced kernel requires a work-group size")
        })?;
        if !local.is_power_of_two() || job.geometry.global_size % local != 0 {
            return Err(CountError::invalid_argument(format!(
                "global size {} is not a multiple of power-of-two group size {}",
                job.geometry.global_size, local
            )));
        }

        let remaining = self.prepare(job);
        self.pool.install(|| {
            (0..job.geometry.global_size / local)
                .into_par_iter()
                .for_each(|group| {
                    let base = group * local;
                    let mut scratch: Vec<u32> = (0..local)
                        .map(|lid| Self::flag(job, &remaining, base + lid))
                        .collect();

                    let mut stride = local / 2;
                    while stride > 0 {
                        for lid in 0..stride {
                            scratch[lid] += scratch[lid + stride];
                        }
                        stride /= 2;
                    }

                    if scratch[0] > 0 {
                        counter.fetch_add(u64::from(scratch[0]), Ordering::Relaxed);
                    }
                });
        });
        Ok(())
    }
}

impl CompiledKernel for HostKernel {
    fn variant(&self) -> KernelVariant {
        self.variant
    }

    fn launch(&self, job: &KernelJob<'_>) -> CountResult<u64> {
        let counter = AtomicU64::new(0);
        match self.variant {
            KernelVariant::Naive => self.run_naive(job, &counter),
            KernelVariant::Reduced => self.run_reduced(job, &counter)?,
        }
        Ok(counter.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LaunchGeometry;

    fn launch(variant: KernelVariant, text: &[u8], pattern: &[u8], geometry: LaunchGeometry) -> u64 {
        let platform = HostPlatform::with_threads(2);
        let kernel = platform.build(&platform.descriptor(), variant).unwrap();
        let job = KernelJob::new(text, pattern, geometry).unwrap();
        kernel.launch(&job).unwrap()
    }

    #[test]
    fn test_naive_launch() {
        let text = b"the cat saw the other cat";
        assert_eq!(
            launch(KernelVariant::Naive, text, b"cat", LaunchGeometry::naive(text.len())),
            2
        );
    }

    #[test]
    fn test_reduced_launch_with_padding() {
        let text = b"abababab";
        for group in [1, 2, 4, 8, 16] {
            let geometry = LaunchGeometry::reduced(text.len(), group);
            assert_eq!(launch(KernelVariant::Reduced, text, b"aba", geometry), 2);
        }
    }

    #[test]
    fn test_remaining_counts_from_every_offset() {
        let kernel = HostKernel {
            variant: KernelVariant::Naive,
            pool: ThreadPoolBuilder::new().num_threads(3).build().unwrap(),
        };
        let text = b"aaaaabaaaa";
        let job = KernelJob::new(text, b"aa", LaunchGeometry::naive(text.len())).unwrap();
        assert_eq!(
            kernel.remaining_counts(&job),
            vec![4, 4, 3, 3, 2, 2, 2, 1, 1, 0, 0]
        );
    }

    #[test]
    fn test_long_periodic_run() {
        let text = "a".repeat(1 << 17);
        let expected = (text.len() / 2) as u64;
        assert_eq!(
            launch(
                KernelVariant::Naive,
                text.as_bytes(),
                b"aa",
                LaunchGeometry::naive(text.len())
            ),
            expected
        );
        assert_eq!(
            launch(
                KernelVariant::Reduced,
                text.as_bytes(),
                b"aa",
                LaunchGeometry::reduced(text.len(), 256)
            ),
            expected
        );
        assert_eq!(jump_rounds(text.len()), 18);
    }

    #[test]
    fn test_reduced_rejects_bad_geometry() {
        let platform = HostPlatform::with_threads(1);
        let kernel = platform
            .build(&platform.descriptor(), KernelVariant::Reduced)
            .unwrap();
        let geometry = LaunchGeometry {
            global_size: 10,
            local_size: Some(4),
        };
        let job = KernelJob::new(b"aaaaaaaaaa", b"a", geometry).unwrap();
        assert!(matches!(
            kernel.launch(&job),
            Err(CountError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_build_counts_and_rejects_foreign_devices() {
        let platform = HostPlatform::with_threads(1);
        platform
            .build(&platform.descriptor(), KernelVariant::Naive)
            .unwrap();
        assert_eq!(platform.builds(), 1);

        let foreign = DeviceDescriptor::new("other", "gpu", DeviceClass::Gpu, 256);
        assert!(platform.build(&foreign, KernelVariant::Naive).is_err());
        assert_eq!(platform.builds(), 1);
    }
}
