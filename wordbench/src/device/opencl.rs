//! OpenCL devices through `opencl3`.
//!
//! Every installed platform is enumerated; a missing runtime or a platform
//! that refuses to list devices simply contributes nothing.

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{
    Device, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU,
};
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE};
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::{cl_device_id, cl_device_type, cl_uchar, cl_uint, CL_BLOCKING};
use std::ptr;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::{AcceleratorPlatform, CompiledKernel, DeviceClass, DeviceDescriptor};
use crate::errors::{CountError, CountResult};
use crate::kernel::{jump_rounds, KernelJob, KernelVariant, JUMP_KERNEL, LINK_KERNEL};

const CLASS_QUERIES: [(cl_device_type, DeviceClass); 3] = [
    (CL_DEVICE_TYPE_GPU, DeviceClass::Gpu),
    (CL_DEVICE_TYPE_ACCELERATOR, DeviceClass::Accelerator),
    (CL_DEVICE_TYPE_CPU, DeviceClass::Cpu),
];

/// All OpenCL platforms installed on the machine
#[derive(Debug, Default)]
pub struct OpenClPlatform;

impl OpenClPlatform {
    pub fn new() -> Self {
        Self
    }

    fn discover() -> Vec<(DeviceDescriptor, cl_device_id)> {
        let platforms = match get_platforms() {
            Ok(platforms) => platforms,
            Err(e) => {
                debug!("No OpenCL runtime: {}", e);
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        for platform in platforms {
            let platform_name = platform.name().unwrap_or_default().trim().to_string();
            for (device_type, class) in CLASS_QUERIES {
                for id in platform.get_devices(device_type).unwrap_or_default() {
                    let device = Device::new(id);
                    let descriptor = DeviceDescriptor::new(
                        platform_name.clone(),
                        device.name().unwrap_or_default().trim(),
                        class,
                        device.max_work_group_size().unwrap_or(1),
                    );
                    found.push((descriptor, id));
                }
            }
        }
        found
    }
}

impl AcceleratorPlatform for OpenClPlatform {
    fn name(&self) -> &str {
        "opencl"
    }

    fn devices(&self) -> Vec<DeviceDescriptor> {
        Self::discover().into_iter().map(|(d, _)| d).collect()
    }

    fn build(
        &self,
        device: &DeviceDescriptor,
        variant: KernelVariant,
    ) -> CountResult<Arc<dyn CompiledKernel>> {
        let identity = device.identity();
        let id = Self::discover()
            .into_iter()
            .find(|(d, _)| d == device)
            .map(|(_, id)| id)
            .ok_or_else(|| CountError::device(format!("{} is no longer present", identity)))?;

        let cl_device = Device::new(id);
        let context = Context::from_device(&cl_device)
            .map_err(|e| CountError::device(format!("context for {}: {}", identity, e)))?;
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, 0)
            .map_err(|e| CountError::device(format!("queue for {}: {}", identity, e)))?;

        let program = Program::create_and_build_from_source(&context, variant.source(), "")
            .map_err(|log| {
                warn!("Kernel {} failed to build on {}", variant, identity);
                CountError::kernel_build_failure(identity.clone(), log)
            })?;
        let create = |name: &str| {
            Kernel::create(&program, name).map_err(|e| {
                CountError::kernel_build_failure(identity.clone(), format!("{}: {}", name, e))
            })
        };
        let kernels = KernelSet {
            link: create(LINK_KERNEL)?,
            jump: create(JUMP_KERNEL)?,
            count: create(variant.entry_point())?,
        };

        debug!("Built {} for {}", variant, identity);

        Ok(Arc::new(OpenClKernel {
            variant,
            context,
            queue,
            _program: program,
            kernels: Mutex::new(kernels),
        }))
    }
}

struct KernelSet {
    link: Kernel,
    jump: Kernel,
    count: Kernel,
}

struct OpenClKernel {
    variant: KernelVariant,
    context: Context,
    queue: CommandQueue,
    _program: Program,
    kernels: Mutex<KernelSet>,
}

// SAFETY: OpenCL 1.2+ guarantees thread safety for contexts, command queues
// and programs. Kernel argument setting is not thread safe, so the kernels
// are only used behind the mutex.
unsafe impl Send for OpenClKernel {}
unsafe impl Sync for OpenClKernel {}

impl OpenClKernel {
    fn alloc<T>(&self, len: usize, flags: u64) -> CountResult<Buffer<T>> {
        unsafe {
            Buffer::<T>::create(&self.context, flags, len.max(1), ptr::null_mut())
                .map_err(|e| CountError::device(format!("buffer allocation: {}", e)))
        }
    }

    fn upload<T: Default + Clone>(&self, data: &[T], flags: u64) -> CountResult<Buffer<T>> {
        let mut buffer = self.alloc::<T>(data.len(), flags)?;
        if !data.is_empty() {
            let write = unsafe {
                self.queue
                    .enqueue_write_buffer(&mut buffer, CL_BLOCKING, 0, data, &[])
                    .map_err(|e| CountError::device(format!("buffer upload: {}", e)))?
            };
            write
                .wait()
                .map_err(|e| CountError::device(format!("buffer upload: {}", e)))?;
        }
        Ok(buffer)
    }

    /// Link and jump passes; returns the remaining-count buffer
    fn remaining_counts(
        &self,
        kernels: &KernelSet,
        job: &KernelJob<'_>,
        text_buf: &Buffer<cl_uchar>,
        pattern_buf: &Buffer<cl_uchar>,
    ) -> CountResult<Buffer<cl_uint>> {
        let offsets = job.text.len() + 1;
        let text_len: cl_uint = job.text_len();
        let pattern_len: cl_uint = job.pattern_len();

        let mut next = self.alloc::<cl_uint>(offsets, CL_MEM_READ_WRITE)?;
        let mut weight = self.alloc::<cl_uint>(offsets, CL_MEM_READ_WRITE)?;
        let mut next_out = self.alloc::<cl_uint>(offsets, CL_MEM_READ_WRITE)?;
        let mut weight_out = self.alloc::<cl_uint>(offsets, CL_MEM_READ_WRITE)?;

        let link = unsafe {
            ExecuteKernel::new(&kernels.link)
                .set_arg(text_buf)
                .set_arg(&text_len)
                .set_arg(pattern_buf)
                .set_arg(&pattern_len)
                .set_arg(&next)
                .set_arg(&weight)
                .set_global_work_size(offsets)
                .enqueue_nd_range(&self.queue)
                .map_err(|e| CountError::device(format!("link pass: {}", e)))?
        };
        link.wait()
            .map_err(|e| CountError::device(format!("link pass: {}", e)))?;

        for round in 0..jump_rounds(job.text.len()) {
            let jump = unsafe {
                ExecuteKernel::new(&kernels.jump)
                    .set_arg(&next)
                    .set_arg(&weight)
                    .set_arg(&next_out)
                    .set_arg(&weight_out)
                    .set_arg(&text_len)
                    .set_global_work_size(offsets)
                    .enqueue_nd_range(&self.queue)
                    .map_err(|e| CountError::device(format!("jump pass {}: {}", round, e)))?
            };
            jump.wait()
                .map_err(|e| CountError::device(format!("jump pass {}: {}", round, e)))?;
            std::mem::swap(&mut next, &mut next_out);
            std::mem::swap(&mut weight, &mut weight_out);
        }
        Ok(weight)
    }
}

impl CompiledKernel for OpenClKernel {
    fn variant(&self) -> KernelVariant {
        self.variant
    }

    fn launch(&self, job: &KernelJob<'_>) -> CountResult<u64> {
        let text_buf = self.upload::<cl_uchar>(job.text, CL_MEM_READ_ONLY)?;
        let pattern_buf = self.upload::<cl_uchar>(job.pattern, CL_MEM_READ_ONLY)?;
        let counter_buf = self.upload::<cl_uint>(&[0], CL_MEM_READ_WRITE)?;

        let text_len: cl_uint = job.text_len();
        let pattern_len: cl_uint = job.pattern_len();
        let period: cl_uint = job.period;

        let kernels = self
            .kernels
            .lock()
            .map_err(|_| CountError::device("kernel mutex poisoned"))?;
        // Never read when the pattern cannot overlap itself
        let remaining_buf = if job.self_overlapping() {
            self.remaining_counts(&kernels, job, &text_buf, &pattern_buf)?
        } else {
            self.alloc::<cl_uint>(1, CL_MEM_READ_ONLY)?
        };

        let run = unsafe {
            let mut exec = ExecuteKernel::new(&kernels.count);
            exec.set_arg(&text_buf)
                .set_arg(&text_len)
                .set_arg(&pattern_buf)
                .set_arg(&pattern_len)
                .set_arg(&period)
                .set_arg(&remaining_buf)
                .set_arg(&counter_buf);
            if let Some(local) = job.geometry.local_size {
                exec.set_arg_local_buffer(local * std::mem::size_of::<cl_uint>())
                    .set_local_work_size(local);
            }
            exec.set_global_work_size(job.geometry.global_size)
                .enqueue_nd_range(&self.queue)
                .map_err(|e| CountError::device(format!("kernel enqueue: {}", e)))?
        };
        run.wait()
            .map_err(|e| CountError::device(format!("kernel execution: {}", e)))?;
        drop(kernels);

        let mut result: [cl_uint; 1] = [0];
        let read = unsafe {
            self.queue
                .enqueue_read_buffer(&counter_buf, CL_BLOCKING, 0, &mut result, &[])
                .map_err(|e| CountError::device(format!("counter read-back: {}", e)))?
        };
        read.wait()
            .map_err(|e| CountError::device(format!("counter read-back: {}", e)))?;

        Ok(u64::from(result[0]))
    }
}
