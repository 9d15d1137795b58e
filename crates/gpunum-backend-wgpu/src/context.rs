//! [`ComputeContext`] over wgpu compute pipelines.
//!
//! WGSL has no portable double precision, so host data is narrowed to `f32`
//! on upload and widened back on read.

use crate::error::{Result, WgpuError};
use crate::kernels::{self, KernelSpec, MODULES, Slot};
use gpunum_compute::{
    AccessMode, BufferHandle, ComputeContext, DeviceError, ExecutionGeometry, KernelArg,
    KernelHandle, Status,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use wgpu::util::DeviceExt;

/// Bytes per element on the device.
const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Scalars are padded to 16 bytes to satisfy uniform buffer alignment.
const SCALAR_BYTES: usize = 16;

struct GpuBuffer {
    buffer: wgpu::Buffer,
    len: usize,
}

enum Bound {
    Buffer(BufferHandle),
    Scalar(wgpu::Buffer),
}

struct GpuKernel {
    spec: &'static KernelSpec,
    pipeline: Arc<wgpu::ComputePipeline>,
    args: Vec<Option<Bound>>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    buffers: HashMap<u64, GpuBuffer>,
    kernels: HashMap<u64, GpuKernel>,
    pipelines: HashMap<&'static str, Arc<wgpu::ComputePipeline>>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// wgpu device, queue and compiled kernel modules.
pub struct WgpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter_name: String,
    modules: Vec<wgpu::ShaderModule>,
    state: Mutex<State>,
}

impl std::fmt::Debug for WgpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuContext")
            .field("adapter", &self.adapter_name)
            .finish_non_exhaustive()
    }
}

impl WgpuContext {
    /// Create a context on the highest-performance adapter.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(WgpuError::NoAdapter)?;
        let info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gpunum device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| WgpuError::DeviceRequest(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            log::error!("Uncaptured wgpu error: {}", e);
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let modules = MODULES
            .iter()
            .map(|(label, source)| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(*label),
                    source: wgpu::ShaderSource::Wgsl((*source).into()),
                })
            })
            .collect();
        if let Some(err) = device.pop_error_scope().await {
            return Err(WgpuError::Shader(err.to_string()));
        }

        log::info!(
            "Created wgpu context on {} ({:?})",
            info.name,
            info.backend
        );

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
            modules,
            state: Mutex::new(State::default()),
        })
    }

    /// Whether any wgpu adapter is present.
    pub fn is_available() -> bool {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    fn pipeline(
        &self,
        state: &mut State,
        spec: &'static KernelSpec,
    ) -> gpunum_compute::Result<Arc<wgpu::ComputePipeline>> {
        if let Some(pipeline) = state.pipelines.get(spec.name) {
            return Ok(Arc::clone(pipeline));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(spec.name),
                layout: None,
                module: &self.modules[spec.module],
                entry_point: Some(spec.name),
                compilation_options: Default::default(),
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::warn!("Pipeline `{}` failed validation: {}", spec.name, err);
            return Err(DeviceError::execution(
                "resolve_kernel",
                spec.name,
                Status::BUILD_PROGRAM_FAILURE,
            ));
        }

        let pipeline = Arc::new(pipeline);
        state.pipelines.insert(spec.name, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    fn scalar_buffer(&self, bytes: &[u8]) -> wgpu::Buffer {
        debug_assert_eq!(bytes.len(), SCALAR_BYTES);
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("gpunum scalar"),
                contents: bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }
}

fn narrow(data: &[f64]) -> Vec<f32> {
    data.iter().map(|&v| v as f32).collect()
}

impl ComputeContext for WgpuContext {
    fn device_name(&self) -> String {
        self.adapter_name.clone()
    }

    fn allocate_buffer(
        &self,
        len: usize,
        _access: AccessMode,
        initial: Option<&[f64]>,
    ) -> gpunum_compute::Result<BufferHandle> {
        let bytes = len * F32_BYTES;
        let fail = |status| DeviceError::Allocation {
            operation: "allocate_buffer",
            bytes,
            status,
        };
        if initial.is_some_and(|data| data.len() != len) {
            return Err(fail(Status::INVALID_HOST_PTR));
        }
        let limits = self.device.limits();
        if bytes as u64 > limits.max_buffer_size
            || bytes as u64 > u64::from(limits.max_storage_buffer_binding_size)
        {
            return Err(fail(Status::INVALID_BUFFER_SIZE));
        }

        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = match initial {
            Some(data) if !data.is_empty() => {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("gpunum buffer"),
                        contents: bytemuck::cast_slice(&narrow(data)),
                        usage,
                    })
            }
            _ => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("gpunum buffer"),
                size: bytes.max(F32_BYTES) as u64,
                usage,
                mapped_at_creation: false,
            }),
        };
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::warn!("Allocation of {} bytes failed: {}", bytes, err);
            return Err(fail(Status::MEM_OBJECT_ALLOCATION_FAILURE));
        }

        let mut state = self.lock();
        let id = state.next_id();
        state.buffers.insert(id, GpuBuffer { buffer, len });
        Ok(BufferHandle(id))
    }

    fn enqueue_write(
        &self,
        buffer: BufferHandle,
        data: &[f64],
        blocking: bool,
    ) -> gpunum_compute::Result<()> {
        let transfer = |status| DeviceError::Transfer {
            operation: "enqueue_write",
            status,
        };
        let state = self.lock();
        let target = state
            .buffers
            .get(&buffer.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        if target.len != data.len() {
            return Err(transfer(Status::INVALID_VALUE));
        }
        if !data.is_empty() {
            self.queue
                .write_buffer(&target.buffer, 0, bytemuck::cast_slice(&narrow(data)));
        }
        if blocking {
            self.queue.submit(std::iter::empty());
            self.wait();
        }
        Ok(())
    }

    fn enqueue_read(
        &self,
        buffer: BufferHandle,
        out: &mut [f64],
        _blocking: bool,
    ) -> gpunum_compute::Result<()> {
        let transfer = |status| DeviceError::Transfer {
            operation: "enqueue_read",
            status,
        };
        let state = self.lock();
        let source = state
            .buffers
            .get(&buffer.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        if source.len != out.len() {
            return Err(transfer(Status::INVALID_VALUE));
        }
        if out.is_empty() {
            return Ok(());
        }

        let size = (out.len() * F32_BYTES) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gpunum staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpunum read"),
            });
        encoder.copy_buffer_to_buffer(&source.buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        // Reads always block: the data must be on the host before returning.
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.wait();
        receiver
            .recv()
            .map_err(|_| transfer(Status::OUT_OF_RESOURCES))?
            .map_err(|e| {
                log::warn!("Buffer mapping failed: {:?}", e);
                transfer(Status::OUT_OF_RESOURCES)
            })?;

        {
            let mapped = slice.get_mapped_range();
            let values: &[f32] = bytemuck::cast_slice(&mapped);
            for (dst, src) in out.iter_mut().zip(values) {
                *dst = f64::from(*src);
            }
        }
        staging.unmap();
        Ok(())
    }

    fn enqueue_copy(&self, src: BufferHandle, dst: BufferHandle) -> gpunum_compute::Result<()> {
        let transfer = |status| DeviceError::Transfer {
            operation: "enqueue_copy",
            status,
        };
        let state = self.lock();
        let from = state
            .buffers
            .get(&src.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        let to = state
            .buffers
            .get(&dst.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        if from.len != to.len {
            return Err(transfer(Status::INVALID_VALUE));
        }
        if from.len == 0 {
            return Ok(());
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpunum copy"),
            });
        encoder.copy_buffer_to_buffer(&from.buffer, 0, &to.buffer, 0, (from.len * F32_BYTES) as u64);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        self.lock().buffers.remove(&buffer.0);
    }

    fn resolve_kernel(&self, name: &str) -> gpunum_compute::Result<KernelHandle> {
        let spec = kernels::find(name).ok_or_else(|| DeviceError::KernelNotFound {
            name: name.to_string(),
        })?;
        let mut state = self.lock();
        let pipeline = self.pipeline(&mut state, spec)?;
        let id = state.next_id();
        let args = (0..spec.slots.len()).map(|_| None).collect();
        state.kernels.insert(
            id,
            GpuKernel {
                spec,
                pipeline,
                args,
            },
        );
        log::debug!("Resolved kernel `{}`", name);
        Ok(KernelHandle(id))
    }

    fn bind_argument(
        &self,
        kernel: KernelHandle,
        index: u32,
        arg: &KernelArg,
    ) -> gpunum_compute::Result<()> {
        let mut state = self.lock();
        let buffer_known = match arg {
            KernelArg::Buffer(handle) => state.buffers.contains_key(&handle.0),
            _ => true,
        };
        let Some(instance) = state.kernels.get_mut(&kernel.0) else {
            return Err(DeviceError::Bind {
                kernel: format!("{:?}", kernel),
                index,
                status: Status::INVALID_KERNEL,
            });
        };
        let fail = |status| DeviceError::Bind {
            kernel: instance.spec.name.to_string(),
            index,
            status,
        };
        let Some(slot) = instance.spec.slots.get(index as usize).copied() else {
            return Err(fail(Status::INVALID_ARG_INDEX));
        };
        if arg.size() != slot.size() {
            return Err(fail(Status::INVALID_ARG_SIZE));
        }

        let bound = match (slot, arg) {
            (Slot::Storage, KernelArg::Buffer(handle)) => {
                if !buffer_known {
                    return Err(fail(Status::INVALID_MEM_OBJECT));
                }
                Bound::Buffer(*handle)
            }
            (Slot::F32, KernelArg::F32(v)) => {
                Bound::Scalar(self.scalar_buffer(bytemuck::bytes_of(&[*v, 0.0, 0.0, 0.0])))
            }
            (Slot::U32, KernelArg::U32(v)) => {
                Bound::Scalar(self.scalar_buffer(bytemuck::bytes_of(&[*v, 0, 0, 0])))
            }
            (Slot::I32, KernelArg::I32(v)) => {
                Bound::Scalar(self.scalar_buffer(bytemuck::bytes_of(&[*v, 0, 0, 0])))
            }
            _ => return Err(fail(Status::INVALID_ARG_VALUE)),
        };
        instance.args[index as usize] = Some(bound);
        Ok(())
    }

    fn enqueue_execute(
        &self,
        kernel: KernelHandle,
        geometry: &ExecutionGeometry,
    ) -> gpunum_compute::Result<()> {
        let state = self.lock();
        let instance = state.kernels.get(&kernel.0).ok_or_else(|| {
            DeviceError::execution("enqueue_execute", format!("{:?}", kernel), Status::INVALID_KERNEL)
        })?;
        let spec = instance.spec;
        let fail = |status| DeviceError::execution("enqueue_execute", spec.name, status);

        if geometry.dims() != spec.dims() {
            return Err(fail(Status::INVALID_WORK_DIMENSION));
        }
        if geometry.work_group_size() > spec.work_group_size() {
            return Err(fail(Status::INVALID_WORK_GROUP_SIZE));
        }
        if geometry
            .global()
            .iter()
            .zip(geometry.local())
            .any(|(g, l)| *l == 0 || g % l != 0)
        {
            return Err(fail(Status::INVALID_GLOBAL_WORK_SIZE));
        }

        let mut seen = Vec::new();
        let mut entries = Vec::with_capacity(instance.args.len());
        for (binding, arg) in instance.args.iter().enumerate() {
            let resource = match arg {
                None => return Err(fail(Status::INVALID_KERNEL_ARGS)),
                Some(Bound::Scalar(buffer)) => buffer.as_entire_binding(),
                Some(Bound::Buffer(handle)) => {
                    let buffer = state
                        .buffers
                        .get(&handle.0)
                        .filter(|_| !seen.contains(handle))
                        .ok_or(fail(Status::INVALID_MEM_OBJECT))?;
                    seen.push(*handle);
                    buffer.buffer.as_entire_binding()
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            });
        }

        let max_groups = self.device.limits().max_compute_workgroups_per_dimension;
        let global = geometry.global();
        let mut groups = [1u32; 2];
        for (d, g) in global.iter().enumerate() {
            let count = g.div_ceil(spec.workgroup[d] as usize);
            groups[d] = u32::try_from(count)
                .ok()
                .filter(|c| *c <= max_groups)
                .ok_or(fail(Status::INVALID_GLOBAL_WORK_SIZE))?;
        }

        log::debug!(
            "wgpu dispatch `{}`: global={:?} workgroups={:?}",
            spec.name,
            global,
            groups
        );

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = instance.pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(spec.name),
            layout: &layout,
            entries: &entries,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(spec.name),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(spec.name),
                timestamp_writes: None,
            });
            pass.set_pipeline(&instance.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::warn!("Dispatch of `{}` failed validation: {}", spec.name, err);
            return Err(fail(Status::INVALID_OPERATION));
        }
        Ok(())
    }

    fn barrier(&self) -> gpunum_compute::Result<()> {
        self.wait();
        Ok(())
    }

    fn max_work_group_size(&self, kernel: KernelHandle) -> gpunum_compute::Result<usize> {
        let state = self.lock();
        let instance = state.kernels.get(&kernel.0).ok_or_else(|| {
            DeviceError::execution(
                "max_work_group_size",
                format!("{:?}", kernel),
                Status::INVALID_KERNEL,
            )
        })?;
        Ok(instance.spec.work_group_size())
    }

    fn release_kernel(&self, kernel: KernelHandle) {
        self.lock().kernels.remove(&kernel.0);
    }
}
