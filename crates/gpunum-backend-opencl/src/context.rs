//! [`ComputeContext`] over an OpenCL command queue.
//!
//! Buffers hold `cl_double` elements, so host data crosses the bus
//! unchanged. OpenCL error codes are passed through as [`Status`] values.

use crate::error::{OpenClError, Result};
use gpunum_compute::{
    AccessMode, BufferHandle, ComputeContext, DeviceError, ExecutionGeometry, KernelArg,
    KernelHandle, Status,
};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_GPU, Device, get_all_devices};
use opencl3::error_codes::ClError;
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY, ClMem};
use opencl3::program::Program;
use opencl3::types::{CL_BLOCKING, cl_double, cl_mem_flags};
use std::collections::HashMap;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Kernel program source.
pub const KERNEL_SOURCE: &str = include_str!("../kernels/gpunum.cl");

const BUILD_OPTIONS: &str = "-cl-std=CL1.2";

fn status(err: ClError) -> Status {
    Status(err.0)
}

fn mem_flags(access: AccessMode) -> cl_mem_flags {
    match access {
        AccessMode::ReadOnly => CL_MEM_READ_ONLY,
        AccessMode::WriteOnly => CL_MEM_WRITE_ONLY,
        AccessMode::ReadWrite => CL_MEM_READ_WRITE,
    }
}

struct ClBuffer {
    buffer: Buffer<cl_double>,
    len: usize,
}

struct ClKernel {
    name: String,
    kernel: Kernel,
}

#[derive(Default)]
struct State {
    next_id: u64,
    buffers: HashMap<u64, ClBuffer>,
    kernels: HashMap<u64, ClKernel>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// OpenCL device, context, queue and the built kernel program.
pub struct OpenClContext {
    device: Device,
    device_name: String,
    context: Context,
    queue: CommandQueue,
    program: Program,
    state: Mutex<State>,
}

// SAFETY: OpenCL 1.2 context, command queue, program, kernel and memory
// objects are thread safe; opencl3 wraps them as opaque handles. Kernel
// argument state is only touched under the state mutex.
unsafe impl Send for OpenClContext {}
unsafe impl Sync for OpenClContext {}

impl std::fmt::Debug for OpenClContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClContext")
            .field("device_name", &self.device_name)
            .finish_non_exhaustive()
    }
}

impl OpenClContext {
    /// Create a context on the first GPU, or the first device of any type.
    pub fn new() -> Result<Self> {
        let all_ids = get_all_devices(CL_DEVICE_TYPE_ALL).map_err(|e| OpenClError::Api {
            operation: "get_all_devices",
            code: e.0,
        })?;
        let gpu_ids = get_all_devices(CL_DEVICE_TYPE_GPU).unwrap_or_default();
        let selected = gpu_ids
            .first()
            .or_else(|| all_ids.first())
            .copied()
            .ok_or(OpenClError::NoDevice)?;

        let device = Device::new(selected);
        let device_name = device.name().unwrap_or_default().trim().to_string();
        let extensions = device.extensions().unwrap_or_default();
        if !extensions.contains("cl_khr_fp64") {
            return Err(OpenClError::NoDoublePrecision(device_name));
        }

        let context = Context::from_device(&device).map_err(|e| OpenClError::Api {
            operation: "create_context",
            code: e.0,
        })?;
        // create_default is the OpenCL 1.2 entry point; newer queue
        // properties are not needed here.
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, 0).map_err(|e| OpenClError::Api {
            operation: "create_command_queue",
            code: e.0,
        })?;
        let program = Program::create_and_build_from_source(&context, KERNEL_SOURCE, BUILD_OPTIONS)
            .map_err(OpenClError::Build)?;

        log::info!("Created OpenCL context on {}", device_name);

        Ok(Self {
            device,
            device_name,
            context,
            queue,
            program,
            state: Mutex::new(State::default()),
        })
    }

    /// Whether any OpenCL device is present.
    pub fn is_available() -> bool {
        get_all_devices(CL_DEVICE_TYPE_ALL).is_ok_and(|ids| !ids.is_empty())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ComputeContext for OpenClContext {
    fn device_name(&self) -> String {
        self.device_name.clone()
    }

    fn allocate_buffer(
        &self,
        len: usize,
        access: AccessMode,
        initial: Option<&[f64]>,
    ) -> gpunum_compute::Result<BufferHandle> {
        let bytes = len * std::mem::size_of::<cl_double>();
        let fail = |status| DeviceError::Allocation {
            operation: "allocate_buffer",
            bytes,
            status,
        };
        if initial.is_some_and(|data| data.len() != len) {
            return Err(fail(Status::INVALID_HOST_PTR));
        }

        // SAFETY: no host pointer is handed to the runtime; initial data is
        // copied with a blocking write below.
        let mut buffer = unsafe {
            Buffer::<cl_double>::create(&self.context, mem_flags(access), len.max(1), ptr::null_mut())
        }
        .map_err(|e| fail(status(e)))?;

        if let Some(data) = initial.filter(|d| !d.is_empty()) {
            // SAFETY: the write blocks, so `data` outlives the transfer.
            unsafe {
                self.queue
                    .enqueue_write_buffer(&mut buffer, CL_BLOCKING, 0, data, &[])
            }
            .map_err(|e| fail(status(e)))?;
        }

        let mut state = self.lock();
        let id = state.next_id();
        state.buffers.insert(id, ClBuffer { buffer, len });
        Ok(BufferHandle(id))
    }

    /// Writes always block; the host slice is only borrowed for the call.
    fn enqueue_write(
        &self,
        buffer: BufferHandle,
        data: &[f64],
        _blocking: bool,
    ) -> gpunum_compute::Result<()> {
        let transfer = |status| DeviceError::Transfer {
            operation: "enqueue_write",
            status,
        };
        let mut state = self.lock();
        let target = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        if target.len != data.len() {
            return Err(transfer(Status::INVALID_VALUE));
        }
        if data.is_empty() {
            return Ok(());
        }
        // SAFETY: blocking write; `data` outlives the transfer.
        unsafe {
            self.queue
                .enqueue_write_buffer(&mut target.buffer, CL_BLOCKING, 0, data, &[])
        }
        .map_err(|e| transfer(status(e)))?;
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
        // SAFETY: blocking read into a live, correctly sized slice.
        unsafe {
            self.queue
                .enqueue_read_buffer(&source.buffer, CL_BLOCKING, 0, out, &[])
        }
        .map_err(|e| transfer(status(e)))?;
        Ok(())
    }

    fn enqueue_copy(&self, src: BufferHandle, dst: BufferHandle) -> gpunum_compute::Result<()> {
        let transfer = |status| DeviceError::Transfer {
            operation: "enqueue_copy",
            status,
        };
        if src == dst {
            return Err(transfer(Status::INVALID_MEM_OBJECT));
        }
        let mut state = self.lock();
        let mut target = state
            .buffers
            .remove(&dst.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        let result = match state.buffers.get(&src.0) {
            None => Err(transfer(Status::INVALID_MEM_OBJECT)),
            Some(source) if source.len != target.len => Err(transfer(Status::INVALID_VALUE)),
            Some(_) if target.len == 0 => Ok(()),
            Some(source) => {
                let size = source.len * std::mem::size_of::<cl_double>();
                // SAFETY: both buffers are live and at least `size` bytes.
                unsafe {
                    self.queue
                        .enqueue_copy_buffer(&source.buffer, &mut target.buffer, 0, 0, size, &[])
                }
                .map(|_| ())
                .map_err(|e| transfer(status(e)))
            }
        };
        state.buffers.insert(dst.0, target);
        result
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        self.lock().buffers.remove(&buffer.0);
    }

    fn resolve_kernel(&self, name: &str) -> gpunum_compute::Result<KernelHandle> {
        let kernel = Kernel::create(&self.program, name).map_err(|e| {
            if e.0 == Status::INVALID_KERNEL_NAME.0 {
                DeviceError::KernelNotFound {
                    name: name.to_string(),
                }
            } else {
                DeviceError::execution("resolve_kernel", name, status(e))
            }
        })?;
        let mut state = self.lock();
        let id = state.next_id();
        state.kernels.insert(
            id,
            ClKernel {
                name: name.to_string(),
                kernel,
            },
        );
        Ok(KernelHandle(id))
    }

    fn bind_argument(
        &self,
        kernel: KernelHandle,
        index: u32,
        arg: &KernelArg,
    ) -> gpunum_compute::Result<()> {
        let state = self.lock();
        let Some(instance) = state.kernels.get(&kernel.0) else {
            return Err(DeviceError::Bind {
                kernel: format!("{:?}", kernel),
                index,
                status: Status::INVALID_KERNEL,
            });
        };
        let fail = |status| DeviceError::Bind {
            kernel: instance.name.clone(),
            index,
            status,
        };

        // SAFETY: each value matches the size of the declared kernel
        // parameter; the runtime rejects mismatches with an error code.
        let result = unsafe {
            match arg {
                KernelArg::Buffer(handle) => {
                    let buffer = state
                        .buffers
                        .get(&handle.0)
                        .ok_or(fail(Status::INVALID_MEM_OBJECT))?;
                    instance.kernel.set_arg(index, &buffer.buffer.get())
                }
                KernelArg::F32(v) => instance.kernel.set_arg(index, v),
                KernelArg::U32(v) => instance.kernel.set_arg(index, v),
                KernelArg::I32(v) => instance.kernel.set_arg(index, v),
            }
        };
        result.map_err(|e| fail(status(e)))
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
        log::debug!(
            "OpenCL dispatch `{}`: global={:?} local={:?}",
            instance.name,
            geometry.global(),
            geometry.local()
        );
        // SAFETY: global and local hold `dims` sizes each and outlive the call.
        unsafe {
            self.queue.enqueue_nd_range_kernel(
                instance.kernel.get(),
                geometry.dims(),
                ptr::null(),
                geometry.global().as_ptr(),
                geometry.local().as_ptr(),
                &[],
            )
        }
        .map(|_| ())
        .map_err(|e| DeviceError::execution("enqueue_execute", instance.name.clone(), status(e)))
    }

    fn barrier(&self) -> gpunum_compute::Result<()> {
        self.queue
            .finish()
            .map_err(|e| DeviceError::execution("barrier", "command queue", status(e)))
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
        instance
            .kernel
            .get_work_group_size(self.device.id())
            .map_err(|e| DeviceError::execution("max_work_group_size", instance.name.clone(), status(e)))
    }

    fn release_kernel(&self, kernel: KernelHandle) {
        self.lock().kernels.remove(&kernel.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_create_context() -> Option<OpenClContext> {
        OpenClContext::new().ok()
    }

    #[test]
    fn kernel_source_exports_solver_entry_points() {
        for name in ["computeBezierControlPoints", "scaleRow", "subtractRow", "swapRows"] {
            assert!(KERNEL_SOURCE.contains(&format!("__kernel void {}(", name)));
        }
        assert!(KERNEL_SOURCE.contains("cl_khr_fp64"));
    }

    #[test]
    fn access_modes_map_to_mem_flags() {
        assert_eq!(mem_flags(AccessMode::ReadOnly), CL_MEM_READ_ONLY);
        assert_eq!(mem_flags(AccessMode::ReadWrite), CL_MEM_READ_WRITE);
    }

    #[test]
    fn test_double_precision_round_trip() {
        let ctx = match try_create_context() {
            Some(c) => c,
            None => {
                eprintln!("Skipping test: no OpenCL device available");
                return;
            }
        };

        let data = [0.1, 1.0 / 3.0, -7.25e-300, 123456.789];
        let a = ctx
            .allocate_buffer(4, AccessMode::ReadWrite, Some(&data))
            .unwrap();
        let b = ctx.allocate_buffer(4, AccessMode::ReadWrite, None).unwrap();
        ctx.enqueue_copy(a, b).unwrap();
        let mut out = [0.0; 4];
        ctx.enqueue_read(b, &mut out, true).unwrap();
        assert_eq!(out, data);
        ctx.release_buffer(a);
        ctx.release_buffer(b);
    }

    #[test]
    fn test_unknown_kernel() {
        let ctx = match try_create_context() {
            Some(c) => c,
            None => {
                eprintln!("Skipping test: no OpenCL device available");
                return;
            }
        };
        assert!(matches!(
            ctx.resolve_kernel("transpose"),
            Err(DeviceError::KernelNotFound { .. })
        ));
    }
}
