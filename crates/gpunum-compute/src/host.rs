//! Host reference device.
//!
//! [`HostDevice`] implements [`ComputeContext`] in ordinary host memory.
//! Kernels are Rust closures registered by name; they receive the launch
//! geometry and their bound arguments and loop over the global ids
//! themselves. The device validates argument binding and geometry the way a
//! real runtime does, records every call in a [`CallLog`], and can be told
//! to fail the Nth call of any operation.

use crate::context::{AccessMode, BufferHandle, ComputeContext, ELEMENT_BYTES, KernelArg, KernelHandle};
use crate::error::{DeviceError, Result, Status};
use crate::kernel::ExecutionGeometry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of a host kernel body; the message ends up in the log.
pub type KernelResult = std::result::Result<(), String>;

type KernelBody = dyn Fn(&ExecutionGeometry, &mut HostArgs) -> KernelResult + Send + Sync;

/// A kernel entry point on the host device.
#[derive(Clone)]
pub struct HostKernel {
    arity: u32,
    max_work_group_size: Option<usize>,
    body: Arc<KernelBody>,
}

impl HostKernel {
    /// Create a kernel taking `arity` arguments.
    pub fn new<F>(arity: u32, body: F) -> Self
    where
        F: Fn(&ExecutionGeometry, &mut HostArgs) -> KernelResult + Send + Sync + 'static,
    {
        Self {
            arity,
            max_work_group_size: None,
            body: Arc::new(body),
        }
    }

    /// Override the device-wide work-group limit for this kernel.
    pub fn with_max_work_group_size(mut self, max: usize) -> Self {
        self.max_work_group_size = Some(max);
        self
    }

    pub fn arity(&self) -> u32 {
        self.arity
    }
}

impl std::fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostKernel")
            .field("arity", &self.arity)
            .field("max_work_group_size", &self.max_work_group_size)
            .finish_non_exhaustive()
    }
}

/// Arguments handed to a host kernel body, in slot order.
#[derive(Debug)]
pub struct HostArgs {
    slots: Vec<HostValue>,
}

#[derive(Debug)]
enum HostValue {
    Buffer { data: Vec<f64>, access: AccessMode },
    F32(f32),
    U32(u32),
    I32(i32),
}

impl HostArgs {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Contents of the buffer bound at `index`.
    pub fn buffer(&self, index: usize) -> std::result::Result<&[f64], String> {
        match self.slots.get(index) {
            Some(HostValue::Buffer { data, .. }) => Ok(data.as_slice()),
            _ => Err(format!("argument {} is not a buffer", index)),
        }
    }

    /// Mutable contents of the buffer bound at `index`.
    pub fn buffer_mut(&mut self, index: usize) -> std::result::Result<&mut [f64], String> {
        match self.slots.get_mut(index) {
            Some(HostValue::Buffer { data, access }) if access.is_writable() => {
                Ok(data.as_mut_slice())
            }
            Some(HostValue::Buffer { .. }) => Err(format!("argument {} is read-only", index)),
            _ => Err(format!("argument {} is not a buffer", index)),
        }
    }

    /// Borrow one buffer for reading and another for writing.
    pub fn buffers(
        &mut self,
        src: usize,
        dst: usize,
    ) -> std::result::Result<(&[f64], &mut [f64]), String> {
        if src == dst {
            return Err(format!("argument {} used as both source and destination", src));
        }
        let mut src_slot = None;
        let mut dst_slot = None;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i == src {
                src_slot = Some(slot);
            } else if i == dst {
                dst_slot = Some(slot);
            }
        }
        match (src_slot, dst_slot) {
            (
                Some(HostValue::Buffer { data: input, .. }),
                Some(HostValue::Buffer {
                    data: output,
                    access,
                }),
            ) => {
                if !access.is_writable() {
                    return Err(format!("argument {} is read-only", dst));
                }
                Ok((input.as_slice(), output.as_mut_slice()))
            }
            _ => Err(format!("arguments {} and {} must both be buffers", src, dst)),
        }
    }

    pub fn f32(&self, index: usize) -> std::result::Result<f32, String> {
        match self.slots.get(index) {
            Some(HostValue::F32(v)) => Ok(*v),
            _ => Err(format!("argument {} is not a float", index)),
        }
    }

    pub fn u32(&self, index: usize) -> std::result::Result<u32, String> {
        match self.slots.get(index) {
            Some(HostValue::U32(v)) => Ok(*v),
            _ => Err(format!("argument {} is not an unsigned int", index)),
        }
    }

    pub fn i32(&self, index: usize) -> std::result::Result<i32, String> {
        match self.slots.get(index) {
            Some(HostValue::I32(v)) => Ok(*v),
            _ => Err(format!("argument {} is not an int", index)),
        }
    }
}

/// Operations on the host device that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Allocate,
    Write,
    Read,
    Copy,
    Resolve,
    Bind,
    Execute,
    Barrier,
}

/// Counts of the calls a host device has served.
///
/// Only successful allocations count; `releases` counts buffers actually
/// freed and `redundant_releases` the no-op calls on unknown handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLog {
    pub allocations: usize,
    pub releases: usize,
    pub redundant_releases: usize,
    pub writes: usize,
    pub reads: usize,
    pub copies: usize,
    pub resolutions: usize,
    pub kernel_releases: usize,
    pub binds: usize,
    /// Parameter bytes written by successful binds.
    pub bound_bytes: usize,
    pub dispatches: usize,
    pub barriers: usize,
    /// Names of the kernels dispatched, in order.
    pub dispatched: Vec<String>,
}

/// Configuration for a [`HostDevice`].
#[derive(Debug, Clone)]
pub struct HostDeviceConfig {
    /// Name reported by `device_name`.
    pub name: String,
    /// Work-group limit for kernels that do not set their own.
    pub max_work_group_size: usize,
}

impl Default for HostDeviceConfig {
    fn default() -> Self {
        Self {
            name: "host reference device".to_string(),
            max_work_group_size: 256,
        }
    }
}

impl HostDeviceConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_work_group_size(mut self, max: usize) -> Self {
        self.max_work_group_size = max;
        self
    }
}

#[derive(Debug)]
struct Fault {
    operation: Operation,
    nth: usize,
    status: Status,
}

#[derive(Debug)]
struct HostBuffer {
    data: Vec<f64>,
    access: AccessMode,
}

#[derive(Debug)]
struct KernelInstance {
    name: String,
    kernel: HostKernel,
    args: Vec<Option<KernelArg>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    buffers: HashMap<u64, HostBuffer>,
    kernels: HashMap<u64, KernelInstance>,
    log: CallLog,
    faults: Vec<Fault>,
    calls: HashMap<Operation, usize>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Count a call and return the injected status if it should fail.
    fn tick(&mut self, operation: Operation) -> Option<Status> {
        let count = self.calls.entry(operation).or_insert(0);
        *count += 1;
        let count = *count;
        self.faults
            .iter()
            .find(|f| f.operation == operation && f.nth == count)
            .map(|f| f.status)
    }
}

/// Software compute device running registered kernels on the host.
#[derive(Debug)]
pub struct HostDevice {
    config: HostDeviceConfig,
    registry: HashMap<String, HostKernel>,
    state: Mutex<State>,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new(HostDeviceConfig::default())
    }
}

impl HostDevice {
    pub fn new(config: HostDeviceConfig) -> Self {
        Self {
            config,
            registry: HashMap::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Register a kernel entry point.
    pub fn with_kernel(mut self, name: impl Into<String>, kernel: HostKernel) -> Self {
        self.registry.insert(name.into(), kernel);
        self
    }

    /// Make the `nth` call (1-based, counted from device creation) of
    /// `operation` fail with `status`.
    pub fn fail_at(&self, operation: Operation, nth: usize, status: Status) {
        self.lock().faults.push(Fault {
            operation,
            nth,
            status,
        });
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Snapshot of the calls served so far.
    pub fn log(&self) -> CallLog {
        self.lock().log.clone()
    }

    /// Buffers allocated and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Kernel handles resolved and not yet released.
    pub fn live_kernels(&self) -> usize {
        self.lock().kernels.len()
    }

    pub fn config(&self) -> &HostDeviceConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ComputeContext for HostDevice {
    fn device_name(&self) -> String {
        self.config.name.clone()
    }

    fn allocate_buffer(
        &self,
        len: usize,
        access: AccessMode,
        initial: Option<&[f64]>,
    ) -> Result<BufferHandle> {
        let mut state = self.lock();
        let bytes = len * ELEMENT_BYTES;
        if let Some(status) = state.tick(Operation::Allocate) {
            return Err(DeviceError::Allocation {
                operation: "allocate_buffer",
                bytes,
                status,
            });
        }
        let data = match initial {
            Some(init) if init.len() != len => {
                return Err(DeviceError::Allocation {
                    operation: "allocate_buffer",
                    bytes,
                    status: Status::INVALID_HOST_PTR,
                });
            }
            Some(init) => init.to_vec(),
            None => vec![0.0; len],
        };
        let id = state.next_id();
        state.buffers.insert(id, HostBuffer { data, access });
        state.log.allocations += 1;
        Ok(BufferHandle(id))
    }

    fn enqueue_write(&self, buffer: BufferHandle, data: &[f64], _blocking: bool) -> Result<()> {
        let mut state = self.lock();
        let transfer = |status| DeviceError::Transfer {
            operation: "enqueue_write",
            status,
        };
        if let Some(status) = state.tick(Operation::Write) {
            return Err(transfer(status));
        }
        let target = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        if target.data.len() != data.len() {
            return Err(transfer(Status::INVALID_VALUE));
        }
        target.data.copy_from_slice(data);
        state.log.writes += 1;
        Ok(())
    }

    fn enqueue_read(&self, buffer: BufferHandle, out: &mut [f64], _blocking: bool) -> Result<()> {
        let mut state = self.lock();
        let transfer = |status| DeviceError::Transfer {
            operation: "enqueue_read",
            status,
        };
        if let Some(status) = state.tick(Operation::Read) {
            return Err(transfer(status));
        }
        let source = state
            .buffers
            .get(&buffer.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        if source.data.len() != out.len() {
            return Err(transfer(Status::INVALID_VALUE));
        }
        out.copy_from_slice(&source.data);
        state.log.reads += 1;
        Ok(())
    }

    fn enqueue_copy(&self, src: BufferHandle, dst: BufferHandle) -> Result<()> {
        let mut state = self.lock();
        let transfer = |status| DeviceError::Transfer {
            operation: "enqueue_copy",
            status,
        };
        if let Some(status) = state.tick(Operation::Copy) {
            return Err(transfer(status));
        }
        let data = state
            .buffers
            .get(&src.0)
            .map(|b| b.data.clone())
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        let target = state
            .buffers
            .get_mut(&dst.0)
            .ok_or(transfer(Status::INVALID_MEM_OBJECT))?;
        if target.data.len() != data.len() {
            return Err(transfer(Status::INVALID_VALUE));
        }
        target.data = data;
        state.log.copies += 1;
        Ok(())
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        let mut state = self.lock();
        if state.buffers.remove(&buffer.0).is_some() {
            state.log.releases += 1;
        } else {
            state.log.redundant_releases += 1;
        }
    }

    fn resolve_kernel(&self, name: &str) -> Result<KernelHandle> {
        let mut state = self.lock();
        if let Some(status) = state.tick(Operation::Resolve) {
            return Err(DeviceError::execution("resolve_kernel", name, status));
        }
        let kernel = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| DeviceError::KernelNotFound {
                name: name.to_string(),
            })?;
        let id = state.next_id();
        let args = vec![None; kernel.arity as usize];
        state.kernels.insert(
            id,
            KernelInstance {
                name: name.to_string(),
                kernel,
                args,
            },
        );
        state.log.resolutions += 1;
        Ok(KernelHandle(id))
    }

    fn bind_argument(&self, kernel: KernelHandle, index: u32, arg: &KernelArg) -> Result<()> {
        let mut state = self.lock();
        let injected = state.tick(Operation::Bind);
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
            kernel: instance.name.clone(),
            index,
            status,
        };
        if let Some(status) = injected {
            return Err(fail(status));
        }
        if index >= instance.kernel.arity {
            return Err(fail(Status::INVALID_ARG_INDEX));
        }
        if !buffer_known {
            return Err(fail(Status::INVALID_MEM_OBJECT));
        }
        instance.args[index as usize] = Some(*arg);
        state.log.binds += 1;
        state.log.bound_bytes += arg.size();
        Ok(())
    }

    fn enqueue_execute(&self, kernel: KernelHandle, geometry: &ExecutionGeometry) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let injected = state.tick(Operation::Execute);
        let instance = state.kernels.get(&kernel.0).ok_or_else(|| {
            DeviceError::execution("enqueue_execute", format!("{:?}", kernel), Status::INVALID_KERNEL)
        })?;
        let fail = |status| DeviceError::execution("enqueue_execute", instance.name.clone(), status);
        if let Some(status) = injected {
            return Err(fail(status));
        }

        let limit = instance
            .kernel
            .max_work_group_size
            .unwrap_or(self.config.max_work_group_size);
        if geometry.work_group_size() > limit {
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

        let mut bound = Vec::with_capacity(instance.args.len());
        for arg in &instance.args {
            match arg {
                Some(arg) => bound.push(*arg),
                None => return Err(fail(Status::INVALID_KERNEL_ARGS)),
            }
        }
        let mut seen = Vec::new();
        for arg in &bound {
            if let KernelArg::Buffer(handle) = arg {
                if seen.contains(handle) || !state.buffers.contains_key(&handle.0) {
                    return Err(fail(Status::INVALID_MEM_OBJECT));
                }
                seen.push(*handle);
            }
        }

        let name = instance.name.clone();
        let body = Arc::clone(&instance.kernel.body);

        // Move buffer contents into the argument list for the duration of the
        // launch and put them back afterwards, even if the body fails.
        let mut args = HostArgs {
            slots: Vec::with_capacity(bound.len()),
        };
        for arg in &bound {
            let value = match arg {
                KernelArg::Buffer(handle) => {
                    let buffer = state
                        .buffers
                        .get_mut(&handle.0)
                        .ok_or(DeviceError::execution(
                            "enqueue_execute",
                            name.clone(),
                            Status::INVALID_MEM_OBJECT,
                        ))?;
                    HostValue::Buffer {
                        data: std::mem::take(&mut buffer.data),
                        access: buffer.access,
                    }
                }
                KernelArg::F32(v) => HostValue::F32(*v),
                KernelArg::U32(v) => HostValue::U32(*v),
                KernelArg::I32(v) => HostValue::I32(*v),
            };
            args.slots.push(value);
        }

        let outcome = body(geometry, &mut args);

        for (arg, value) in bound.iter().zip(args.slots) {
            if let (KernelArg::Buffer(handle), HostValue::Buffer { data, .. }) = (arg, value) {
                if let Some(buffer) = state.buffers.get_mut(&handle.0) {
                    buffer.data = data;
                }
            }
        }

        state.log.dispatches += 1;
        state.log.dispatched.push(name.clone());
        outcome.map_err(|message| {
            log::warn!("Host kernel `{}` failed: {}", name, message);
            DeviceError::execution("enqueue_execute", name, Status::OUT_OF_RESOURCES)
        })
    }

    fn barrier(&self) -> Result<()> {
        let mut state = self.lock();
        if let Some(status) = state.tick(Operation::Barrier) {
            return Err(DeviceError::execution("barrier", "command queue", status));
        }
        state.log.barriers += 1;
        Ok(())
    }

    fn max_work_group_size(&self, kernel: KernelHandle) -> Result<usize> {
        let state = self.lock();
        let instance = state.kernels.get(&kernel.0).ok_or_else(|| {
            DeviceError::execution(
                "max_work_group_size",
                format!("{:?}", kernel),
                Status::INVALID_KERNEL,
            )
        })?;
        Ok(instance
            .kernel
            .max_work_group_size
            .unwrap_or(self.config.max_work_group_size))
    }

    fn release_kernel(&self, kernel: KernelHandle) {
        let mut state = self.lock();
        if state.kernels.remove(&kernel.0).is_some() {
            state.log.kernel_releases += 1;
        }
    }
}
