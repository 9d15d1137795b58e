//! Capability interface a compute backend exposes to the solvers.
//!
//! A context owns the device, its command queue and a compiled program with
//! named entry points. Solvers only ever talk to it through [`ComputeContext`];
//! device enumeration and program compilation stay inside the backend.

use crate::error::Result;
use crate::kernel::ExecutionGeometry;
use std::sync::Arc;

/// Size in bytes of one device scalar. All buffers hold `f64` elements.
pub const ELEMENT_BYTES: usize = std::mem::size_of::<f64>();

/// How kernels may access a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Whether kernels may write into a buffer with this mode.
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

/// Opaque handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Opaque handle to a resolved kernel entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub u64);

/// A single positional kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Buffer(BufferHandle),
    F32(f32),
    U32(u32),
    I32(i32),
}

impl KernelArg {
    /// Byte size the argument occupies in the kernel's parameter slot.
    pub fn size(&self) -> usize {
        match self {
            KernelArg::Buffer(_) => std::mem::size_of::<usize>(),
            KernelArg::F32(_) => std::mem::size_of::<f32>(),
            KernelArg::U32(_) => std::mem::size_of::<u32>(),
            KernelArg::I32(_) => std::mem::size_of::<i32>(),
        }
    }
}

/// Operations a compute backend provides.
///
/// All methods take `&self`; implementations keep their queue and handle
/// tables behind interior mutability. Calls from one computation are issued
/// from a single thread in program order.
pub trait ComputeContext {
    /// Human-readable device name.
    fn device_name(&self) -> String;

    /// Reserve a buffer of `len` elements, optionally copying `initial` into it.
    fn allocate_buffer(
        &self,
        len: usize,
        access: AccessMode,
        initial: Option<&[f64]>,
    ) -> Result<BufferHandle>;

    /// Copy host data into a buffer.
    fn enqueue_write(&self, buffer: BufferHandle, data: &[f64], blocking: bool) -> Result<()>;

    /// Copy a buffer into host memory.
    fn enqueue_read(&self, buffer: BufferHandle, out: &mut [f64], blocking: bool) -> Result<()>;

    /// Copy the whole of `src` into `dst`. Both must have the same length.
    fn enqueue_copy(&self, src: BufferHandle, dst: BufferHandle) -> Result<()>;

    /// Release a buffer. Unknown or already released handles are ignored.
    fn release_buffer(&self, buffer: BufferHandle);

    /// Look up a kernel entry point by name.
    fn resolve_kernel(&self, name: &str) -> Result<KernelHandle>;

    /// Bind one argument to a kernel parameter slot.
    fn bind_argument(&self, kernel: KernelHandle, index: u32, arg: &KernelArg) -> Result<()>;

    /// Enqueue a kernel for execution with the given geometry.
    fn enqueue_execute(&self, kernel: KernelHandle, geometry: &ExecutionGeometry) -> Result<()>;

    /// Block until all previously enqueued work has completed.
    fn barrier(&self) -> Result<()>;

    /// Largest work-group size the device accepts for this kernel.
    fn max_work_group_size(&self, kernel: KernelHandle) -> Result<usize>;

    /// Release a kernel handle. Unknown or already released handles are ignored.
    fn release_kernel(&self, kernel: KernelHandle);
}

impl<C: ComputeContext + ?Sized> ComputeContext for &C {
    fn device_name(&self) -> String {
        (**self).device_name()
    }

    fn allocate_buffer(
        &self,
        len: usize,
        access: AccessMode,
        initial: Option<&[f64]>,
    ) -> Result<BufferHandle> {
        (**self).allocate_buffer(len, access, initial)
    }

    fn enqueue_write(&self, buffer: BufferHandle, data: &[f64], blocking: bool) -> Result<()> {
        (**self).enqueue_write(buffer, data, blocking)
    }

    fn enqueue_read(&self, buffer: BufferHandle, out: &mut [f64], blocking: bool) -> Result<()> {
        (**self).enqueue_read(buffer, out, blocking)
    }

    fn enqueue_copy(&self, src: BufferHandle, dst: BufferHandle) -> Result<()> {
        (**self).enqueue_copy(src, dst)
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        (**self).release_buffer(buffer)
    }

    fn resolve_kernel(&self, name: &str) -> Result<KernelHandle> {
        (**self).resolve_kernel(name)
    }

    fn bind_argument(&self, kernel: KernelHandle, index: u32, arg: &KernelArg) -> Result<()> {
        (**self).bind_argument(kernel, index, arg)
    }

    fn enqueue_execute(&self, kernel: KernelHandle, geometry: &ExecutionGeometry) -> Result<()> {
        (**self).enqueue_execute(kernel, geometry)
    }

    fn barrier(&self) -> Result<()> {
        (**self).barrier()
    }

    fn max_work_group_size(&self, kernel: KernelHandle) -> Result<usize> {
        (**self).max_work_group_size(kernel)
    }

    fn release_kernel(&self, kernel: KernelHandle) {
        (**self).release_kernel(kernel)
    }
}

impl<C: ComputeContext + ?Sized> ComputeContext for Arc<C> {
    fn device_name(&self) -> String {
        (**self).device_name()
    }

    fn allocate_buffer(
        &self,
        len: usize,
        access: AccessMode,
        initial: Option<&[f64]>,
    ) -> Result<BufferHandle> {
        (**self).allocate_buffer(len, access, initial)
    }

    fn enqueue_write(&self, buffer: BufferHandle, data: &[f64], blocking: bool) -> Result<()> {
        (**self).enqueue_write(buffer, data, blocking)
    }

    fn enqueue_read(&self, buffer: BufferHandle, out: &mut [f64], blocking: bool) -> Result<()> {
        (**self).enqueue_read(buffer, out, blocking)
    }

    fn enqueue_copy(&self, src: BufferHandle, dst: BufferHandle) -> Result<()> {
        (**self).enqueue_copy(src, dst)
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        (**self).release_buffer(buffer)
    }

    fn resolve_kernel(&self, name: &str) -> Result<KernelHandle> {
        (**self).resolve_kernel(name)
    }

    fn bind_argument(&self, kernel: KernelHandle, index: u32, arg: &KernelArg) -> Result<()> {
        (**self).bind_argument(kernel, index, arg)
    }

    fn enqueue_execute(&self, kernel: KernelHandle, geometry: &ExecutionGeometry) -> Result<()> {
        (**self).enqueue_execute(kernel, geometry)
    }

    fn barrier(&self) -> Result<()> {
        (**self).barrier()
    }

    fn max_work_group_size(&self, kernel: KernelHandle) -> Result<usize> {
        (**self).max_work_group_size(kernel)
    }

    fn release_kernel(&self, kernel: KernelHandle) {
        (**self).release_kernel(kernel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_sizes() {
        assert_eq!(KernelArg::F32(0.5).size(), 4);
        assert_eq!(KernelArg::U32(3).size(), 4);
        assert_eq!(KernelArg::I32(-1).size(), 4);
        assert_eq!(
            KernelArg::Buffer(BufferHandle(1)).size(),
            std::mem::size_of::<usize>()
        );
    }

    #[test]
    fn access_modes() {
        assert!(!AccessMode::ReadOnly.is_writable());
        assert!(AccessMode::WriteOnly.is_writable());
        assert!(AccessMode::ReadWrite.is_writable());
    }
}
