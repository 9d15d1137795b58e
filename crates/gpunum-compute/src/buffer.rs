//! Scoped ownership of device buffers and kernel handles.
//!
//! A [`BufferScope`] is created at the start of a computation and dropped at
//! its end. Everything allocated or resolved through it is released exactly
//! once when it drops, whichever path the computation leaves by.

use crate::context::{AccessMode, BufferHandle, ComputeContext, ELEMENT_BYTES, KernelHandle};
use crate::error::{DeviceError, Result, Status};

/// A device buffer owned by a [`BufferScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBuffer {
    handle: BufferHandle,
    len: usize,
    access: AccessMode,
}

impl DeviceBuffer {
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Number of `f64` elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len * ELEMENT_BYTES
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }
}

/// Owns every buffer and kernel handle created during one computation.
pub struct BufferScope<'ctx, C: ComputeContext + ?Sized> {
    ctx: &'ctx C,
    buffers: Vec<BufferHandle>,
    kernels: Vec<KernelHandle>,
}

impl<'ctx, C: ComputeContext + ?Sized> BufferScope<'ctx, C> {
    pub fn new(ctx: &'ctx C) -> Self {
        Self {
            ctx,
            buffers: Vec::new(),
            kernels: Vec::new(),
        }
    }

    /// The context this scope allocates from.
    pub fn context(&self) -> &'ctx C {
        self.ctx
    }

    /// Allocate a buffer of `len` elements, copying `initial` into it if given.
    pub fn allocate(
        &mut self,
        len: usize,
        access: AccessMode,
        initial: Option<&[f64]>,
    ) -> Result<DeviceBuffer> {
        if let Some(data) = initial {
            if data.len() != len {
                return Err(DeviceError::Allocation {
                    operation: "allocate_buffer",
                    bytes: len * ELEMENT_BYTES,
                    status: Status::INVALID_HOST_PTR,
                });
            }
        }
        let handle = self.ctx.allocate_buffer(len, access, initial)?;
        self.buffers.push(handle);
        Ok(DeviceBuffer {
            handle,
            len,
            access,
        })
    }

    /// Copy host data into `buffer`.
    pub fn write(&self, buffer: &DeviceBuffer, data: &[f64], blocking: bool) -> Result<()> {
        check_len("enqueue_write", buffer, data.len())?;
        self.ctx.enqueue_write(buffer.handle, data, blocking)
    }

    /// Copy `buffer` into host memory.
    pub fn read(&self, buffer: &DeviceBuffer, out: &mut [f64], blocking: bool) -> Result<()> {
        check_len("enqueue_read", buffer, out.len())?;
        self.ctx.enqueue_read(buffer.handle, out, blocking)
    }

    /// Read a whole buffer into a fresh host vector.
    pub fn read_to_vec(&self, buffer: &DeviceBuffer) -> Result<Vec<f64>> {
        let mut out = vec![0.0; buffer.len];
        self.read(buffer, &mut out, true)?;
        Ok(out)
    }

    /// Copy `src` into `dst` on the device.
    pub fn copy(&self, src: &DeviceBuffer, dst: &DeviceBuffer) -> Result<()> {
        check_len("enqueue_copy", dst, src.len)?;
        self.ctx.enqueue_copy(src.handle, dst.handle)
    }

    /// Release a buffer early. Releasing it again, or letting the scope drop
    /// afterwards, does nothing further.
    pub fn release(&mut self, buffer: &DeviceBuffer) {
        if let Some(pos) = self.buffers.iter().position(|h| *h == buffer.handle) {
            self.buffers.swap_remove(pos);
            self.ctx.release_buffer(buffer.handle);
        }
    }

    /// Resolve a kernel by name; the handle is released with the scope.
    pub fn kernel(&mut self, name: &str) -> Result<KernelHandle> {
        let handle = self.ctx.resolve_kernel(name)?;
        self.kernels.push(handle);
        Ok(handle)
    }

    /// Number of buffers currently held.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl<C: ComputeContext + ?Sized> Drop for BufferScope<'_, C> {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            log::debug!("Releasing {} device buffers", self.buffers.len());
        }
        for handle in self.buffers.drain(..) {
            self.ctx.release_buffer(handle);
        }
        for handle in self.kernels.drain(..) {
            self.ctx.release_kernel(handle);
        }
    }
}

fn check_len(operation: &'static str, buffer: &DeviceBuffer, host_len: usize) -> Result<()> {
    if buffer.len != host_len {
        log::warn!(
            "{}: host array holds {} elements, buffer holds {}",
            operation,
            host_len,
            buffer.len
        );
        return Err(DeviceError::Transfer {
            operation,
            status: Status::INVALID_VALUE,
        });
    }
    Ok(())
}
