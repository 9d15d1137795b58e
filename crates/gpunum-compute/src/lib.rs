//! Device-side plumbing shared by the gpunum solvers.
//!
//! This crate defines the capability interface a compute backend provides
//! ([`ComputeContext`]), the scoped buffer manager the solvers allocate
//! through ([`BufferScope`]), the kernel invocation protocol (argument
//! binding, execution geometry, dispatch) and a host reference device used
//! for testing and as a fallback when no accelerator is present.
//!
//! # Module Structure
//!
//! - [`context`] - Capability trait, handles and argument types
//! - [`buffer`] - Scoped buffer and kernel-handle ownership
//! - [`kernel`] - Binding, geometry and dispatch
//! - [`host`] - Host reference device with call log and fault injection
//! - [`error`] - Device error taxonomy

pub mod buffer;
pub mod context;
pub mod error;
pub mod host;
pub mod kernel;

pub use buffer::{BufferScope, DeviceBuffer};
pub use context::{AccessMode, BufferHandle, ComputeContext, ELEMENT_BYTES, KernelArg, KernelHandle};
pub use error::{DeviceError, Result, Status};
pub use host::{CallLog, HostArgs, HostDevice, HostDeviceConfig, HostKernel, KernelResult, Operation};
pub use kernel::{ExecutionGeometry, bind_arguments, dispatch, launch};
