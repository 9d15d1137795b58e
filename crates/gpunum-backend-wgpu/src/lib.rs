//! WebGPU backend for gpunum.
//!
//! [`WgpuContext`] runs the solver kernels as WGSL compute pipelines on any
//! adapter wgpu can open (Metal, Vulkan, DX12). Device arithmetic is single
//! precision.

pub mod context;
pub mod error;
pub mod kernels;

pub use context::WgpuContext;
pub use error::{Result, WgpuError};
