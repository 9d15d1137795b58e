//! OpenCL backend for gpunum.
//!
//! [`OpenClContext`] builds the solver kernels from OpenCL C source at
//! startup and runs them in double precision. Devices without
//! `cl_khr_fp64` are rejected.

pub mod context;
pub mod error;

pub use context::{KERNEL_SOURCE, OpenClContext};
pub use error::{OpenClError, Result};
