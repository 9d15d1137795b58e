//! Error types for the OpenCL backend.

use gpunum_compute::DeviceError;
use thiserror::Error;

/// Errors raised while bringing up an OpenCL device.
#[derive(Debug, Error)]
pub enum OpenClError {
    /// No OpenCL platform exposes a device.
    #[error("No OpenCL device found")]
    NoDevice,

    /// The selected device lacks `cl_khr_fp64`.
    #[error("Device {0} does not support double precision")]
    NoDoublePrecision(String),

    /// An OpenCL call failed with the given error code.
    #[error("{operation} failed with OpenCL error {code}")]
    Api { operation: &'static str, code: i32 },

    /// The kernel program failed to build; carries the build log.
    #[error("Kernel program build failed: {0}")]
    Build(String),
}

impl From<OpenClError> for DeviceError {
    fn from(err: OpenClError) -> Self {
        DeviceError::BackendInit(err.to_string())
    }
}

/// Result type for backend setup.
pub type Result<T> = std::result::Result<T, OpenClError>;
