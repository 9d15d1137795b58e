//! Error types for the wgpu backend.

use gpunum_compute::DeviceError;
use thiserror::Error;

/// Errors raised while bringing up a wgpu device.
#[derive(Debug, Error)]
pub enum WgpuError {
    /// No adapter matched the request.
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    /// The adapter refused to create a device.
    #[error("Failed to create GPU device: {0}")]
    DeviceRequest(String),

    /// The kernel module failed validation.
    #[error("Shader compilation failed: {0}")]
    Shader(String),
}

impl From<WgpuError> for DeviceError {
    fn from(err: WgpuError) -> Self {
        DeviceError::BackendInit(err.to_string())
    }
}

/// Result type for backend setup.
pub type Result<T> = std::result::Result<T, WgpuError>;
