//! Error types for device operations.

use std::fmt;
use thiserror::Error;

/// Status code reported by a compute device.
///
/// Codes follow the OpenCL numbering so that the OpenCL backend can pass
/// runtime codes through unchanged; other backends map their failures onto
/// the closest code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const DEVICE_NOT_FOUND: Status = Status(-1);
    pub const MEM_OBJECT_ALLOCATION_FAILURE: Status = Status(-4);
    pub const OUT_OF_RESOURCES: Status = Status(-5);
    pub const OUT_OF_HOST_MEMORY: Status = Status(-6);
    pub const BUILD_PROGRAM_FAILURE: Status = Status(-11);
    pub const INVALID_VALUE: Status = Status(-30);
    pub const INVALID_HOST_PTR: Status = Status(-37);
    pub const INVALID_MEM_OBJECT: Status = Status(-38);
    pub const INVALID_KERNEL_NAME: Status = Status(-46);
    pub const INVALID_KERNEL: Status = Status(-48);
    pub const INVALID_ARG_INDEX: Status = Status(-49);
    pub const INVALID_ARG_VALUE: Status = Status(-50);
    pub const INVALID_ARG_SIZE: Status = Status(-51);
    pub const INVALID_KERNEL_ARGS: Status = Status(-52);
    pub const INVALID_WORK_DIMENSION: Status = Status(-53);
    pub const INVALID_WORK_GROUP_SIZE: Status = Status(-54);
    pub const INVALID_OPERATION: Status = Status(-59);
    pub const INVALID_BUFFER_SIZE: Status = Status(-61);
    pub const INVALID_GLOBAL_WORK_SIZE: Status = Status(-63);

    /// Symbolic name of the code, if it is one of the known codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Status::SUCCESS => "CL_SUCCESS",
            Status::DEVICE_NOT_FOUND => "CL_DEVICE_NOT_FOUND",
            Status::MEM_OBJECT_ALLOCATION_FAILURE => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
            Status::OUT_OF_RESOURCES => "CL_OUT_OF_RESOURCES",
            Status::OUT_OF_HOST_MEMORY => "CL_OUT_OF_HOST_MEMORY",
            Status::BUILD_PROGRAM_FAILURE => "CL_BUILD_PROGRAM_FAILURE",
            Status::INVALID_VALUE => "CL_INVALID_VALUE",
            Status::INVALID_HOST_PTR => "CL_INVALID_HOST_PTR",
            Status::INVALID_MEM_OBJECT => "CL_INVALID_MEM_OBJECT",
            Status::INVALID_KERNEL_NAME => "CL_INVALID_KERNEL_NAME",
            Status::INVALID_KERNEL => "CL_INVALID_KERNEL",
            Status::INVALID_ARG_INDEX => "CL_INVALID_ARG_INDEX",
            Status::INVALID_ARG_VALUE => "CL_INVALID_ARG_VALUE",
            Status::INVALID_ARG_SIZE => "CL_INVALID_ARG_SIZE",
            Status::INVALID_KERNEL_ARGS => "CL_INVALID_KERNEL_ARGS",
            Status::INVALID_WORK_DIMENSION => "CL_INVALID_WORK_DIMENSION",
            Status::INVALID_WORK_GROUP_SIZE => "CL_INVALID_WORK_GROUP_SIZE",
            Status::INVALID_OPERATION => "CL_INVALID_OPERATION",
            Status::INVALID_BUFFER_SIZE => "CL_INVALID_BUFFER_SIZE",
            Status::INVALID_GLOBAL_WORK_SIZE => "CL_INVALID_GLOBAL_WORK_SIZE",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

/// Errors raised by a compute context.
///
/// Every variant that originates on the device carries the device status and
/// the name of the operation that failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// Device memory could not be reserved.
    #[error("{operation} could not allocate {bytes} bytes: {status}")]
    Allocation {
        operation: &'static str,
        bytes: usize,
        status: Status,
    },

    /// A host/device or device/device copy could not be enqueued or completed.
    #[error("{operation} failed: {status}")]
    Transfer {
        operation: &'static str,
        status: Status,
    },

    /// Binding a kernel argument failed.
    #[error("binding argument {index} of kernel `{kernel}` failed: {status}")]
    Bind {
        kernel: String,
        index: u32,
        status: Status,
    },

    /// Kernel launch or queue synchronization failed.
    #[error("{operation} failed for {target}: {status}")]
    Execution {
        operation: &'static str,
        target: String,
        status: Status,
    },

    /// The compiled program has no entry point with this name.
    #[error("kernel `{name}` not found in program")]
    KernelNotFound { name: String },

    /// The backend could not be brought up.
    #[error("backend initialization failed: {0}")]
    BackendInit(String),
}

impl DeviceError {
    /// Device status code carried by this error.
    pub fn status(&self) -> Status {
        match self {
            DeviceError::Allocation { status, .. }
            | DeviceError::Transfer { status, .. }
            | DeviceError::Bind { status, .. }
            | DeviceError::Execution { status, .. } => *status,
            DeviceError::KernelNotFound { .. } => Status::INVALID_KERNEL_NAME,
            DeviceError::BackendInit(_) => Status::DEVICE_NOT_FOUND,
        }
    }

    /// Name of the operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            DeviceError::Allocation { operation, .. }
            | DeviceError::Transfer { operation, .. }
            | DeviceError::Execution { operation, .. } => operation,
            DeviceError::Bind { .. } => "bind_argument",
            DeviceError::KernelNotFound { .. } => "resolve_kernel",
            DeviceError::BackendInit(_) => "init",
        }
    }

    /// Shorthand for a launch or barrier failure.
    pub fn execution(operation: &'static str, target: impl Into<String>, status: Status) -> Self {
        DeviceError::Execution {
            operation,
            target: target.into(),
            status,
        }
    }
}

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;
