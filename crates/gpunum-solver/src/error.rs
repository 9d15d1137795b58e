//! Error types for the solvers.

use gpunum_compute::DeviceError;
use std::fmt;
use thiserror::Error;

/// Point in the elimination run where a device failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Allocating or uploading the matrix, or resolving kernels.
    Setup,
    /// Choosing or swapping in the pivot row for a column.
    Pivot(usize),
    /// Scaling the pivot row of a column.
    Scale(usize),
    /// Eliminating a column from the other rows.
    Subtract(usize),
    /// Reading the reduced matrix back.
    ReadBack,
}

impl Stage {
    /// Column being processed, if the failure happened inside the loop.
    pub fn column(&self) -> Option<usize> {
        match self {
            Stage::Pivot(c) | Stage::Scale(c) | Stage::Subtract(c) => Some(*c),
            Stage::Setup | Stage::ReadBack => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Setup => write!(f, "setup"),
            Stage::Pivot(c) => write!(f, "pivoting column {}", c),
            Stage::Scale(c) => write!(f, "scaling column {}", c),
            Stage::Subtract(c) => write!(f, "subtracting column {}", c),
            Stage::ReadBack => write!(f, "read back"),
        }
    }
}

/// Solver errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Control points need at least three input points.
    #[error("at least 3 points are required, got {count}")]
    InsufficientPoints { count: usize },

    /// Smoothing factor outside `[0, 1]` or not finite.
    #[error("smoothing factor {0} is outside [0, 1]")]
    InvalidSmoothing(f32),

    /// Invalid dimensions provided.
    #[error("invalid dimensions: {0}")]
    InvalidDimension(String),

    /// The elimination run was aborted by a device failure.
    #[error("elimination failed during {stage}: {source}")]
    Elimination {
        stage: Stage,
        #[source]
        source: DeviceError,
    },

    /// Device failure outside the elimination engine.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

impl Error {
    /// Underlying device error, if any.
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            Error::Elimination { source, .. } => Some(source),
            Error::Device(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, Error>;
