//! GPU-offloaded numerical routines.
//!
//! Two computations run on any [`ComputeContext`](gpunum_compute::ComputeContext):
//!
//! - [`BezierSolver`] - control points of a smooth curve through a point
//!   sequence, in one kernel dispatch
//! - [`GaussJordan`] - row reduction of a dense matrix with device-resident
//!   row operations
//!
//! # Example
//!
//! ```
//! use gpunum_compute::HostDeviceConfig;
//! use gpunum_solver::{BezierPath, BezierSolver, Point2D, kernels};
//!
//! let device = kernels::reference_device(HostDeviceConfig::default());
//! let points = [
//!     Point2D::new(0.0, 0.0),
//!     Point2D::new(10.0, 10.0),
//!     Point2D::new(20.0, 0.0),
//! ];
//! let controls = BezierSolver::new(&device).control_points(&points).unwrap();
//! assert_eq!(controls.len(), 2);
//!
//! let path = BezierPath::assemble(&points, &controls).unwrap();
//! assert_eq!(path.end(), points[2]);
//! ```

pub mod bezier;
pub mod error;
pub mod gauss_jordan;
pub mod kernels;
pub mod path;
pub mod point;

pub use bezier::{
    BezierConfig, BezierSolver, ComputeMode, DEFAULT_SMOOTHING, GeometryPolicy,
    control_points_cpu, joint_handles,
};
pub use error::{Error, Result, Stage};
pub use gauss_jordan::{
    BLOCK_SIZE, Elimination, EliminationConfig, EliminationStats, GaussJordan, PivotStrategy,
};
pub use path::{BezierPath, Segment};
pub use point::Point2D;
