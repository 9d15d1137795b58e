//! Bézier control points for a curve through an ordered point sequence.
//!
//! For `n` input points the solver produces `2·(n−2)` control points: each
//! interior point `p[i+1]` gets an incoming handle (index `2i`) and an
//! outgoing handle (index `2i+1`). Handles lie on the line through the
//! interior point parallel to the chord `p[i] → p[i+2]`, pulled in by the
//! smoothing factor.
//!
//! The GPU path issues exactly one kernel dispatch. The CPU path evaluates the
//! same formula on the host without touching a device.

use crate::error::{Error, Result};
use crate::kernels::COMPUTE_BEZIER_CONTROL_POINTS;
use crate::point::{Point2D, flatten, unflatten};
use gpunum_compute::{AccessMode, BufferScope, ComputeContext, ExecutionGeometry, KernelArg, launch};

/// Default smoothing factor.
pub const DEFAULT_SMOOTHING: f32 = 0.5;

/// How the launch size for the control-point kernel is derived.
///
/// Both policies produce a single work-group clamped to the kernel's
/// work-group limit; the kernel strides over interior joints, so either
/// covers every joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryPolicy {
    /// Problem size `2·(n−2)`, one work-item per output point.
    #[default]
    ClampedDoubled,
    /// Problem size `n−2`, one work-item per interior joint.
    InteriorPoints,
}

impl GeometryPolicy {
    /// Problem size for `n` input points.
    pub fn problem_size(self, n: usize) -> usize {
        let interior = n.saturating_sub(2);
        match self {
            GeometryPolicy::ClampedDoubled => 2 * interior,
            GeometryPolicy::InteriorPoints => interior,
        }
    }

    /// Parse from a string.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "clamped" | "doubled" | "clamped-doubled" => Some(Self::ClampedDoubled),
            "interior" | "interior-points" => Some(Self::InteriorPoints),
            _ => None,
        }
    }
}

/// Where control points are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeMode {
    /// One kernel dispatch on the compute context.
    #[default]
    Gpu,
    /// Host arithmetic, no device calls.
    Cpu,
}

/// Control-point solver configuration.
#[derive(Debug, Clone)]
pub struct BezierConfig {
    /// Smoothing factor in `[0, 1]`, passed to the kernel as a 32-bit float.
    pub smoothing: f32,
    /// Launch-size policy for the GPU path.
    pub geometry: GeometryPolicy,
    /// GPU or CPU evaluation.
    pub mode: ComputeMode,
}

impl Default for BezierConfig {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
            geometry: GeometryPolicy::default(),
            mode: ComputeMode::default(),
        }
    }
}

impl BezierConfig {
    /// Configuration for the CPU path.
    pub fn cpu() -> Self {
        Self {
            mode: ComputeMode::Cpu,
            ..Default::default()
        }
    }

    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_geometry(mut self, geometry: GeometryPolicy) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_mode(mut self, mode: ComputeMode) -> Self {
        self.mode = mode;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.smoothing.is_finite() || !(0.0..=1.0).contains(&self.smoothing) {
            return Err(Error::InvalidSmoothing(self.smoothing));
        }
        Ok(())
    }
}

/// Incoming and outgoing handles for joint `b` between neighbours `a` and `c`.
///
/// A zero-length chord (`a == c`) leaves both handles on `b`.
pub fn joint_handles(a: Point2D, b: Point2D, c: Point2D, smoothing: f64) -> (Point2D, Point2D) {
    let chord = c - a;
    let len = chord.length();
    if len == 0.0 {
        return (b, b);
    }
    let dir = chord * (1.0 / len);

    let proj = (b - a).dot(dir).abs();
    let incoming = b - dir * (smoothing * proj);

    let back = dir * -1.0;
    let proj = (b - c).dot(back).abs();
    let outgoing = b - back * (smoothing * proj);

    (incoming, outgoing)
}

/// Compute control points on the host.
///
/// Callers validate the input; fewer than three points yield an empty result.
pub fn control_points_cpu(points: &[Point2D], smoothing: f32) -> Vec<Point2D> {
    let s = f64::from(smoothing);

    #[cfg(feature = "parallel")]
    let pairs: Vec<(Point2D, Point2D)> = {
        use rayon::prelude::*;
        points
            .par_windows(3)
            .map(|w| joint_handles(w[0], w[1], w[2], s))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let pairs: Vec<(Point2D, Point2D)> = points
        .windows(3)
        .map(|w| joint_handles(w[0], w[1], w[2], s))
        .collect();

    let mut out = Vec::with_capacity(pairs.len() * 2);
    for (incoming, outgoing) in pairs {
        out.push(incoming);
        out.push(outgoing);
    }
    out
}

/// Control-point solver bound to a compute context.
pub struct BezierSolver<C: ComputeContext> {
    ctx: C,
    config: BezierConfig,
}

impl<C: ComputeContext> BezierSolver<C> {
    /// Create a solver with the default configuration.
    pub fn new(ctx: C) -> Self {
        Self::with_config(ctx, BezierConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(ctx: C, config: BezierConfig) -> Self {
        Self { ctx, config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &BezierConfig {
        &self.config
    }

    /// Compute the `2·(n−2)` control points for `points`.
    ///
    /// # Errors
    /// `InsufficientPoints` for fewer than three points and
    /// `InvalidSmoothing` for a bad smoothing factor, both before any device
    /// call; `Device` if any device step fails. Device buffers are released
    /// on every path.
    pub fn control_points(&self, points: &[Point2D]) -> Result<Vec<Point2D>> {
        if points.len() < 3 {
            return Err(Error::InsufficientPoints {
                count: points.len(),
            });
        }
        self.config.validate()?;

        match self.config.mode {
            ComputeMode::Cpu => Ok(control_points_cpu(points, self.config.smoothing)),
            ComputeMode::Gpu => self.control_points_gpu(points),
        }
    }

    fn control_points_gpu(&self, points: &[Point2D]) -> Result<Vec<Point2D>> {
        let n = points.len();
        let interior = n - 2;
        let interior_arg = u32::try_from(interior).map_err(|_| {
            Error::InvalidDimension(format!("{} interior points exceed the kernel index range", interior))
        })?;
        let flat = flatten(points);

        let mut scope = BufferScope::new(&self.ctx);
        let input = scope.allocate(flat.len(), AccessMode::ReadOnly, Some(&flat))?;
        let output = scope.allocate(4 * interior, AccessMode::ReadWrite, None)?;
        let kernel = scope.kernel(COMPUTE_BEZIER_CONTROL_POINTS)?;

        let max = self.ctx.max_work_group_size(kernel)?;
        let geometry = ExecutionGeometry::for_problem(self.config.geometry.problem_size(n), max);
        log::debug!(
            "Control points for {} points on {}: global={:?} local={:?}",
            n,
            self.ctx.device_name(),
            geometry.global(),
            geometry.local()
        );

        launch(
            &self.ctx,
            kernel,
            &[
                KernelArg::Buffer(input.handle()),
                KernelArg::Buffer(output.handle()),
                KernelArg::F32(self.config.smoothing),
                KernelArg::U32(interior_arg),
            ],
            &geometry,
        )?;

        let mut raw = vec![0.0; output.len()];
        scope.read(&output, &mut raw, true)?;
        Ok(unflatten(&raw))
    }
}
