//! Kernel entry points used by the solvers, and their host implementations.
//!
//! Argument layouts (slot order):
//!
//! | Kernel | Arguments |
//! |---|---|
//! | `computeBezierControlPoints` | `points` (ro), `controls` (rw), `smoothing: f32`, `interior: u32` |
//! | `scaleRow` | `M` (rw), `rows: u32`, `cols: u32`, `P` (rw), `col: i32`, `row: i32` |
//! | `subtractRow` | `M` (rw), `rows: u32`, `cols: u32`, `P` (rw), `col: i32`, `row: i32` |
//! | `swapRows` | `M` (rw), `rows: u32`, `cols: u32`, `P` (rw), `first: i32`, `second: i32` |
//!
//! `row` is the pivot row for column `col`. Without pivoting it equals `col`.
//!
//! The host bodies below are the reference semantics the WGSL and OpenCL
//! kernels in the backend crates follow.

use crate::bezier::joint_handles;
use crate::point::Point2D;
use gpunum_compute::{ExecutionGeometry, HostArgs, HostDevice, HostDeviceConfig, HostKernel, KernelResult};

pub const COMPUTE_BEZIER_CONTROL_POINTS: &str = "computeBezierControlPoints";
pub const SCALE_ROW: &str = "scaleRow";
pub const SUBTRACT_ROW: &str = "subtractRow";
pub const SWAP_ROWS: &str = "swapRows";

/// Every kernel name a backend program must export.
pub const KERNEL_NAMES: [&str; 4] = [COMPUTE_BEZIER_CONTROL_POINTS, SCALE_ROW, SUBTRACT_ROW, SWAP_ROWS];

/// Host device with all solver kernels registered.
pub fn reference_device(config: HostDeviceConfig) -> HostDevice {
    register_kernels(HostDevice::new(config))
}

/// Register the solver kernels on an existing host device.
pub fn register_kernels(device: HostDevice) -> HostDevice {
    device
        .with_kernel(COMPUTE_BEZIER_CONTROL_POINTS, HostKernel::new(4, bezier_control_points))
        .with_kernel(SCALE_ROW, HostKernel::new(6, scale_row))
        .with_kernel(SUBTRACT_ROW, HostKernel::new(6, subtract_row))
        .with_kernel(SWAP_ROWS, HostKernel::new(6, swap_rows))
}

fn bezier_control_points(geometry: &ExecutionGeometry, args: &mut HostArgs) -> KernelResult {
    let smoothing = f64::from(args.f32(2)?);
    let interior = args.u32(3)? as usize;
    let (points, controls) = args.buffers(0, 1)?;
    if points.len() < 2 * (interior + 2) || controls.len() < 4 * interior {
        return Err(format!(
            "{} interior joints do not fit buffers of {} and {} elements",
            interior,
            points.len(),
            controls.len()
        ));
    }

    let point = |i: usize| Point2D::new(points[2 * i], points[2 * i + 1]);
    let stride = geometry.work_items();
    for gid in 0..stride {
        let mut i = gid;
        while i < interior {
            let (incoming, outgoing) = joint_handles(point(i), point(i + 1), point(i + 2), smoothing);
            controls[4 * i] = incoming.x;
            controls[4 * i + 1] = incoming.y;
            controls[4 * i + 2] = outgoing.x;
            controls[4 * i + 3] = outgoing.y;
            i += stride;
        }
    }
    Ok(())
}

/// Dimensions shared by the row kernels.
struct RowLaunch {
    rows: usize,
    cols: usize,
}

fn row_launch(args: &HostArgs) -> Result<RowLaunch, String> {
    let rows = args.u32(1)? as usize;
    let cols = args.u32(2)? as usize;
    if args.buffer(0)?.len() < rows * cols || args.buffer(3)?.len() < rows * cols {
        return Err(format!("buffers smaller than a {}x{} matrix", rows, cols));
    }
    Ok(RowLaunch { rows, cols })
}

/// Read a non-negative index from slot `slot` that must be below `bound`.
fn index_arg(args: &HostArgs, slot: usize, what: &str, bound: usize) -> Result<usize, String> {
    let value = args.i32(slot)?;
    usize::try_from(value)
        .ok()
        .filter(|v| *v < bound)
        .ok_or_else(|| format!("{} {} outside 0..{}", what, value, bound))
}

/// Pivot column and pivot row of a scale or subtract launch.
fn pivot_args(args: &HostArgs, launch: &RowLaunch) -> Result<(usize, usize), String> {
    let col = index_arg(args, 4, "column", launch.cols)?;
    let row = index_arg(args, 5, "pivot row", launch.rows)?;
    Ok((col, row))
}

/// Visit every `(x, y)` of the 2D grid that falls inside the matrix.
fn for_each_cell(geometry: &ExecutionGeometry, launch: &RowLaunch, mut f: impl FnMut(usize, usize)) {
    let global = geometry.global();
    let (gx, gy) = (global[0], global.get(1).copied().unwrap_or(1));
    for y in 0..gy.min(launch.rows) {
        for x in 0..gx.min(launch.cols) {
            f(x, y);
        }
    }
}

fn scale_row(geometry: &ExecutionGeometry, args: &mut HostArgs) -> KernelResult {
    let launch = row_launch(args)?;
    let (c, r) = pivot_args(args, &launch)?;
    let (m, p) = args.buffers(0, 3)?;
    let cols = launch.cols;
    let pivot = m[r * cols + c];
    for_each_cell(geometry, &launch, |x, y| {
        let idx = y * cols + x;
        p[idx] = if y == r { m[idx] / pivot } else { m[idx] };
    });
    Ok(())
}

fn subtract_row(geometry: &ExecutionGeometry, args: &mut HostArgs) -> KernelResult {
    let launch = row_launch(args)?;
    let (c, r) = pivot_args(args, &launch)?;
    let (m, p) = args.buffers(0, 3)?;
    let cols = launch.cols;
    for_each_cell(geometry, &launch, |x, y| {
        let idx = y * cols + x;
        p[idx] = if y == r {
            m[idx]
        } else {
            m[idx] - m[y * cols + c] * m[r * cols + x]
        };
    });
    Ok(())
}

fn swap_rows(geometry: &ExecutionGeometry, args: &mut HostArgs) -> KernelResult {
    let launch = row_launch(args)?;
    let first = index_arg(args, 4, "row", launch.rows)?;
    let second = index_arg(args, 5, "row", launch.rows)?;
    let (m, p) = args.buffers(0, 3)?;
    let cols = launch.cols;
    for_each_cell(geometry, &launch, |x, y| {
        let source = if y == first {
            second
        } else if y == second {
            first
        } else {
            y
        };
        p[y * cols + x] = m[source * cols + x];
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpunum_compute::{AccessMode, ComputeContext, KernelArg, launch};

    fn run_row_kernel(name: &str, matrix: &[f64], rows: u32, cols: u32, extra: &[i32]) -> Vec<f64> {
        let device = reference_device(HostDeviceConfig::default());
        let m = device
            .allocate_buffer(matrix.len(), AccessMode::ReadWrite, Some(matrix))
            .unwrap();
        let p = device
            .allocate_buffer(matrix.len(), AccessMode::ReadWrite, Some(matrix))
            .unwrap();
        let kernel = device.resolve_kernel(name).unwrap();
        let mut args = vec![
            KernelArg::Buffer(m),
            KernelArg::U32(rows),
            KernelArg::U32(cols),
            KernelArg::Buffer(p),
        ];
        args.extend(extra.iter().map(|v| KernelArg::I32(*v)));
        let geometry = ExecutionGeometry::tiled_2d(cols as usize, rows as usize, 16, 256);
        launch(&device, kernel, &args, &geometry).unwrap();

        let mut out = vec![0.0; matrix.len()];
        device.enqueue_read(p, &mut out, true).unwrap();
        out
    }

    #[test]
    fn scale_divides_pivot_row_only() {
        let out = run_row_kernel(SCALE_ROW, &[2.0, 4.0, 1.0, 3.0], 2, 2, &[0, 0]);
        assert_eq!(out, vec![1.0, 2.0, 1.0, 3.0]);
    }

    #[test]
    fn subtract_clears_column_in_other_rows() {
        let out = run_row_kernel(SUBTRACT_ROW, &[1.0, 2.0, 3.0, 4.0], 2, 2, &[0, 0]);
        assert_eq!(out, vec![1.0, 2.0, 0.0, -2.0]);
    }

    #[test]
    fn pivot_row_can_differ_from_column() {
        // Pivot for column 2 sits in row 1.
        let matrix = [1.0, 2.0, 3.0, 0.0, 0.0, 4.0];
        let scaled = run_row_kernel(SCALE_ROW, &matrix, 2, 3, &[2, 1]);
        assert_eq!(scaled, vec![1.0, 2.0, 3.0, 0.0, 0.0, 1.0]);
        let cleared = run_row_kernel(SUBTRACT_ROW, &scaled, 2, 3, &[2, 1]);
        assert_eq!(cleared, vec![1.0, 2.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn out_of_range_pivot_row_fails_the_launch() {
        let device = reference_device(HostDeviceConfig::default());
        let data = [1.0, 2.0, 3.0, 4.0];
        let m = device
            .allocate_buffer(4, AccessMode::ReadWrite, Some(&data))
            .unwrap();
        let p = device.allocate_buffer(4, AccessMode::ReadWrite, None).unwrap();
        let kernel = device.resolve_kernel(SCALE_ROW).unwrap();
        let args = [
            KernelArg::Buffer(m),
            KernelArg::U32(2),
            KernelArg::U32(2),
            KernelArg::Buffer(p),
            KernelArg::I32(0),
            KernelArg::I32(2),
        ];
        let geometry = ExecutionGeometry::tiled_2d(2, 2, 16, 256);
        assert!(launch(&device, kernel, &args, &geometry).is_err());
    }

    #[test]
    fn swap_exchanges_rows() {
        let out = run_row_kernel(SWAP_ROWS, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2, &[0, 2]);
        assert_eq!(out, vec![5.0, 6.0, 3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn all_kernels_are_registered() {
        let device = reference_device(HostDeviceConfig::default());
        for name in KERNEL_NAMES {
            assert!(device.resolve_kernel(name).is_ok(), "missing {name}");
        }
    }
}
