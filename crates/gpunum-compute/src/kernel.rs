//! Kernel argument binding, execution geometry and dispatch.
//!
//! A launch always runs in the order bind → dispatch → barrier. Buffers
//! written by a kernel must not be read back before the barrier returns.

use crate::context::{ComputeContext, KernelArg, KernelHandle};
use crate::error::Result;

/// Global and local work sizes for a kernel launch (one or two dimensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionGeometry {
    dims: u32,
    global: [usize; 2],
    local: [usize; 2],
}

impl ExecutionGeometry {
    /// Single work-group geometry for a one-dimensional problem.
    ///
    /// The global size equals the problem size clamped to
    /// `[1, max_work_group_size]` and the local size equals the global size,
    /// so the whole launch fits in one work-group. Problems larger than the
    /// device maximum are not tiled; kernels launched this way stride over
    /// their input by the global size.
    pub fn for_problem(problem_size: usize, max_work_group_size: usize) -> Self {
        let max = max_work_group_size.max(1);
        let global = problem_size.clamp(1, max);
        Self {
            dims: 1,
            global: [global, 1],
            local: [global, 1],
        }
    }

    /// Two-dimensional geometry covering `cols × rows` with square tiles.
    ///
    /// The tile edge is halved until a full tile fits the device maximum, and
    /// the global size is rounded up to whole tiles in each dimension.
    pub fn tiled_2d(cols: usize, rows: usize, tile: usize, max_work_group_size: usize) -> Self {
        let max = max_work_group_size.max(1);
        let mut tile = tile.max(1);
        while tile > 1 && tile * tile > max {
            tile /= 2;
        }
        Self {
            dims: 2,
            global: [
                cols.div_ceil(tile).max(1) * tile,
                rows.div_ceil(tile).max(1) * tile,
            ],
            local: [tile, tile],
        }
    }

    /// Number of dimensions (1 or 2).
    pub fn dims(&self) -> u32 {
        self.dims
    }

    /// Global work size per dimension.
    pub fn global(&self) -> &[usize] {
        &self.global[..self.dims as usize]
    }

    /// Local work-group size per dimension.
    pub fn local(&self) -> &[usize] {
        &self.local[..self.dims as usize]
    }

    /// Total number of work-items.
    pub fn work_items(&self) -> usize {
        self.global().iter().product()
    }

    /// Number of work-items in one work-group.
    pub fn work_group_size(&self) -> usize {
        self.local().iter().product()
    }

    /// Number of work-groups per dimension.
    pub fn work_groups(&self) -> [usize; 2] {
        [
            self.global[0] / self.local[0],
            self.global[1] / self.local[1],
        ]
    }
}

/// Bind `args` to kernel slots `0..args.len()` in order.
///
/// Stops at the first slot that fails; later slots are left unbound.
pub fn bind_arguments<C: ComputeContext + ?Sized>(
    ctx: &C,
    kernel: KernelHandle,
    args: &[KernelArg],
) -> Result<()> {
    for (index, arg) in args.iter().enumerate() {
        ctx.bind_argument(kernel, index as u32, arg)?;
    }
    Ok(())
}

/// Enqueue a kernel for asynchronous execution.
pub fn dispatch<C: ComputeContext + ?Sized>(
    ctx: &C,
    kernel: KernelHandle,
    geometry: &ExecutionGeometry,
) -> Result<()> {
    log::debug!(
        "Dispatching kernel {:?}: global={:?} local={:?}",
        kernel,
        geometry.global(),
        geometry.local()
    );
    ctx.enqueue_execute(kernel, geometry)
}

/// Bind, dispatch and wait for completion.
pub fn launch<C: ComputeContext + ?Sized>(
    ctx: &C,
    kernel: KernelHandle,
    args: &[KernelArg],
    geometry: &ExecutionGeometry,
) -> Result<()> {
    bind_arguments(ctx, kernel, args)?;
    dispatch(ctx, kernel, geometry)?;
    ctx.barrier()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_within_limit_is_one_group() {
        let g = ExecutionGeometry::for_problem(10, 256);
        assert_eq!(g.dims(), 1);
        assert_eq!(g.global(), &[10]);
        assert_eq!(g.local(), &[10]);
        assert_eq!(g.work_groups(), [1, 1]);
    }

    #[test]
    fn problem_above_limit_is_clamped() {
        let g = ExecutionGeometry::for_problem(1000, 64);
        assert_eq!(g.global(), &[64]);
        assert_eq!(g.local(), &[64]);
    }

    #[test]
    fn empty_problem_still_launches_one_item() {
        let g = ExecutionGeometry::for_problem(0, 64);
        assert_eq!(g.work_items(), 1);

        let g = ExecutionGeometry::for_problem(5, 0);
        assert_eq!(g.global(), &[1]);
        assert_eq!(g.local(), &[1]);
    }

    #[test]
    fn geometry_invariants_hold_over_a_range() {
        for max in [1, 2, 3, 7, 64, 256, 1024] {
            for problem in 0..300 {
                let g = ExecutionGeometry::for_problem(problem, max);
                assert!(g.work_group_size() <= max, "problem={problem} max={max}");
                assert!(g.work_items() >= 1);
                assert_eq!(g.global()[0] % g.local()[0], 0);
            }
        }
    }

    #[test]
    fn tiled_grid_rounds_up_to_tiles() {
        let g = ExecutionGeometry::tiled_2d(3, 3, 16, 256);
        assert_eq!(g.dims(), 2);
        assert_eq!(g.global(), &[16, 16]);
        assert_eq!(g.local(), &[16, 16]);

        let g = ExecutionGeometry::tiled_2d(40, 17, 16, 1024);
        assert_eq!(g.global(), &[48, 32]);
        assert_eq!(g.work_groups(), [3, 2]);
    }

    #[test]
    fn tiled_grid_shrinks_tile_to_device_limit() {
        let g = ExecutionGeometry::tiled_2d(20, 20, 16, 64);
        assert_eq!(g.local(), &[8, 8]);
        assert_eq!(g.global(), &[24, 24]);
        assert!(g.work_group_size() <= 64);

        let g = ExecutionGeometry::tiled_2d(5, 5, 16, 1);
        assert_eq!(g.local(), &[1, 1]);
        assert_eq!(g.global(), &[5, 5]);
    }
}
