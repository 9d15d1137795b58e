//! Solvers running on a real wgpu adapter. Skipped when none is present.

use gpunum_backend_wgpu::WgpuContext;
use gpunum_solver::{
    BezierConfig, BezierSolver, EliminationConfig, GaussJordan, GeometryPolicy, Point2D,
    PivotStrategy, control_points_cpu,
};
use nalgebra::DMatrix;
use std::sync::Arc;

fn try_create_context() -> Option<Arc<WgpuContext>> {
    WgpuContext::new().ok().map(Arc::new)
}

fn wave(n: usize) -> Vec<Point2D> {
    (0..n)
        .map(|i| Point2D::new(i as f64 * 4.0, (i as f64 * 0.7).sin() * 30.0))
        .collect()
}

#[test]
fn test_control_points_match_cpu() {
    let ctx = match try_create_context() {
        Some(c) => c,
        None => {
            eprintln!("Skipping test: no GPU available");
            return;
        }
    };

    // More joints than one work-group covers, so the kernel must stride.
    let points = wave(300);
    let expected = control_points_cpu(&points, 0.5);

    for policy in [GeometryPolicy::ClampedDoubled, GeometryPolicy::InteriorPoints] {
        let solver = BezierSolver::with_config(
            Arc::clone(&ctx),
            BezierConfig::default().with_geometry(policy),
        );
        let controls = solver.control_points(&points).unwrap();
        assert_eq!(controls.len(), expected.len());
        for (got, want) in controls.iter().zip(&expected) {
            assert!((got.x - want.x).abs() < 1e-3, "{:?} vs {:?}", got, want);
            assert!((got.y - want.y).abs() < 1e-3, "{:?} vs {:?}", got, want);
        }
    }
}

#[test]
fn test_gauss_jordan_with_pivoting() {
    let ctx = match try_create_context() {
        Some(c) => c,
        None => {
            eprintln!("Skipping test: no GPU available");
            return;
        }
    };

    let matrix = DMatrix::from_row_slice(
        3,
        4,
        &[
            2.0, 1.0, -1.0, 8.0, //
            -3.0, -1.0, 2.0, -11.0, //
            -2.0, 1.0, 2.0, -3.0,
        ],
    );
    for pivoting in [PivotStrategy::None, PivotStrategy::Partial { tolerance: 1e-5 }] {
        let config = EliminationConfig::default().with_pivoting(pivoting);
        let result = GaussJordan::with_config(&*ctx, &matrix, config)
            .unwrap()
            .calculate()
            .unwrap();
        let solution: Vec<f64> = result.matrix.column(3).iter().copied().collect();
        for (got, want) in solution.iter().zip([2.0, 3.0, -1.0]) {
            assert!((got - want).abs() < 1e-4, "{:?}", solution);
        }
    }
}
