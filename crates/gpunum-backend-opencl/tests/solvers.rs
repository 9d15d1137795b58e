//! Solvers on an OpenCL device. Skipped when none is present.

use gpunum_backend_opencl::OpenClContext;
use gpunum_solver::{
    BezierConfig, BezierSolver, EliminationConfig, GaussJordan, GeometryPolicy, Point2D,
    PivotStrategy, control_points_cpu,
};
use nalgebra::DMatrix;

fn try_create_context() -> Option<OpenClContext> {
    OpenClContext::new().ok()
}

fn demo_points() -> Vec<Point2D> {
    [
        (50.0, 53.0),
        (120.0, 150.0),
        (200.0, 70.0),
        (250.0, 120.0),
        (290.0, 102.0),
        (310.0, 52.0),
        (370.0, 214.0),
    ]
    .into_iter()
    .map(Point2D::from)
    .collect()
}

#[test]
fn test_control_points_match_cpu() {
    let ctx = match try_create_context() {
        Some(c) => c,
        None => {
            eprintln!("Skipping test: no OpenCL device available");
            return;
        }
    };

    let points = demo_points();
    let expected = control_points_cpu(&points, 0.5);
    for policy in [GeometryPolicy::ClampedDoubled, GeometryPolicy::InteriorPoints] {
        let solver =
            BezierSolver::with_config(&ctx, BezierConfig::default().with_geometry(policy));
        let controls = solver.control_points(&points).unwrap();
        assert_eq!(controls.len(), 10);
        for (got, want) in controls.iter().zip(&expected) {
            assert!((got.x - want.x).abs() < 1e-9, "{:?} vs {:?}", got, want);
            assert!((got.y - want.y).abs() < 1e-9, "{:?} vs {:?}", got, want);
        }
    }
}

#[test]
fn test_partial_pivoting_rref() {
    let ctx = match try_create_context() {
        Some(c) => c,
        None => {
            eprintln!("Skipping test: no OpenCL device available");
            return;
        }
    };

    let matrix = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    let config =
        EliminationConfig::default().with_pivoting(PivotStrategy::Partial { tolerance: 1e-10 });
    let result = GaussJordan::with_config(&ctx, &matrix, config)
        .unwrap()
        .calculate()
        .unwrap();

    let expected = [1.0, 0.0, -1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0];
    let actual: Vec<f64> = result.matrix.transpose().iter().copied().collect();
    for (got, want) in actual.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "{:?}", actual);
    }
    assert_eq!(result.stats.skipped_columns, 1);
}

#[test]
fn test_partial_pivoting_rank_deficient() {
    let ctx = match try_create_context() {
        Some(c) => c,
        None => {
            eprintln!("Skipping test: no OpenCL device available");
            return;
        }
    };

    let matrix = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 7.0]);
    let config = EliminationConfig::default().with_pivoting(PivotStrategy::partial());
    let result = GaussJordan::with_config(&ctx, &matrix, config)
        .unwrap()
        .calculate()
        .unwrap();

    let expected = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 0.0, 0.0, 0.0, 1.0]);
    for (got, want) in result.matrix.iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-9, "{}", result.matrix);
    }
    assert_eq!(result.stats.skipped_columns, 1);
}
