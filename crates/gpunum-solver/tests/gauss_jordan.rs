//! Gauss-Jordan elimination on the host reference device.

use gpunum_compute::{HostDevice, HostDeviceConfig, Operation, Status};
use gpunum_solver::{
    EliminationConfig, Error, GaussJordan, PivotStrategy, Stage, kernels,
};
use nalgebra::DMatrix;

fn device() -> HostDevice {
    kernels::reference_device(HostDeviceConfig::default())
}

fn sequential_3x3() -> DMatrix<f64> {
    DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0])
}

/// Augmented system with solution (2, 3, -1); safe without pivoting.
fn augmented_system() -> DMatrix<f64> {
    DMatrix::from_row_slice(
        3,
        4,
        &[
            2.0, 1.0, -1.0, 8.0, //
            -3.0, -1.0, 2.0, -11.0, //
            -2.0, 1.0, 2.0, -3.0,
        ],
    )
}

fn assert_close(actual: &DMatrix<f64>, expected: &DMatrix<f64>, tol: f64) {
    assert_eq!(actual.shape(), expected.shape());
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!((a - e).abs() <= tol, "got {}, expected {}\n{}", a, e, actual);
    }
}

#[test]
fn solves_augmented_system() {
    let device = device();
    let result = GaussJordan::new(&device, &augmented_system())
        .unwrap()
        .calculate()
        .unwrap();

    let expected = DMatrix::from_row_slice(
        3,
        4,
        &[
            1.0, 0.0, 0.0, 2.0, //
            0.0, 1.0, 0.0, 3.0, //
            0.0, 0.0, 1.0, -1.0,
        ],
    );
    assert_close(&result.matrix, &expected, 1e-12);
    assert_eq!(result.stats.columns, 3);
}

#[test]
fn three_by_three_issues_expected_device_calls() {
    let device = device();
    let result = GaussJordan::new(&device, &sequential_3x3())
        .unwrap()
        .calculate()
        .unwrap();

    let log = device.log();
    assert_eq!(log.allocations, 2);
    assert_eq!(log.writes, 2);
    assert_eq!(log.dispatches, 6);
    assert_eq!(log.copies, 6);
    assert_eq!(log.reads, 1);
    assert_eq!(log.binds, 6 * 6);
    assert_eq!(
        log.dispatched,
        [
            "scaleRow",
            "subtractRow",
            "scaleRow",
            "subtractRow",
            "scaleRow",
            "subtractRow",
        ]
    );
    assert_eq!(log.releases, 2);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_kernels(), 0);

    assert_eq!(result.stats.dispatches, 6);
    assert_eq!(result.stats.copies, 6);
    assert_eq!(result.stats.swaps, 0);
}

#[test]
fn singular_matrix_without_pivoting_goes_non_finite() {
    let device = device();
    let result = GaussJordan::new(&device, &sequential_3x3())
        .unwrap()
        .calculate()
        .unwrap();
    assert!(result.matrix.iter().any(|v| !v.is_finite()));
}

#[test]
fn partial_pivoting_reaches_reduced_row_echelon_form() {
    let device = device();
    let config =
        EliminationConfig::default().with_pivoting(PivotStrategy::Partial { tolerance: 1e-10 });
    let result = GaussJordan::with_config(&device, &sequential_3x3(), config)
        .unwrap()
        .calculate()
        .unwrap();

    let expected =
        DMatrix::from_row_slice(3, 3, &[1.0, 0.0, -1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0]);
    assert_close(&result.matrix, &expected, 1e-9);

    assert_eq!(result.stats.columns, 2);
    assert_eq!(result.stats.swaps, 2);
    assert_eq!(result.stats.skipped_columns, 1);
    assert_eq!(result.stats.dispatches, 6);

    let log = device.log();
    assert_eq!(log.dispatches, 6);
    assert_eq!(log.copies, 6);
    // One read per pivot search plus the final read-back.
    assert_eq!(log.reads, 4);
    assert_eq!(device.live_buffers(), 0);
}

fn partial(matrix: &DMatrix<f64>) -> gpunum_solver::Elimination {
    let config = EliminationConfig::default().with_pivoting(PivotStrategy::partial());
    GaussJordan::with_config(&device(), matrix, config)
        .unwrap()
        .calculate()
        .unwrap()
}

#[test]
fn zero_leading_column_keeps_pivot_row() {
    let matrix = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 2.0]);
    let result = partial(&matrix);

    let expected = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
    assert_close(&result.matrix, &expected, 1e-12);
    assert_eq!(result.stats.columns, 1);
    assert_eq!(result.stats.skipped_columns, 1);
    assert_eq!(result.stats.swaps, 1);
}

#[test]
fn pivot_beyond_row_count_is_eliminated() {
    let matrix = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 7.0]);
    let result = partial(&matrix);

    let expected = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 0.0, 0.0, 0.0, 1.0]);
    assert_close(&result.matrix, &expected, 1e-12);
    assert_eq!(result.stats.columns, 2);
    assert_eq!(result.stats.skipped_columns, 1);
    assert_eq!(result.stats.dispatches, 5);
}

#[test]
fn rank_deficient_wide_matrix_reaches_rref() {
    // Column 1 is twice column 0, so the second pivot is in column 2.
    let matrix = DMatrix::from_row_slice(
        3,
        4,
        &[
            1.0, 2.0, 1.0, 1.0, //
            2.0, 4.0, 0.0, 2.0, //
            3.0, 6.0, 1.0, 4.0,
        ],
    );
    let result = partial(&matrix);

    let expected = DMatrix::from_row_slice(
        3,
        4,
        &[
            1.0, 2.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    );
    assert_close(&result.matrix, &expected, 1e-9);
    assert_eq!(result.stats.columns, 3);
    assert_eq!(result.stats.skipped_columns, 1);
}

#[test]
fn small_tiles_and_work_groups_give_same_result() {
    let expected = GaussJordan::new(&device(), &augmented_system())
        .unwrap()
        .calculate()
        .unwrap()
        .matrix;

    for (tile, max) in [(1, 256), (2, 256), (16, 4), (16, 1)] {
        let device = kernels::reference_device(
            HostDeviceConfig::default().with_max_work_group_size(max),
        );
        let config = EliminationConfig::default().with_tile(tile);
        let result = GaussJordan::with_config(&device, &augmented_system(), config)
            .unwrap()
            .calculate()
            .unwrap();
        assert_close(&result.matrix, &expected, 0.0);
    }
}

#[test]
fn from_rows_matches_matrix_input() {
    let device = device();
    let rows = vec![
        vec![2.0, 1.0, -1.0, 8.0],
        vec![-3.0, -1.0, 2.0, -11.0],
        vec![-2.0, 1.0, 2.0, -3.0],
    ];
    let engine = GaussJordan::from_rows(&device, &rows, EliminationConfig::default()).unwrap();
    assert_eq!((engine.rows(), engine.cols()), (3, 4));
    assert_eq!(engine.matrix_bytes(), 12 * 8);
    let result = engine.calculate().unwrap();
    assert!((result.matrix[(2, 3)] + 1.0).abs() < 1e-12);
}

#[test]
fn invalid_dimensions_are_rejected_before_allocation() {
    let device = device();

    let tall = DMatrix::<f64>::zeros(3, 2);
    assert!(matches!(
        GaussJordan::new(&device, &tall),
        Err(Error::InvalidDimension(_))
    ));

    let empty = DMatrix::<f64>::zeros(0, 0);
    assert!(matches!(
        GaussJordan::new(&device, &empty),
        Err(Error::InvalidDimension(_))
    ));

    let ragged = vec![vec![1.0, 2.0], vec![3.0]];
    assert!(matches!(
        GaussJordan::from_rows(&device, &ragged, EliminationConfig::default()),
        Err(Error::InvalidDimension(_))
    ));

    assert_eq!(device.log().allocations, 0);
}

#[test]
fn bind_failure_aborts_before_any_dispatch() {
    let device = device();
    device.fail_at(Operation::Bind, 1, Status::INVALID_ARG_VALUE);

    let err = GaussJordan::new(&device, &sequential_3x3())
        .unwrap()
        .calculate()
        .unwrap_err();

    match err {
        Error::Elimination { stage, source } => {
            assert_eq!(stage, Stage::Scale(0));
            assert_eq!(source.status(), Status::INVALID_ARG_VALUE);
        }
        other => panic!("unexpected error: {other}"),
    }
    let log = device.log();
    assert_eq!(log.dispatches, 0);
    assert_eq!(log.releases, 2);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn failures_report_their_stage() {
    let cases = [
        (Operation::Allocate, 2, Stage::Setup),
        (Operation::Write, 2, Stage::Setup),
        (Operation::Resolve, 2, Stage::Setup),
        (Operation::Copy, 1, Stage::Scale(0)),
        (Operation::Execute, 2, Stage::Subtract(0)),
        (Operation::Barrier, 3, Stage::Scale(1)),
        (Operation::Read, 1, Stage::ReadBack),
    ];

    for (operation, nth, expected) in cases {
        let device = device();
        device.fail_at(operation, nth, Status::OUT_OF_RESOURCES);

        let err = GaussJordan::new(&device, &augmented_system())
            .and_then(|engine| engine.calculate())
            .unwrap_err();

        match err {
            Error::Elimination { stage, .. } => {
                assert_eq!(stage, expected, "{:?} #{}", operation, nth)
            }
            other => panic!("{:?} #{}: unexpected error {other}", operation, nth),
        }
        let log = device.log();
        assert_eq!(log.allocations, log.releases, "{:?} #{}", operation, nth);
        assert_eq!(device.live_kernels(), 0);
    }
}

#[test]
fn pivot_read_failure_is_attributed_to_pivot_stage() {
    let device = device();
    device.fail_at(Operation::Read, 2, Status::OUT_OF_RESOURCES);
    let config = EliminationConfig::default().with_pivoting(PivotStrategy::partial());

    let err = GaussJordan::with_config(&device, &sequential_3x3(), config)
        .and_then(|engine| engine.calculate())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Elimination {
            stage: Stage::Pivot(1),
            ..
        }
    ));
    assert_eq!(device.live_buffers(), 0);
}
