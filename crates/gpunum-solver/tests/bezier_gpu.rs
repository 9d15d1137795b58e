//! Control points on the host reference device against the CPU formula.

use gpunum_compute::{CallLog, HostDevice, HostDeviceConfig, Operation, Status};
use gpunum_solver::{
    BezierConfig, BezierPath, BezierSolver, Error, GeometryPolicy, Point2D, control_points_cpu,
    kernels,
};

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

fn device(max_work_group_size: usize) -> HostDevice {
    kernels::reference_device(
        HostDeviceConfig::default().with_max_work_group_size(max_work_group_size),
    )
}

#[test]
fn output_length_is_twice_interior_count() {
    let device = device(256);
    let solver = BezierSolver::new(&device);
    let points = demo_points();

    assert_eq!(solver.control_points(&points).unwrap().len(), 10);
    assert_eq!(solver.control_points(&points[..3]).unwrap().len(), 2);
}

#[test]
fn matches_cpu_for_both_geometry_policies() {
    let points = demo_points();
    let expected = control_points_cpu(&points, 0.5);

    for policy in [GeometryPolicy::ClampedDoubled, GeometryPolicy::InteriorPoints] {
        for max in [1, 3, 4, 256] {
            let device = device(max);
            let solver =
                BezierSolver::with_config(&device, BezierConfig::default().with_geometry(policy));
            let controls = solver.control_points(&points).unwrap();
            assert_eq!(controls, expected, "policy {:?}, max work-group {}", policy, max);
        }
    }
}

#[test]
fn single_dispatch_and_balanced_buffers() {
    let device = device(256);
    BezierSolver::new(&device)
        .control_points(&demo_points())
        .unwrap();

    let log = device.log();
    assert_eq!(log.dispatches, 1);
    assert_eq!(log.dispatched, vec![kernels::COMPUTE_BEZIER_CONTROL_POINTS.to_string()]);
    assert_eq!(log.allocations, 2);
    assert_eq!(log.releases, 2);
    assert_eq!(log.binds, 4);
    // Two buffers, the smoothing factor and the joint count.
    assert_eq!(log.bound_bytes, 2 * std::mem::size_of::<usize>() + 4 + 4);
    // Input is created with its data; no separate upload.
    assert_eq!(log.writes, 0);
    assert_eq!(log.reads, 1);
    assert_eq!(device.live_kernels(), 0);
}

#[test]
fn too_few_points_touch_no_device() {
    let device = device(256);
    let solver = BezierSolver::new(&device);
    let points = demo_points();

    for n in 0..3 {
        let err = solver.control_points(&points[..n]).unwrap_err();
        assert!(matches!(err, Error::InsufficientPoints { count } if count == n));
    }
    assert_eq!(device.log().allocations, 0);
    assert_eq!(device.log().resolutions, 0);
}

#[test]
fn bad_smoothing_is_rejected_up_front() {
    let device = device(256);
    let solver = BezierSolver::with_config(&device, BezierConfig::default().with_smoothing(-0.1));
    assert!(matches!(
        solver.control_points(&demo_points()),
        Err(Error::InvalidSmoothing(_))
    ));
    assert_eq!(device.log().allocations, 0);
}

#[test]
fn cpu_mode_skips_device() {
    let device = device(256);
    let solver = BezierSolver::with_config(&device, BezierConfig::cpu());
    let points = demo_points();
    assert_eq!(
        solver.control_points(&points).unwrap(),
        control_points_cpu(&points, 0.5)
    );
    assert_eq!(device.log(), CallLog::default());
}

#[test]
fn injected_faults_release_every_buffer() {
    let points = demo_points();
    let cases = [
        (Operation::Allocate, 1),
        (Operation::Allocate, 2),
        (Operation::Resolve, 1),
        (Operation::Bind, 1),
        (Operation::Bind, 4),
        (Operation::Execute, 1),
        (Operation::Barrier, 1),
        (Operation::Read, 1),
    ];

    for (operation, nth) in cases {
        let device = device(256);
        device.fail_at(operation, nth, Status::OUT_OF_RESOURCES);
        let err = BezierSolver::new(&device)
            .control_points(&points)
            .unwrap_err();

        let status = err.device_error().map(|e| e.status());
        assert_eq!(status, Some(Status::OUT_OF_RESOURCES), "{:?} #{}", operation, nth);
        let log = device.log();
        assert_eq!(log.allocations, log.releases, "{:?} #{}", operation, nth);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_kernels(), 0);
    }
}

#[test]
fn failed_dispatch_reports_kernel_name() {
    let device = device(256);
    device.fail_at(Operation::Execute, 1, Status::OUT_OF_RESOURCES);
    let err = BezierSolver::new(&device)
        .control_points(&demo_points())
        .unwrap_err();
    assert!(err.to_string().contains(kernels::COMPUTE_BEZIER_CONTROL_POINTS));
}

#[test]
fn assembled_path_serializes() {
    let device = device(256);
    let points = demo_points();
    let controls = BezierSolver::new(&device).control_points(&points).unwrap();
    let path = BezierPath::assemble(&points, &controls).unwrap();

    let json = serde_json::to_string(&path).unwrap();
    let back: BezierPath = serde_json::from_str(&json).unwrap();
    assert_eq!(back.end(), Point2D::new(370.0, 214.0));
    assert_eq!(back.segments.len(), 6);
}
