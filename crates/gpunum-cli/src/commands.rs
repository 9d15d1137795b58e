//! Command runners.

use anyhow::{Result, anyhow};
use gpunum_compute::ComputeContext;
use gpunum_solver::{
    BezierConfig, BezierPath, BezierSolver, ComputeMode, EliminationConfig, EliminationStats,
    GaussJordan, GeometryPolicy, PivotStrategy, Point2D,
};
use serde::Serialize;
use std::path::PathBuf;

use crate::input::{load_matrix, load_points};
use crate::output::{OutputFormat, print_controls, print_matrix};

/// Options for the `bezier` command.
#[derive(Debug)]
pub struct BezierArgs {
    pub input: Option<PathBuf>,
    pub smoothing: f32,
    pub geometry: String,
    pub cpu: bool,
    pub format: OutputFormat,
}

/// Options for the `gauss-jordan` command.
#[derive(Debug)]
pub struct EliminationArgs {
    pub input: Option<PathBuf>,
    pub pivoting: String,
    pub tolerance: Option<f64>,
    pub tile: usize,
    pub json: bool,
}

#[derive(Serialize)]
struct BezierReport<'a> {
    device: String,
    points: &'a [Point2D],
    controls: &'a [Point2D],
    path: &'a BezierPath,
    svg: String,
}

#[derive(Serialize)]
struct EliminationReport<'a> {
    device: String,
    rows: usize,
    cols: usize,
    matrix: Vec<Vec<f64>>,
    stats: &'a EliminationStats,
}

/// Compute and print control points.
pub fn run_bezier(ctx: &dyn ComputeContext, args: &BezierArgs) -> Result<()> {
    let geometry = GeometryPolicy::from_name(&args.geometry)
        .ok_or_else(|| anyhow!("unknown geometry policy '{}'", args.geometry))?;
    let mode = if args.cpu {
        ComputeMode::Cpu
    } else {
        ComputeMode::Gpu
    };
    let config = BezierConfig::default()
        .with_smoothing(args.smoothing)
        .with_geometry(geometry)
        .with_mode(mode);

    let points = load_points(args.input.as_deref())?;
    let solver = BezierSolver::with_config(ctx, config);
    let controls = solver.control_points(&points)?;
    let path = BezierPath::assemble(&points, &controls)?;

    let device = match mode {
        ComputeMode::Cpu => "host CPU".to_string(),
        ComputeMode::Gpu => ctx.device_name(),
    };

    match args.format {
        OutputFormat::Text => {
            println!("Bezier Control Points ({})", device);
            println!("==============================");
            println!();
            print_controls(&points, &controls);
        }
        OutputFormat::Json => {
            let report = BezierReport {
                device,
                points: &points,
                controls: &controls,
                path: &path,
                svg: path.to_svg_path(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Svg => println!("{}", path.to_svg_path()),
    }
    Ok(())
}

/// Reduce a matrix and print the result.
pub fn run_gauss_jordan(ctx: &dyn ComputeContext, args: &EliminationArgs) -> Result<()> {
    let pivoting = match (PivotStrategy::from_name(&args.pivoting), args.tolerance) {
        (Some(PivotStrategy::Partial { .. }), Some(tolerance)) => {
            PivotStrategy::Partial { tolerance }
        }
        (Some(strategy), _) => strategy,
        (None, _) => return Err(anyhow!("unknown pivoting strategy '{}'", args.pivoting)),
    };
    let config = EliminationConfig::default()
        .with_tile(args.tile)
        .with_pivoting(pivoting);

    let rows = load_matrix(args.input.as_deref())?;
    let result = GaussJordan::from_rows(ctx, &rows, config)?.calculate()?;

    if result.matrix.iter().any(|v| !v.is_finite()) {
        eprintln!("Warning: result contains non-finite values; try --pivoting partial");
    }

    if args.json {
        let report = EliminationReport {
            device: ctx.device_name(),
            rows: result.matrix.nrows(),
            cols: result.matrix.ncols(),
            matrix: result
                .matrix
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect(),
            stats: &result.stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Gauss-Jordan Elimination ({})", ctx.device_name());
        println!("==============================");
        println!();
        print_matrix(&result.matrix);
        println!();
        println!(
            "{} columns, {} dispatches, {} copies, {} swaps, {} skipped",
            result.stats.columns,
            result.stats.dispatches,
            result.stats.copies,
            result.stats.swaps,
            result.stats.skipped_columns
        );
    }
    Ok(())
}
