//! gpunum command-line interface.
//!
//! Runs the Bézier control-point solver and Gauss-Jordan elimination on the
//! selected compute backend.

mod backend;
mod commands;
mod input;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::backend::{BackendKind, detect_backend};
use crate::commands::{BezierArgs, EliminationArgs, run_bezier, run_gauss_jordan};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "gpunum")]
#[command(about = "GPU-offloaded Bezier control points and Gauss-Jordan elimination")]
#[command(version)]
struct Cli {
    /// Compute backend: auto, host, wgpu or opencl
    #[arg(long, global = true, default_value = "auto")]
    backend: String,

    /// Work-group limit of the host reference device
    #[arg(long, global = true, default_value_t = 256)]
    max_work_group_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute control points for a curve through a point sequence
    Bezier {
        /// JSON file with an array of points ([x, y] or {"x", "y"}); defaults to a demo sequence
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Smoothing factor in [0, 1]
        #[arg(short, long, default_value_t = 0.5)]
        smoothing: f32,

        /// Launch-size policy: clamped or interior
        #[arg(long, default_value = "clamped")]
        geometry: String,

        /// Compute on the host CPU instead of the backend
        #[arg(long)]
        cpu: bool,

        /// Output format: text, json or svg
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Reduce a matrix with Gauss-Jordan elimination
    GaussJordan {
        /// JSON file with an array of rows; defaults to a 3x3 demo matrix
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Pivoting strategy: none or partial
        #[arg(long, default_value = "none")]
        pivoting: String,

        /// Pivot magnitude at or below which a column is skipped (partial pivoting)
        #[arg(long)]
        tolerance: Option<f64>,

        /// Tile edge of the launch grid
        #[arg(long, default_value_t = 16)]
        tile: usize,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List compute backends and whether they are available
    Devices,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Bezier {
            input,
            smoothing,
            geometry,
            cpu,
            format,
        } => match OutputFormat::from_name(&format) {
            Some(format) => {
                let backend = detect_backend(&cli.backend, cli.max_work_group_size);
                run_bezier(
                    backend.context(),
                    &BezierArgs {
                        input,
                        smoothing,
                        geometry,
                        cpu,
                        format,
                    },
                )
            }
            None => Err(anyhow::anyhow!("unknown output format '{}'", format)),
        },
        Commands::GaussJordan {
            input,
            pivoting,
            tolerance,
            tile,
            json,
        } => {
            let backend = detect_backend(&cli.backend, cli.max_work_group_size);
            run_gauss_jordan(
                backend.context(),
                &EliminationArgs {
                    input,
                    pivoting,
                    tolerance,
                    tile,
                    json,
                },
            )
        }
        Commands::Devices => {
            for kind in [BackendKind::Host, BackendKind::Wgpu, BackendKind::OpenCl] {
                let status = if kind.is_available() {
                    "available"
                } else {
                    "unavailable"
                };
                println!("{:<8} {}", kind.name(), status);
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
