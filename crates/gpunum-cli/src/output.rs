//! Output formatting.

use gpunum_solver::Point2D;
use nalgebra::DMatrix;

/// How the `bezier` command prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Svg,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }
}

/// Print each interior point with its incoming and outgoing handle.
pub fn print_controls(points: &[Point2D], controls: &[Point2D]) {
    println!(
        "{:>6}  {:>24}  {:>24}  {:>24}",
        "joint", "point", "incoming", "outgoing"
    );
    println!("{}", "-".repeat(6 + 3 * 26));
    for (i, pair) in controls.chunks_exact(2).enumerate() {
        let p = points[i + 1];
        println!(
            "{:>6}  {:>24}  {:>24}  {:>24}",
            i + 1,
            format_point(p),
            format_point(pair[0]),
            format_point(pair[1])
        );
    }
    println!();
}

fn format_point(p: Point2D) -> String {
    format!("({:.4}, {:.4})", p.x, p.y)
}

/// Print a matrix one row per line.
pub fn print_matrix(matrix: &DMatrix<f64>) {
    for row in matrix.row_iter() {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>12.6}", v)).collect();
        println!("{}", cells.join(" "));
    }
}
