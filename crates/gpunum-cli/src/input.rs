//! Input files and built-in fixtures.

use anyhow::{Context, Result};
use gpunum_solver::Point2D;
use serde::Deserialize;
use std::path::Path;

/// Point sequence used when no input file is given.
pub const DEMO_POINTS: [(f64, f64); 7] = [
    (50.0, 53.0),
    (120.0, 150.0),
    (200.0, 70.0),
    (250.0, 120.0),
    (290.0, 102.0),
    (310.0, 52.0),
    (370.0, 214.0),
];

/// Matrix used when no input file is given.
pub const DEMO_MATRIX: [[f64; 3]; 3] = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];

/// A point written either as `[x, y]` or as `{"x": .., "y": ..}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PointInput {
    Pair([f64; 2]),
    Object(Point2D),
}

impl From<PointInput> for Point2D {
    fn from(input: PointInput) -> Self {
        match input {
            PointInput::Pair([x, y]) => Point2D::new(x, y),
            PointInput::Object(p) => p,
        }
    }
}

pub fn parse_points(json: &str) -> Result<Vec<Point2D>> {
    let raw: Vec<PointInput> =
        serde_json::from_str(json).context("expected a JSON array of points")?;
    Ok(raw.into_iter().map(Point2D::from).collect())
}

pub fn parse_matrix(json: &str) -> Result<Vec<Vec<f64>>> {
    serde_json::from_str(json).context("expected a JSON array of rows")
}

/// Points from `path`, or the demo sequence.
pub fn load_points(path: Option<&Path>) -> Result<Vec<Point2D>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            parse_points(&json).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(DEMO_POINTS.into_iter().map(Point2D::from).collect()),
    }
}

/// Matrix rows from `path`, or the demo matrix.
pub fn load_matrix(path: Option<&Path>) -> Result<Vec<Vec<f64>>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            parse_matrix(&json).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(DEMO_MATRIX.iter().map(|row| row.to_vec()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_accept_pairs_and_objects() {
        let points = parse_points(r#"[[1, 2], {"x": 3.5, "y": -4}]"#).unwrap();
        assert_eq!(points, vec![Point2D::new(1.0, 2.0), Point2D::new(3.5, -4.0)]);
        assert!(parse_points(r#"{"x": 1}"#).is_err());
    }

    #[test]
    fn matrix_rows() {
        let rows = parse_matrix("[[1, 2], [3, 4]]").unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn fixtures_without_input() {
        assert_eq!(load_points(None).unwrap().len(), 7);
        assert_eq!(load_matrix(None).unwrap()[2], vec![7.0, 8.0, 9.0]);
    }
}
