//! Assemble a drawable path from input points and their control points.
//!
//! The first and last segments are quadratic (one handle each); every
//! segment between two interior points is cubic. The path ends on the last
//! input point.

use crate::error::{Error, Result};
use crate::point::Point2D;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One segment of a [`BezierPath`], starting where the previous one ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Segment {
    Quad { ctrl: Point2D, to: Point2D },
    Cubic { c1: Point2D, c2: Point2D, to: Point2D },
}

impl Segment {
    pub fn end(&self) -> Point2D {
        match self {
            Segment::Quad { to, .. } | Segment::Cubic { to, .. } => *to,
        }
    }

    /// Point at parameter `t` in `[0, 1]` for a segment starting at `from`.
    pub fn eval(&self, from: Point2D, t: f64) -> Point2D {
        let u = 1.0 - t;
        match *self {
            Segment::Quad { ctrl, to } => from * (u * u) + ctrl * (2.0 * u * t) + to * (t * t),
            Segment::Cubic { c1, c2, to } => {
                from * (u * u * u) + c1 * (3.0 * u * u * t) + c2 * (3.0 * u * t * t) + to * (t * t * t)
            }
        }
    }
}

/// Piecewise Bézier curve through an ordered point sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BezierPath {
    pub start: Point2D,
    pub segments: Vec<Segment>,
}

impl BezierPath {
    /// Build the path through `points` from the `2·(n−2)` `controls` the
    /// solver produced for them.
    pub fn assemble(points: &[Point2D], controls: &[Point2D]) -> Result<Self> {
        let n = points.len();
        if n < 3 {
            return Err(Error::InsufficientPoints { count: n });
        }
        if controls.len() != 2 * (n - 2) {
            return Err(Error::InvalidDimension(format!(
                "{} control points for {} input points, expected {}",
                controls.len(),
                n,
                2 * (n - 2)
            )));
        }

        let mut segments = Vec::with_capacity(n - 1);
        segments.push(Segment::Quad {
            ctrl: controls[0],
            to: points[1],
        });
        for i in 1..n - 2 {
            segments.push(Segment::Cubic {
                c1: controls[2 * i - 1],
                c2: controls[2 * i],
                to: points[i + 1],
            });
        }
        segments.push(Segment::Quad {
            ctrl: controls[2 * (n - 2) - 1],
            to: points[n - 1],
        });

        Ok(Self {
            start: points[0],
            segments,
        })
    }

    /// Last point of the path.
    pub fn end(&self) -> Point2D {
        self.segments.last().map_or(self.start, Segment::end)
    }

    /// Sample every segment at `steps` evenly spaced parameters.
    pub fn to_polyline(&self, steps: usize) -> Vec<Point2D> {
        let steps = steps.max(1);
        let mut out = Vec::with_capacity(self.segments.len() * steps + 1);
        out.push(self.start);
        let mut from = self.start;
        for segment in &self.segments {
            for k in 1..=steps {
                out.push(segment.eval(from, k as f64 / steps as f64));
            }
            from = segment.end();
        }
        out
    }

    /// SVG path data (`M`, `Q` and `C` commands).
    pub fn to_svg_path(&self) -> String {
        let mut d = format!("M {} {}", self.start.x, self.start.y);
        for segment in &self.segments {
            // Writing into a String cannot fail.
            let _ = match segment {
                Segment::Quad { ctrl, to } => {
                    write!(d, " Q {} {} {} {}", ctrl.x, ctrl.y, to.x, to.y)
                }
                Segment::Cubic { c1, c2, to } => write!(
                    d,
                    " C {} {} {} {} {} {}",
                    c1.x, c1.y, c2.x, c2.y, to.x, to.y
                ),
            };
        }
        d
    }
}
