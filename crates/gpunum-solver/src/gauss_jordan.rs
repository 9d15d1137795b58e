//! Gauss-Jordan elimination with device-resident row operations.
//!
//! The engine keeps two equally sized device copies of the matrix: `M`, the
//! current state read by the kernels, and `P`, the scratch copy they write.
//! Every kernel launch is followed by a barrier and a `P → M` copy so the
//! next launch sees the updated rows.
//!
//! For each column `c` in `0..rows` the engine scales row `c` by its pivot
//! and then eliminates column `c` from every other row. By default there is
//! no pivot search and no zero check: a zero pivot yields non-finite values,
//! so the caller must supply a matrix that is safe for naive elimination.
//!
//! [`PivotStrategy::Partial`] tracks the pivot row apart from the column.
//! Columns without a usable pivot are skipped and the next column reuses the
//! same pivot row, so rank-deficient input still reaches reduced row-echelon
//! form.

use crate::error::{Error, Result, Stage};
use crate::kernels::{SCALE_ROW, SUBTRACT_ROW, SWAP_ROWS};
use gpunum_compute::{
    AccessMode, BufferScope, ComputeContext, DeviceBuffer, DeviceError, ExecutionGeometry,
    KernelArg, KernelHandle, launch,
};
use nalgebra::DMatrix;
use serde::Serialize;

/// Edge of the square tiles the row kernels are launched with.
pub const BLOCK_SIZE: usize = 16;

/// Pivot selection before each column is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PivotStrategy {
    /// Use the diagonal element as is.
    #[default]
    None,
    /// Swap in the row with the largest magnitude in the column; columns whose
    /// best pivot is at most `tolerance` in magnitude are skipped.
    Partial { tolerance: f64 },
}

impl PivotStrategy {
    /// Partial pivoting with a default tolerance.
    pub fn partial() -> Self {
        PivotStrategy::Partial { tolerance: 1e-12 }
    }

    /// Parse from a string.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "none" | "naive" => Some(Self::None),
            "partial" => Some(Self::partial()),
            _ => None,
        }
    }
}

/// Elimination configuration.
#[derive(Debug, Clone)]
pub struct EliminationConfig {
    /// Tile edge for the 2D launch grid.
    pub tile: usize,
    /// Pivot selection.
    pub pivoting: PivotStrategy,
}

impl Default for EliminationConfig {
    fn default() -> Self {
        Self {
            tile: BLOCK_SIZE,
            pivoting: PivotStrategy::None,
        }
    }
}

impl EliminationConfig {
    pub fn with_tile(mut self, tile: usize) -> Self {
        self.tile = tile;
        self
    }

    pub fn with_pivoting(mut self, pivoting: PivotStrategy) -> Self {
        self.pivoting = pivoting;
        self
    }
}

/// Counters for one elimination run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EliminationStats {
    /// Columns eliminated with a pivot.
    pub columns: usize,
    /// Kernel dispatches issued.
    pub dispatches: usize,
    /// `P → M` copies issued.
    pub copies: usize,
    /// Row swaps performed.
    pub swaps: usize,
    /// Columns skipped for lack of a usable pivot.
    pub skipped_columns: usize,
}

/// Result of an elimination run.
#[derive(Debug, Clone)]
pub struct Elimination {
    /// Reduced matrix.
    pub matrix: DMatrix<f64>,
    /// Work performed.
    pub stats: EliminationStats,
}

struct Kernels {
    scale: KernelHandle,
    subtract: KernelHandle,
    swap: Option<KernelHandle>,
}

/// Gauss-Jordan elimination engine.
///
/// Device buffers are allocated and filled on construction and released when
/// the engine is dropped or [`calculate`](Self::calculate) returns.
pub struct GaussJordan<'ctx, C: ComputeContext + ?Sized> {
    scope: BufferScope<'ctx, C>,
    m: DeviceBuffer,
    p: DeviceBuffer,
    rows: usize,
    cols: usize,
    config: EliminationConfig,
    stats: EliminationStats,
}

impl<'ctx, C: ComputeContext + ?Sized> GaussJordan<'ctx, C> {
    /// Upload `matrix` with the default configuration.
    pub fn new(ctx: &'ctx C, matrix: &DMatrix<f64>) -> Result<Self> {
        Self::with_config(ctx, matrix, EliminationConfig::default())
    }

    /// Upload a matrix given as rows of equal length.
    pub fn from_rows(ctx: &'ctx C, rows: &[Vec<f64>], config: EliminationConfig) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(Error::InvalidDimension(format!(
                "row {} has {} entries, expected {}",
                i,
                row.len(),
                cols
            )));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let matrix = DMatrix::from_row_slice(rows.len(), cols, &flat);
        Self::with_config(ctx, &matrix, config)
    }

    /// Upload `matrix` with a custom configuration.
    ///
    /// # Errors
    /// `InvalidDimension` for an empty matrix, more rows than columns or
    /// dimensions beyond the kernel index range, before any device call;
    /// `Elimination` at [`Stage::Setup`] if allocation or upload fails.
    pub fn with_config(ctx: &'ctx C, matrix: &DMatrix<f64>, config: EliminationConfig) -> Result<Self> {
        let (rows, cols) = matrix.shape();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimension(format!("empty {}x{} matrix", rows, cols)));
        }
        if rows > cols {
            return Err(Error::InvalidDimension(format!(
                "{} rows exceed {} columns",
                rows, cols
            )));
        }
        if i32::try_from(cols).is_err() {
            return Err(Error::InvalidDimension(format!(
                "{} columns exceed the kernel index range",
                cols
            )));
        }

        let data = to_row_major(matrix);
        let setup = |source| Error::Elimination {
            stage: Stage::Setup,
            source,
        };

        let mut scope = BufferScope::new(ctx);
        let m = scope
            .allocate(data.len(), AccessMode::ReadWrite, None)
            .map_err(setup)?;
        let p = scope
            .allocate(data.len(), AccessMode::ReadWrite, None)
            .map_err(setup)?;
        scope.write(&m, &data, true).map_err(setup)?;
        scope.write(&p, &data, true).map_err(setup)?;

        Ok(Self {
            scope,
            m,
            p,
            rows,
            cols,
            config,
            stats: EliminationStats::default(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Bytes held by each of the two device copies.
    pub fn matrix_bytes(&self) -> usize {
        self.m.size_in_bytes()
    }

    /// Run the elimination and read back the reduced matrix.
    ///
    /// # Errors
    /// `Elimination` naming the stage that failed. Both device buffers are
    /// released before the error is returned and no partial result is kept.
    pub fn calculate(mut self) -> Result<Elimination> {
        let kernels = self.resolve_kernels().map_err(|source| Error::Elimination {
            stage: Stage::Setup,
            source,
        })?;
        let geometry = self.geometry(&kernels).map_err(|source| Error::Elimination {
            stage: Stage::Setup,
            source,
        })?;

        // Without pivoting the pivot row always equals the column.
        let mut pivot_row = 0;
        for column in 0..self.cols {
            if pivot_row == self.rows {
                break;
            }
            if let Some(swap) = kernels.swap {
                let usable = self
                    .pivot(swap, column, pivot_row, &geometry)
                    .map_err(|source| Error::Elimination {
                        stage: Stage::Pivot(column),
                        source,
                    })?;
                if !usable {
                    log::debug!("Column {} has no usable pivot, skipping", column);
                    self.stats.skipped_columns += 1;
                    continue;
                }
            }
            self.step(kernels.scale, column, pivot_row, &geometry)
                .map_err(|source| Error::Elimination {
                    stage: Stage::Scale(column),
                    source,
                })?;
            self.step(kernels.subtract, column, pivot_row, &geometry)
                .map_err(|source| Error::Elimination {
                    stage: Stage::Subtract(column),
                    source,
                })?;
            self.stats.columns += 1;
            pivot_row += 1;
        }

        let data = self
            .scope
            .read_to_vec(&self.m)
            .map_err(|source| Error::Elimination {
                stage: Stage::ReadBack,
                source,
            })?;
        let matrix = DMatrix::from_row_slice(self.rows, self.cols, &data);
        if matrix.iter().any(|v| !v.is_finite()) {
            log::warn!(
                "Elimination of a {}x{} matrix produced non-finite values (zero pivot?)",
                self.rows,
                self.cols
            );
        }

        Ok(Elimination {
            matrix,
            stats: std::mem::take(&mut self.stats),
        })
    }

    fn resolve_kernels(&mut self) -> std::result::Result<Kernels, DeviceError> {
        let scale = self.scope.kernel(SCALE_ROW)?;
        let subtract = self.scope.kernel(SUBTRACT_ROW)?;
        let swap = match self.config.pivoting {
            PivotStrategy::None => None,
            PivotStrategy::Partial { .. } => Some(self.scope.kernel(SWAP_ROWS)?),
        };
        Ok(Kernels {
            scale,
            subtract,
            swap,
        })
    }

    fn geometry(&self, kernels: &Kernels) -> std::result::Result<ExecutionGeometry, DeviceError> {
        let ctx = self.scope.context();
        let mut max = ctx
            .max_work_group_size(kernels.scale)?
            .min(ctx.max_work_group_size(kernels.subtract)?);
        if let Some(swap) = kernels.swap {
            max = max.min(ctx.max_work_group_size(swap)?);
        }
        Ok(ExecutionGeometry::tiled_2d(
            self.cols,
            self.rows,
            self.config.tile,
            max,
        ))
    }

    /// Launch one row kernel into `P`, wait, and copy `P` back into `M`.
    ///
    /// `a` and `b` fill the two index slots: column and pivot row for the
    /// scale and subtract kernels, the two rows to exchange for the swap.
    fn step(
        &mut self,
        kernel: KernelHandle,
        a: usize,
        b: usize,
        geometry: &ExecutionGeometry,
    ) -> std::result::Result<(), DeviceError> {
        let args = [
            KernelArg::Buffer(self.m.handle()),
            KernelArg::U32(self.rows as u32),
            KernelArg::U32(self.cols as u32),
            KernelArg::Buffer(self.p.handle()),
            KernelArg::I32(a as i32),
            KernelArg::I32(b as i32),
        ];

        launch(self.scope.context(), kernel, &args, geometry)?;
        self.stats.dispatches += 1;
        self.scope.copy(&self.p, &self.m)?;
        self.stats.copies += 1;
        Ok(())
    }

    /// Bring the best pivot for `column` into `pivot_row`.
    ///
    /// Returns `false` if no row at or below `pivot_row` has a pivot larger
    /// than the tolerance.
    fn pivot(
        &mut self,
        swap: KernelHandle,
        column: usize,
        pivot_row: usize,
        geometry: &ExecutionGeometry,
    ) -> std::result::Result<bool, DeviceError> {
        let PivotStrategy::Partial { tolerance } = self.config.pivoting else {
            return Ok(true);
        };
        let data = self.scope.read_to_vec(&self.m)?;
        let cols = self.cols;
        let (best_row, best) = (pivot_row..self.rows)
            .map(|r| (r, data[r * cols + column].abs()))
            .fold((pivot_row, f64::NEG_INFINITY), |acc, cand| {
                if cand.1 > acc.1 { cand } else { acc }
            });
        if best.is_nan() || best <= tolerance {
            return Ok(false);
        }
        if best_row != pivot_row {
            self.step(swap, pivot_row, best_row, geometry)?;
            self.stats.swaps += 1;
        }
        Ok(true)
    }
}

/// Row-major copy of a matrix.
pub fn to_row_major(matrix: &DMatrix<f64>) -> Vec<f64> {
    matrix.transpose().as_slice().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_marshalling() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(to_row_major(&m), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        // Storage is column-major.
        assert_eq!(m.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn pivot_strategy_names() {
        assert_eq!(PivotStrategy::from_name("none"), Some(PivotStrategy::None));
        assert_eq!(
            PivotStrategy::from_name("Partial"),
            Some(PivotStrategy::Partial { tolerance: 1e-12 })
        );
        assert_eq!(PivotStrategy::from_name("full"), None);
    }

    #[test]
    fn default_config() {
        let config = EliminationConfig::default();
        assert_eq!(config.tile, 16);
        assert_eq!(config.pivoting, PivotStrategy::None);
    }
}
