//! Approximate rectangle extrema over a square 2D tile buffer.

use std::sync::Arc;

use super::{EXTREMA_EPSILON, NUM_PRECOMP_SUBSETS_PER_2D_TILE};
use crate::extrema::ExtremaError;

/// Precomputed non-zero extrema index over a row-major `n x n` matrix.
///
/// The matrix is subdivided into a regular grid of at most
/// `8 x 8` square cells whose non-zero extrema are computed once.
/// Rectangle queries reduce over the covering set of whole cells, so the
/// result is an approximation: it never misses a value inside the
/// requested rectangle but may include values from the partially covered
/// boundary cells. Whole-tile queries cover every cell completely and are
/// therefore exact.
///
/// For symmetric sources that store only the lower-left triangle, pass
/// `symmetric = true` at construction: the lower-left cell triangle is
/// reflected onto the upper-right before any query can observe the index,
/// so repeated-mirroring corruption cannot occur.
#[derive(Debug, Clone)]
pub struct DenseExtrema2D {
    tile_size: usize,
    num_subsets: usize,
    subset_size: usize,
    /// Row-major `num_subsets x num_subsets` grids of per-cell extrema.
    subset_minimums: Vec<f64>,
    subset_maximums: Vec<f64>,
    min_non_zero_in_tile: f64,
    max_non_zero_in_tile: f64,
}

impl DenseExtrema2D {
    /// Builds the index over a row-major buffer of quadratic length.
    ///
    /// # Arguments
    ///
    /// * `data` - Row-major matrix buffer, length must be `n * n`
    /// * `symmetric` - Reflect the lower-left cell triangle onto the
    ///   upper-right (for sources that only populate one triangle)
    ///
    /// # Errors
    ///
    /// [`ExtremaError::NonSquareLength`] if the buffer length is not a
    /// perfect square.
    pub fn new(data: Arc<Vec<f64>>, symmetric: bool) -> Result<Self, ExtremaError> {
        let tile_size = integer_sqrt(data.len())
            .ok_or(ExtremaError::NonSquareLength(data.len()))?;

        // num_subsets == tile_size computes extrema exactly (expensive)
        let grid_hint = NUM_PRECOMP_SUBSETS_PER_2D_TILE.min(tile_size.max(1));
        let subset_size = tile_size.div_ceil(grid_hint).max(1);
        let num_subsets = tile_size.div_ceil(subset_size).max(1);

        let mut subset_minimums = vec![f64::INFINITY; num_subsets * num_subsets];
        let mut subset_maximums = vec![f64::NEG_INFINITY; num_subsets * num_subsets];

        for cell_row in 0..num_subsets {
            for cell_col in 0..num_subsets {
                let (min, max) = scan_region(
                    &data,
                    tile_size,
                    cell_row * subset_size,
                    cell_col * subset_size,
                    subset_size,
                );
                subset_minimums[cell_row * num_subsets + cell_col] = min;
                subset_maximums[cell_row * num_subsets + cell_col] = max;
            }
        }

        if symmetric {
            mirror_lower_left(&mut subset_minimums, num_subsets);
            mirror_lower_left(&mut subset_maximums, num_subsets);
        }

        let min_non_zero_in_tile = reduce_min(&subset_minimums);
        let max_non_zero_in_tile = reduce_max(&subset_maximums);

        Ok(Self {
            tile_size,
            num_subsets,
            subset_size,
            subset_minimums,
            subset_maximums,
            min_non_zero_in_tile,
            max_non_zero_in_tile,
        })
    }

    /// Side length of the indexed matrix.
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Exact non-zero minimum over the whole matrix.
    pub fn min_non_zero_in_tile(&self) -> f64 {
        self.min_non_zero_in_tile
    }

    /// Exact non-zero maximum over the whole matrix.
    pub fn max_non_zero_in_tile(&self) -> f64 {
        self.max_non_zero_in_tile
    }

    /// Approximate non-zero minimum over the rectangle
    /// `[start_x, end_x] x [start_y, end_y]`.
    ///
    /// The value is taken over the covering set of whole subset cells: a
    /// lower bound on the true rectangle minimum, and exact whenever the
    /// rectangle is aligned to cell boundaries.
    pub fn min_in_range(&self, start_x: usize, start_y: usize, end_x: usize, end_y: usize) -> f64 {
        let (row_start, col_start, row_end, col_end) =
            self.covering_cells(start_x, start_y, end_x, end_y);

        let mut cur_min = f64::INFINITY;
        for row in row_start..row_end {
            for col in col_start..col_end {
                let x = self.subset_minimums[row * self.num_subsets + col];
                if x.abs() < EXTREMA_EPSILON {
                    continue;
                }
                if x < cur_min {
                    cur_min = x;
                }
            }
        }
        cur_min
    }

    /// Approximate non-zero maximum over the rectangle
    /// `[start_x, end_x] x [start_y, end_y]`.
    ///
    /// Upper-bound analogue of [`Self::min_in_range`].
    pub fn max_in_range(&self, start_x: usize, start_y: usize, end_x: usize, end_y: usize) -> f64 {
        let (row_start, col_start, row_end, col_end) =
            self.covering_cells(start_x, start_y, end_x, end_y);

        let mut cur_max = f64::NEG_INFINITY;
        for row in row_start..row_end {
            for col in col_start..col_end {
                let x = self.subset_maximums[row * self.num_subsets + col];
                if x.abs() < EXTREMA_EPSILON {
                    continue;
                }
                if x > cur_max {
                    cur_max = x;
                }
            }
        }
        cur_max
    }

    /// Translates a data-space rectangle to the covering cell rectangle.
    fn covering_cells(
        &self,
        start_x: usize,
        start_y: usize,
        end_x: usize,
        end_y: usize,
    ) -> (usize, usize, usize, usize) {
        let row_start = (start_y / self.subset_size).min(self.num_subsets);
        let col_start = (start_x / self.subset_size).min(self.num_subsets);
        let row_end = (end_y + 1).div_ceil(self.subset_size).min(self.num_subsets);
        let col_end = (end_x + 1).div_ceil(self.subset_size).min(self.num_subsets);
        (row_start, col_start, row_end.max(row_start), col_end.max(col_start))
    }
}

/// Copies the lower-left cell triangle onto the upper-right one.
fn mirror_lower_left(cells: &mut [f64], num_subsets: usize) {
    for row in 1..num_subsets {
        for col in 0..row {
            cells[col * num_subsets + row] = cells[row * num_subsets + col];
        }
    }
}

/// Non-zero extrema of a `size x size` region of a row-major matrix,
/// clamped to the matrix bounds.
fn scan_region(
    data: &[f64],
    tile_size: usize,
    row_offset: usize,
    col_offset: usize,
    size: usize,
) -> (f64, f64) {
    let mut cur_min = f64::INFINITY;
    let mut cur_max = f64::NEG_INFINITY;

    let row_end = (row_offset + size).min(tile_size);
    let col_end = (col_offset + size).min(tile_size);

    for row in row_offset..row_end {
        for col in col_offset..col_end {
            let x = data[row * tile_size + col];
            if x.abs() < EXTREMA_EPSILON {
                continue;
            }
            if x < cur_min {
                cur_min = x;
            }
            if x > cur_max {
                cur_max = x;
            }
        }
    }

    (cur_min, cur_max)
}

fn reduce_min(cells: &[f64]) -> f64 {
    let mut cur_min = f64::INFINITY;
    for &x in cells {
        if x.abs() < EXTREMA_EPSILON {
            continue;
        }
        if x < cur_min {
            cur_min = x;
        }
    }
    cur_min
}

fn reduce_max(cells: &[f64]) -> f64 {
    let mut cur_max = f64::NEG_INFINITY;
    for &x in cells {
        if x.abs() < EXTREMA_EPSILON {
            continue;
        }
        if x > cur_max {
            cur_max = x;
        }
    }
    cur_max
}

/// Integer square root, `Some(n)` only when the input is exactly `n * n`.
fn integer_sqrt(len: usize) -> Option<usize> {
    let n = (len as f64).sqrt().round() as usize;
    if n * n == len {
        Some(n)
    } else {
        None
    }
}
