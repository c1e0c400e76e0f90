//! Exact range extrema over a 1D tile buffer.

use std::sync::Arc;

use super::{max_non_zero, min_non_zero, NUM_PRECOMP_SUBSETS_PER_1D_TILE};

/// Precomputed non-zero extrema index over a 1D buffer.
///
/// The buffer is (virtually) padded to the next power of two and split
/// into `min(16, padded_size)` contiguous equal-size subsets whose
/// non-zero extrema are computed once. Range queries combine linear scans
/// of the partial boundary regions with the precomputed subset values, so
/// results are exact for every `[start, end)` range while large aligned
/// ranges cost far less than a full scan.
///
/// The index holds a shared reference to the buffer it was built from and
/// is never mutated after construction.
#[derive(Debug, Clone)]
pub struct DenseExtrema1D {
    data: Arc<Vec<f64>>,
    tile_size: usize,
    subset_size: usize,
    subset_minimums: Vec<f64>,
    subset_maximums: Vec<f64>,
    min_non_zero_in_tile: f64,
    max_non_zero_in_tile: f64,
}

impl DenseExtrema1D {
    /// Builds the index, precomputing per-subset and whole-tile extrema.
    pub fn new(data: Arc<Vec<f64>>) -> Self {
        let tile_size = data.len();
        // Tile sizes might not be powers of two; subsets past the real
        // end of the buffer stay empty and hold infinity sentinels.
        let padded_tile_size = tile_size.next_power_of_two().max(1);

        let num_subsets = NUM_PRECOMP_SUBSETS_PER_1D_TILE.min(padded_tile_size);
        let subset_size = padded_tile_size / num_subsets;

        let mut subset_minimums = Vec::with_capacity(num_subsets);
        let mut subset_maximums = Vec::with_capacity(num_subsets);

        for i in 0..num_subsets {
            let start = (i * subset_size).min(tile_size);
            let end = (start + subset_size).min(tile_size).max(start);
            subset_minimums.push(min_non_zero(&data[start..end]));
            subset_maximums.push(max_non_zero(&data[start..end]));
        }

        let min_non_zero_in_tile = min_non_zero(&subset_minimums);
        let max_non_zero_in_tile = max_non_zero(&subset_maximums);

        Self {
            data,
            tile_size,
            subset_size,
            subset_minimums,
            subset_maximums,
            min_non_zero_in_tile,
            max_non_zero_in_tile,
        }
    }

    /// Number of elements in the underlying buffer.
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Exact non-zero minimum over the whole buffer.
    ///
    /// `f64::INFINITY` when the buffer holds no data above the epsilon
    /// threshold.
    pub fn min_non_zero_in_tile(&self) -> f64 {
        self.min_non_zero_in_tile
    }

    /// Exact non-zero maximum over the whole buffer.
    ///
    /// `f64::NEG_INFINITY` when the buffer holds no data above the
    /// epsilon threshold.
    pub fn max_non_zero_in_tile(&self) -> f64 {
        self.max_non_zero_in_tile
    }

    /// Exact non-zero minimum over `[start, end)`.
    pub fn min_in_range(&self, start: usize, end: usize) -> f64 {
        if start == 0 && end == self.tile_size {
            return self.min_non_zero_in_tile;
        }

        let first_subset = start.div_ceil(self.subset_size);
        let last_subset = end.saturating_sub(1) / self.subset_size;

        if first_subset >= last_subset {
            // The range does not span a full subset, scan it directly.
            return min_non_zero(self.slice(start, end));
        }

        let mut cur_min = f64::INFINITY;

        let lead_end = first_subset * self.subset_size;
        if start < lead_end {
            cur_min = cur_min.min(min_non_zero(self.slice(start, lead_end)));
        }

        cur_min = cur_min.min(min_non_zero(
            &self.subset_minimums[first_subset..last_subset],
        ));

        let tail_start = last_subset * self.subset_size;
        if end > tail_start {
            cur_min = cur_min.min(min_non_zero(self.slice(tail_start, end)));
        }

        cur_min
    }

    /// Exact non-zero maximum over `[start, end)`.
    pub fn max_in_range(&self, start: usize, end: usize) -> f64 {
        if start == 0 && end == self.tile_size {
            return self.max_non_zero_in_tile;
        }

        let first_subset = start.div_ceil(self.subset_size);
        let last_subset = end.saturating_sub(1) / self.subset_size;

        if first_subset >= last_subset {
            return max_non_zero(self.slice(start, end));
        }

        let mut cur_max = f64::NEG_INFINITY;

        let lead_end = first_subset * self.subset_size;
        if start < lead_end {
            cur_max = cur_max.max(max_non_zero(self.slice(start, lead_end)));
        }

        cur_max = cur_max.max(max_non_zero(
            &self.subset_maximums[first_subset..last_subset],
        ));

        let tail_start = last_subset * self.subset_size;
        if end > tail_start {
            cur_max = cur_max.max(max_non_zero(self.slice(tail_start, end)));
        }

        cur_max
    }

    /// Slice of the buffer clamped to its real (unpadded) length.
    fn slice(&self, start: usize, end: usize) -> &[f64] {
        let start = start.min(self.tile_size);
        let end = end.min(self.tile_size).max(start);
        &self.data[start..end]
    }
}
