//! Precomputed non-zero extrema over dense tile buffers.
//!
//! Rendering code repeatedly needs the smallest and largest meaningful
//! values inside the currently visible slice of a tile to choose color and
//! height scales. Scanning the raw buffer on every frame is too slow, so
//! tiles carry one of two index structures built once at construction:
//!
//! - [`DenseExtrema1D`] subdivides a 1D buffer into equal subsets with
//!   precomputed extrema and answers arbitrary range queries exactly.
//! - [`DenseExtrema2D`] subdivides a square matrix into a regular grid of
//!   cells and answers rectangle queries approximately, by reducing over
//!   the covering cells.
//!
//! Values within [`EXTREMA_EPSILON`] of zero are treated as "no data" and
//! never reported as extrema. NaN (the division-by-zero sentinel produced
//! by divided tilesets) is likewise skipped.

mod dense1d;
mod dense2d;

pub use dense1d::DenseExtrema1D;
pub use dense2d::DenseExtrema2D;

use thiserror::Error;

/// Values with an absolute value below this threshold count as "no data".
pub const EXTREMA_EPSILON: f64 = 1e-6;

/// Number of precomputed subsets per 1D tile.
///
/// Setting this to 1 is equivalent to no precomputation in most cases;
/// larger values make sub-range queries cheaper at the cost of a bigger
/// index.
pub const NUM_PRECOMP_SUBSETS_PER_1D_TILE: usize = 16;

/// Number of precomputed subset cells per matrix axis for 2D tiles.
///
/// Larger values give tighter approximations for rectangle queries
/// (more expensive to build).
pub const NUM_PRECOMP_SUBSETS_PER_2D_TILE: usize = 8;

/// Errors that can occur while building an extrema index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtremaError {
    /// A 2D index requires a buffer of quadratic length.
    #[error("Buffer length {0} is not a perfect square")]
    NonSquareLength(usize),
}

/// An extrema index of either dimensionality, owned by a tile.
///
/// The variant follows the tile's position arity: one coordinate gives a
/// 1D index, two coordinates a 2D index.
#[derive(Debug, Clone)]
pub enum ExtremaIndex {
    OneDim(DenseExtrema1D),
    TwoDim(DenseExtrema2D),
}

impl ExtremaIndex {
    /// The exact non-zero minimum over the whole tile.
    pub fn min_non_zero_in_tile(&self) -> f64 {
        match self {
            ExtremaIndex::OneDim(index) => index.min_non_zero_in_tile(),
            ExtremaIndex::TwoDim(index) => index.min_non_zero_in_tile(),
        }
    }

    /// The exact non-zero maximum over the whole tile.
    pub fn max_non_zero_in_tile(&self) -> f64 {
        match self {
            ExtremaIndex::OneDim(index) => index.max_non_zero_in_tile(),
            ExtremaIndex::TwoDim(index) => index.max_non_zero_in_tile(),
        }
    }

    /// Returns the 1D index, if this is one.
    pub fn as_1d(&self) -> Option<&DenseExtrema1D> {
        match self {
            ExtremaIndex::OneDim(index) => Some(index),
            ExtremaIndex::TwoDim(_) => None,
        }
    }

    /// Returns the 2D index, if this is one.
    pub fn as_2d(&self) -> Option<&DenseExtrema2D> {
        match self {
            ExtremaIndex::OneDim(_) => None,
            ExtremaIndex::TwoDim(index) => Some(index),
        }
    }
}

/// Non-zero minimum of a slice by direct linear scan.
///
/// Returns `f64::INFINITY` when no value passes the epsilon filter.
pub fn min_non_zero(values: &[f64]) -> f64 {
    let mut cur_min = f64::INFINITY;
    for &x in values {
        if x.abs() < EXTREMA_EPSILON {
            continue;
        }
        // NaN comparisons are false, so NaN sentinels are skipped here
        if x < cur_min {
            cur_min = x;
        }
    }
    cur_min
}

/// Non-zero maximum of a slice by direct linear scan.
///
/// Returns `f64::NEG_INFINITY` when no value passes the epsilon filter.
pub fn max_non_zero(values: &[f64]) -> f64 {
    let mut cur_max = f64::NEG_INFINITY;
    for &x in values {
        if x.abs() < EXTREMA_EPSILON {
            continue;
        }
        if x > cur_max {
            cur_max = x;
        }
    }
    cur_max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_non_zero_skips_epsilon_values() {
        let values = [0.0, 1e-9, -1e-9, 3.0, 2.0];
        assert_eq!(min_non_zero(&values), 2.0);
    }

    #[test]
    fn test_max_non_zero_handles_negatives() {
        let values = [0.0, -5.0, -2.0];
        assert_eq!(max_non_zero(&values), -2.0);
    }

    #[test]
    fn test_scans_skip_nan() {
        let values = [f64::NAN, 4.0, f64::NAN, 7.0];
        assert_eq!(min_non_zero(&values), 4.0);
        assert_eq!(max_non_zero(&values), 7.0);
    }

    #[test]
    fn test_empty_scan_returns_sentinels() {
        assert_eq!(min_non_zero(&[]), f64::INFINITY);
        assert_eq!(max_non_zero(&[]), f64::NEG_INFINITY);
        assert_eq!(min_non_zero(&[0.0, 0.0]), f64::INFINITY);
    }
}
