//! Tile value objects.
//!
//! A [`Tile`] is created once per fetch response (or per composition step)
//! and never mutated afterwards. Composed tiles own fresh buffers; they do
//! not alias the buffers of the tiles they were derived from.

pub mod id;

use std::sync::Arc;

use crate::extrema::{DenseExtrema1D, DenseExtrema2D, ExtremaError, ExtremaIndex};

/// A fixed-size chunk of data at a given zoom level and grid position.
///
/// `dense` is absent for stub tiles: composed tiles whose children lacked
/// a payload. Stubs keep position identity so callers can still key and
/// place them, but carry no values and no extrema index.
#[derive(Debug, Clone)]
pub struct Tile {
    pub zoom_level: u32,
    /// One coordinate for 1D tiles, two for 2D tiles.
    pub tile_pos: Vec<u64>,
    /// The bare tile key this tile was requested under.
    pub tile_position_id: String,
    /// Tile payload, shared with the extrema index built over it.
    pub dense: Option<Arc<Vec<f64>>>,
    pub dtype: String,
    pub tileset_id: String,
    pub server: String,
    /// Exact extrema over the whole buffer, when known.
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Exact non-zero extrema over the whole buffer.
    pub min_non_zero: Option<f64>,
    pub max_non_zero: Option<f64>,
    /// Range-queryable extrema index, lazily absent only on stubs.
    pub extrema: Option<ExtremaIndex>,
}

impl Tile {
    /// Builds a tile around a dense buffer, constructing the extrema
    /// index whose dimensionality follows the position arity.
    ///
    /// # Errors
    ///
    /// [`ExtremaError::NonSquareLength`] when a 2D position is paired
    /// with a buffer that is not a square matrix.
    #[allow(clippy::too_many_arguments)]
    pub fn with_dense(
        zoom_level: u32,
        tile_pos: Vec<u64>,
        tile_position_id: String,
        dense: Arc<Vec<f64>>,
        dtype: String,
        tileset_id: String,
        server: String,
        min_value: Option<f64>,
        max_value: Option<f64>,
    ) -> Result<Self, ExtremaError> {
        let extrema = if tile_pos.len() == 2 {
            ExtremaIndex::TwoDim(DenseExtrema2D::new(Arc::clone(&dense), false)?)
        } else {
            ExtremaIndex::OneDim(DenseExtrema1D::new(Arc::clone(&dense)))
        };

        Ok(Self {
            zoom_level,
            tile_pos,
            tile_position_id,
            min_non_zero: Some(extrema.min_non_zero_in_tile()),
            max_non_zero: Some(extrema.max_non_zero_in_tile()),
            dense: Some(dense),
            dtype,
            tileset_id,
            server,
            min_value,
            max_value,
            extrema: Some(extrema),
        })
    }

    /// Builds a payload-less stub that keeps position identity only.
    pub fn stub(
        zoom_level: u32,
        tile_pos: Vec<u64>,
        tile_position_id: String,
        tileset_id: String,
        server: String,
    ) -> Self {
        Self {
            zoom_level,
            tile_pos,
            tile_position_id,
            dense: None,
            dtype: String::new(),
            tileset_id,
            server,
            min_value: None,
            max_value: None,
            min_non_zero: None,
            max_non_zero: None,
            extrema: None,
        }
    }

    /// Whether the tile carries a payload.
    pub fn has_dense(&self) -> bool {
        self.dense.is_some()
    }
}
