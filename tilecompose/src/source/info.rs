//! Tileset metadata and zoom-to-resolution addressing.

use serde::{Deserialize, Serialize};

use super::SourceError;

/// Immutable metadata describing one tileset.
///
/// Two mutually exclusive addressing schemes map zoom levels to data
/// resolutions:
///
/// - an explicit `resolutions` list, indexed by zoom level after sorting
///   in decreasing order (coarsest first), or
/// - the legacy power-of-two scheme, where `max_width` covers the full
///   domain at zoom 0 and every level halves the tile width, with
///   `bins_per_dimension` values per tile axis (default 256).
///
/// Field names follow the tile server wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilesetInfo {
    /// Lower domain bound, one component per dimension.
    pub min_pos: Vec<f64>,
    /// Upper domain bound, one component per dimension.
    pub max_pos: Vec<f64>,
    pub max_zoom: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolutions: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins_per_dimension: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TilesetInfo {
    /// Values per tile axis; the server default is 256.
    pub fn bins_per_dimension(&self) -> u32 {
        self.bins_per_dimension.unwrap_or(256)
    }

    /// The resolutions list sorted coarsest-first, the order zoom levels
    /// index into.
    pub fn sorted_resolutions(&self) -> Option<Vec<f64>> {
        self.resolutions.as_ref().map(|resolutions| {
            let mut sorted = resolutions.clone();
            sorted.sort_by(|a, b| b.total_cmp(a));
            sorted
        })
    }

    /// Domain units per value bin at the given zoom level.
    pub fn resolution(&self, zoom_level: u32) -> Result<f64, SourceError> {
        if let Some(sorted) = self.sorted_resolutions() {
            return sorted
                .get(zoom_level as usize)
                .copied()
                .ok_or(SourceError::ZoomOutOfRange {
                    zoom_level,
                    available: sorted.len(),
                });
        }

        let max_width = self.max_width.ok_or(SourceError::MissingAddressing)?;
        Ok(max_width / (2f64.powi(zoom_level as i32) * f64::from(self.bins_per_dimension())))
    }

    /// Domain units covered by one tile at the given zoom level.
    pub fn tile_width(&self, zoom_level: u32) -> Result<f64, SourceError> {
        if self.resolutions.is_some() {
            return Ok(self.resolution(zoom_level)? * f64::from(self.bins_per_dimension()));
        }

        let max_width = self.max_width.ok_or(SourceError::MissingAddressing)?;
        Ok(max_width / 2f64.powi(zoom_level as i32))
    }

    /// Lower domain bound along the given axis (0 = x, 1 = y).
    ///
    /// 1D tilesets only carry one component; out-of-range axes fall back
    /// to the first one.
    pub fn min_pos_along(&self, axis: usize) -> f64 {
        self.min_pos
            .get(axis)
            .or_else(|| self.min_pos.first())
            .copied()
            .unwrap_or(0.0)
    }

    /// Upper domain bound along the given axis (0 = x, 1 = y).
    pub fn max_pos_along(&self, axis: usize) -> f64 {
        self.max_pos
            .get(axis)
            .or_else(|| self.max_pos.first())
            .copied()
            .unwrap_or(0.0)
    }
}
