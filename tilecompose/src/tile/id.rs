//! Canonical tile key formatting and parsing.
//!
//! Tile keys are delimiter-joined identifiers of the form
//! `"<zoom>.<x>"` (1D) or `"<zoom>.<x>.<y>"` (2D). Prefixing a tileset
//! uid yields the full id the tile server parses in batched fetches,
//! e.g. `"xyxx.0.0.0"`.

use thiserror::Error;

/// Errors from parsing a tile key string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileKeyError {
    /// The key has no zoom component.
    #[error("Empty tile key")]
    Empty,

    /// The zoom component is not a non-negative integer.
    #[error("Invalid zoom level in tile key '{0}'")]
    InvalidZoom(String),

    /// The key carries no usable position components.
    #[error("Tile key '{0}' has no position components")]
    MissingPosition(String),

    /// Tiles are addressed by one or two coordinates, never more.
    #[error("Tile key '{0}' has {1} position components (expected 1 or 2)")]
    TooManyPositions(String, usize),
}

/// A tile key decomposed into zoom level and grid position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTileKey {
    pub zoom_level: u32,
    /// One component for 1D tiles, two for 2D tiles.
    pub tile_pos: Vec<u64>,
}

impl ParsedTileKey {
    /// Re-encodes the parsed key in canonical string form.
    pub fn to_key(&self) -> String {
        tile_key(self.zoom_level, &self.tile_pos)
    }
}

/// Formats a canonical tile key from zoom level and position.
///
/// # Example
///
/// ```
/// use tilecompose::tile::id::tile_key;
///
/// assert_eq!(tile_key(3, &[5]), "3.5");
/// assert_eq!(tile_key(0, &[0, 0]), "0.0.0");
/// ```
pub fn tile_key(zoom_level: u32, tile_pos: &[u64]) -> String {
    let mut key = zoom_level.to_string();
    for pos in tile_pos {
        key.push('.');
        key.push_str(&pos.to_string());
    }
    key
}

/// Parses a tile key back into zoom level and position.
///
/// Trailing non-numeric components (data-transform suffixes appended by
/// some callers, e.g. `"0.0.0.ice"`) are ignored, mirroring the server's
/// treatment of tile ids.
pub fn parse_tile_key(key: &str) -> Result<ParsedTileKey, TileKeyError> {
    let mut parts = key.split('.');

    let zoom_part = parts.next().filter(|p| !p.is_empty()).ok_or(TileKeyError::Empty)?;
    let zoom_level: u32 = zoom_part
        .parse()
        .map_err(|_| TileKeyError::InvalidZoom(key.to_string()))?;

    let tile_pos: Vec<u64> = parts.filter_map(|p| p.parse().ok()).collect();

    if tile_pos.is_empty() {
        return Err(TileKeyError::MissingPosition(key.to_string()));
    }
    if tile_pos.len() > 2 {
        return Err(TileKeyError::TooManyPositions(key.to_string(), tile_pos.len()));
    }

    Ok(ParsedTileKey {
        zoom_level,
        tile_pos,
    })
}

/// Prefixes a tile key with its tileset uid for use as a fetch-batch id.
///
/// # Example
///
/// ```
/// use tilecompose::tile::id::full_tile_id;
///
/// assert_eq!(full_tile_id("xyxx", "0.0.0"), "xyxx.0.0.0");
/// ```
pub fn full_tile_id(tileset_id: &str, tile_key: &str) -> String {
    format!("{}.{}", tileset_id, tile_key)
}
