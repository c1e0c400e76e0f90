//! Tile composition over a resolved source tree.
//!
//! The [`Composer`] turns a batch of bare tile keys into finished
//! [`Tile`]s by walking the [`ResolvedSource`] tree: plain leaves fetch
//! and re-key, divided nodes combine two congruent child batches into a
//! ratio, and section nodes slice 1D tracks out of 2D matrices. Every
//! composed tile owns a fresh buffer and a fresh extrema index.

mod section;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use thiserror::Error;
use tracing::{debug, trace};

use crate::extrema::ExtremaError;
use crate::fetch::{FetchError, TileSource};
use crate::source::{ResolvedSource, SliceAxis, SourceError};
use crate::tile::id::{full_tile_id, parse_tile_key, TileKeyError};
use crate::tile::Tile;

/// Dtype reported for composed buffers.
const COMPOSED_DTYPE: &str = "float32";

/// Errors from composing a tile batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposeError {
    /// A collaborator request failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Zoom-to-resolution addressing failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// An extrema index could not be built over a composed buffer.
    #[error(transparent)]
    Extrema(#[from] ExtremaError),

    /// A requested tile key could not be parsed.
    #[error(transparent)]
    TileKey(#[from] TileKeyError),

    /// A child batch came back without a requested key.
    #[error("Composition is missing tile '{0}'")]
    MissingTile(String),

    /// Sections are addressed with 1D keys.
    #[error("Section tile key '{0}' is not one-dimensional")]
    SectionKey(String),

    /// A section fetched a matrix whose length is not a perfect square.
    #[error("Section source buffer of length {0} is not a square matrix")]
    NonSquareSection(usize),

    /// The slice position mapped outside the covering matrix.
    #[error("Slice index {slice_index} is outside a {size}x{size} matrix")]
    SliceOutOfBounds { slice_index: usize, size: usize },
}

/// Composes batches of tiles from a resolved source tree.
pub struct Composer<S> {
    source: Arc<S>,
}

impl<S: TileSource> Composer<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Fetches and composes a batch of tiles, keyed by bare tile key.
    ///
    /// Every requested key is present in the result; keys the backing
    /// server has no data for come back as payload-less stubs. Any
    /// failed branch rejects the whole batch.
    pub fn fetch_tiles<'a>(
        &'a self,
        resolved: &'a ResolvedSource,
        tile_keys: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, Tile>, ComposeError>> {
        async move {
            match resolved {
                ResolvedSource::Plain {
                    server,
                    tileset_id,
                    options,
                    ..
                } => {
                    self.fetch_plain(server, tileset_id, options.as_ref(), tile_keys)
                        .await
                }
                ResolvedSource::Divided {
                    numerator,
                    denominator,
                } => self.fetch_divided(numerator, denominator, tile_keys).await,
                ResolvedSource::Section {
                    axis,
                    source,
                    slice_position,
                } => {
                    self.fetch_section(*axis, source, *slice_position, tile_keys)
                        .await
                }
            }
        }
        .boxed()
    }

    /// One batched fetch of a plain leaf, re-keyed to bare keys.
    async fn fetch_plain(
        &self,
        server: &str,
        tileset_id: &str,
        options: Option<&serde_json::Value>,
        tile_keys: &[String],
    ) -> Result<HashMap<String, Tile>, ComposeError> {
        let full_ids: Vec<String> = tile_keys
            .iter()
            .map(|key| full_tile_id(tileset_id, key))
            .collect();

        debug!(server, tileset_id, count = tile_keys.len(), "fetching plain batch");

        let mut raw = self.source.fetch_tiles(server, &full_ids, options).await?;

        let mut tiles = HashMap::with_capacity(tile_keys.len());
        for (key, full_id) in tile_keys.iter().zip(&full_ids) {
            let parsed = parse_tile_key(key)?;
            let record = raw.remove(full_id);

            let dense = record.as_ref().and_then(|record| record.dense_values());
            let tile = match dense {
                Some(dense) => {
                    let record = record.unwrap_or_default();
                    Tile::with_dense(
                        parsed.zoom_level,
                        parsed.tile_pos,
                        key.clone(),
                        Arc::new(dense),
                        record.dtype.unwrap_or_else(|| COMPOSED_DTYPE.to_string()),
                        tileset_id.to_string(),
                        server.to_string(),
                        record.min_value,
                        record.max_value,
                    )?
                }
                None => {
                    trace!(key, "no payload for tile, keeping stub");
                    Tile::stub(
                        parsed.zoom_level,
                        parsed.tile_pos,
                        key.clone(),
                        tileset_id.to_string(),
                        server.to_string(),
                    )
                }
            };
            tiles.insert(key.clone(), tile);
        }

        Ok(tiles)
    }

    /// Elementwise ratio of two congruent child batches.
    async fn fetch_divided(
        &self,
        numerator: &ResolvedSource,
        denominator: &ResolvedSource,
        tile_keys: &[String],
    ) -> Result<HashMap<String, Tile>, ComposeError> {
        let (numerators, denominators) = future::try_join(
            self.fetch_tiles(numerator, tile_keys),
            self.fetch_tiles(denominator, tile_keys),
        )
        .await?;

        let mut tiles = HashMap::with_capacity(tile_keys.len());
        for key in tile_keys {
            let numerator = numerators
                .get(key)
                .ok_or_else(|| ComposeError::MissingTile(key.clone()))?;
            let denominator = denominators
                .get(key)
                .ok_or_else(|| ComposeError::MissingTile(key.clone()))?;

            let tile = match (&numerator.dense, &denominator.dense) {
                (Some(num), Some(den)) => {
                    let ratio = divide_values(num, den);
                    Tile::with_dense(
                        numerator.zoom_level,
                        numerator.tile_pos.clone(),
                        key.clone(),
                        Arc::new(ratio),
                        COMPOSED_DTYPE.to_string(),
                        numerator.tileset_id.clone(),
                        numerator.server.clone(),
                        None,
                        None,
                    )?
                }
                // one empty child empties the ratio as well
                _ => Tile::stub(
                    numerator.zoom_level,
                    numerator.tile_pos.clone(),
                    key.clone(),
                    numerator.tileset_id.clone(),
                    numerator.server.clone(),
                ),
            };
            tiles.insert(key.clone(), tile);
        }

        Ok(tiles)
    }

    /// 1D slices of a 2D source at a fixed coordinate.
    async fn fetch_section(
        &self,
        axis: SliceAxis,
        source: &ResolvedSource,
        slice_position: f64,
        tile_keys: &[String],
    ) -> Result<HashMap<String, Tile>, ComposeError> {
        let info = source.tileset_info();
        let plan = section::plan(info, axis, slice_position, tile_keys)?;
        let covering_keys = section::distinct_2d_keys(&plan);

        debug!(
            requested = tile_keys.len(),
            covering = covering_keys.len(),
            slice_position,
            "fetching section batch"
        );

        let covering = self.fetch_tiles(source, &covering_keys).await?;

        let mut tiles = HashMap::with_capacity(plan.len());
        for request in plan {
            let matrix = covering
                .get(&request.tile_2d_key)
                .ok_or_else(|| ComposeError::MissingTile(request.tile_2d_key.clone()))?;

            let tile = match &matrix.dense {
                Some(dense) => {
                    let values =
                        section::extract_slice(dense, request.slice_index, request.orientation)?;
                    let (min_value, max_value) = value_bounds(&values);
                    Tile::with_dense(
                        request.zoom_level,
                        vec![request.tile_pos],
                        request.key.clone(),
                        Arc::new(values),
                        matrix.dtype.clone(),
                        matrix.tileset_id.clone(),
                        matrix.server.clone(),
                        min_value,
                        max_value,
                    )?
                }
                None => Tile::stub(
                    request.zoom_level,
                    vec![request.tile_pos],
                    request.key.clone(),
                    matrix.tileset_id.clone(),
                    matrix.server.clone(),
                ),
            };
            tiles.insert(request.key, tile);
        }

        Ok(tiles)
    }
}

/// Elementwise ratio with an explicit NaN sentinel for zero denominators.
///
/// The ratio always has the numerator's length; positions past the end
/// of the denominator divide by nothing and become NaN as well, so the
/// composed buffer keeps the shape extrema construction expects.
fn divide_values(numerators: &[f64], denominators: &[f64]) -> Vec<f64> {
    numerators
        .iter()
        .enumerate()
        .map(|(i, &num)| match denominators.get(i) {
            Some(&den) if den != 0.0 => num / den,
            _ => f64::NAN,
        })
        .collect()
}

/// Exact min/max over a slice, skipping NaN sentinels.
fn value_bounds(values: &[f64]) -> (Option<f64>, Option<f64>) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &value in values {
        if value.is_nan() {
            continue;
        }
        min = min.min(value);
        max = max.max(value);
    }

    if min <= max {
        (Some(min), Some(max))
    } else {
        (None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::MockTileSource;
    use crate::fetch::RawTile;
    use crate::source::{TilesetInfo, TilesetLookup};

    fn info_2d() -> TilesetInfo {
        TilesetInfo {
            min_pos: vec![0.0, 0.0],
            max_pos: vec![12.0, 12.0],
            max_zoom: 0,
            resolutions: None,
            max_width: Some(12.0),
            bins_per_dimension: Some(3),
            name: None,
        }
    }

    fn plain(server: &str, uid: &str, info: TilesetInfo) -> ResolvedSource {
        ResolvedSource::Plain {
            server: server.to_string(),
            tileset_id: uid.to_string(),
            options: None,
            info,
        }
    }

    fn raw_dense(values: Vec<f64>) -> RawTile {
        RawTile {
            dense: Some(values),
            ..Default::default()
        }
    }

    fn composer_with(tiles: Vec<(&str, RawTile)>) -> (Arc<MockTileSource>, Composer<MockTileSource>) {
        let mut mock = MockTileSource::default();
        for (id, tile) in tiles {
            mock.tiles.insert(id.to_string(), tile);
        }
        let mock = Arc::new(mock);
        (Arc::clone(&mock), Composer::new(mock))
    }

    #[tokio::test]
    async fn test_plain_batch_is_rekeyed_with_provenance() {
        let (_, composer) = composer_with(vec![("uid.1.0", raw_dense(vec![0.0, 3.0, 5.0]))]);
        let source = plain("s", "uid", info_2d());

        let tiles = composer
            .fetch_tiles(&source, &["1.0".to_string()])
            .await
            .unwrap();

        let tile = &tiles["1.0"];
        assert_eq!(tile.tileset_id, "uid");
        assert_eq!(tile.server, "s");
        assert_eq!(tile.zoom_level, 1);
        assert_eq!(tile.tile_pos, vec![0]);
        assert_eq!(tile.min_non_zero, Some(3.0));
        assert_eq!(tile.max_non_zero, Some(5.0));
    }

    #[tokio::test]
    async fn test_plain_batch_stubs_missing_tiles() {
        let (mock, composer) = composer_with(vec![("uid.1.0", raw_dense(vec![1.0]))]);
        let source = plain("s", "uid", info_2d());

        let tiles = composer
            .fetch_tiles(&source, &["1.0".to_string(), "1.1".to_string()])
            .await
            .unwrap();

        assert!(tiles["1.0"].has_dense());
        assert!(!tiles["1.1"].has_dense());
        assert_eq!(tiles["1.1"].tile_position_id, "1.1");
        assert_eq!(mock.tile_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_divided_uses_nan_for_zero_denominators() {
        let (_, composer) = composer_with(vec![
            ("num.0.0", raw_dense(vec![1.0, 2.0, 3.0])),
            ("den.0.0", raw_dense(vec![2.0, 0.0, 4.0])),
        ]);
        let source = ResolvedSource::Divided {
            numerator: Box::new(plain("s", "num", info_2d())),
            denominator: Box::new(plain("s", "den", info_2d())),
        };

        let tiles = composer
            .fetch_tiles(&source, &["0.0".to_string()])
            .await
            .unwrap();

        let dense = tiles["0.0"].dense.as_ref().unwrap();
        assert_eq!(dense[0], 0.5);
        assert!(dense[1].is_nan());
        assert_eq!(dense[2], 0.75);

        // the NaN sentinel never surfaces as an extremum
        assert_eq!(tiles["0.0"].min_non_zero, Some(0.5));
        assert_eq!(tiles["0.0"].max_non_zero, Some(0.75));
    }

    #[tokio::test]
    async fn test_divided_stub_propagates_when_one_child_is_empty() {
        let (_, composer) = composer_with(vec![("num.0.0", raw_dense(vec![1.0, 2.0]))]);
        let source = ResolvedSource::Divided {
            numerator: Box::new(plain("s", "num", info_2d())),
            denominator: Box::new(plain("s", "den", info_2d())),
        };

        let tiles = composer
            .fetch_tiles(&source, &["0.0".to_string()])
            .await
            .unwrap();

        assert!(!tiles["0.0"].has_dense());
        assert!(tiles["0.0"].extrema.is_none());
    }

    #[tokio::test]
    async fn test_section_extracts_row_and_rekeys() {
        // zoom 0 over a 12-unit domain with 3 bins: one 3x3 tile
        let (_, composer) = composer_with(vec![(
            "uid.0.0.0",
            raw_dense(vec![
                1.0, 2.0, 3.0, //
                4.0, 5.0, 6.0, //
                7.0, 8.0, 9.0,
            ]),
        )]);
        let source = ResolvedSource::Section {
            axis: SliceAxis::Horizontal,
            source: Box::new(plain("s", "uid", info_2d())),
            slice_position: 5.0,
        };

        let tiles = composer
            .fetch_tiles(&source, &["0.0".to_string()])
            .await
            .unwrap();

        // x-tile 0 == covering y-tile 0, so the diagonal sum applies;
        // slice position 5.0 maps to bin 1 of 3
        let tile = &tiles["0.0"];
        assert_eq!(tile.tile_pos, vec![0]);
        assert_eq!(tile.dense.as_ref().unwrap().as_slice(), &[6.0, 10.0, 14.0]);
        assert_eq!(tile.min_value, Some(6.0));
        assert_eq!(tile.max_value, Some(14.0));
        assert!(matches!(
            tile.extrema,
            Some(crate::extrema::ExtremaIndex::OneDim(_))
        ));
    }

    #[tokio::test]
    async fn test_section_batch_deduplicates_covering_fetches() {
        let (mock, composer) = composer_with(vec![(
            "uid.0.0.0",
            raw_dense(vec![
                1.0, 2.0, 3.0, //
                4.0, 5.0, 6.0, //
                7.0, 8.0, 9.0,
            ]),
        )]);
        let source = ResolvedSource::Section {
            axis: SliceAxis::Horizontal,
            source: Box::new(plain("s", "uid", info_2d())),
            slice_position: 5.0,
        };

        // both keys (the second carries a transform suffix) cover the
        // same 2D tile, which is fetched once
        let tiles = composer
            .fetch_tiles(&source, &["0.0".to_string(), "0.0.raw".to_string()])
            .await
            .unwrap();

        assert_eq!(tiles.len(), 2);
        assert!(tiles["0.0"].has_dense());
        assert!(tiles["0.0.raw"].has_dense());
        assert_eq!(mock.tile_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_key_rejects_whole_batch() {
        let (_, composer) = composer_with(vec![]);
        let source = plain("s", "uid", info_2d());

        let tiles = composer
            .fetch_tiles(&source, &["not-a-key".to_string()])
            .await;

        assert!(matches!(tiles, Err(ComposeError::TileKey(_))));
    }

    #[test]
    fn test_divide_values_keeps_numerator_length() {
        let ratio = divide_values(&[4.0, 9.0, 16.0], &[2.0, 3.0]);

        assert_eq!(ratio.len(), 3);
        assert_eq!(ratio[0], 2.0);
        assert_eq!(ratio[1], 3.0);
        assert!(ratio[2].is_nan(), "missing denominator entry becomes NaN");
    }

    #[test]
    fn test_value_bounds_skip_nan_and_keep_zero() {
        let (min, max) = value_bounds(&[f64::NAN, 0.0, 2.0]);
        assert_eq!(min, Some(0.0));
        assert_eq!(max, Some(2.0));

        assert_eq!(value_bounds(&[f64::NAN]), (None, None));
    }
}
