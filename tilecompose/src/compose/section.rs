//! Section math: mapping 1D section keys onto covering 2D tiles and
//! slicing the fetched matrices back into 1D buffers.

use crate::source::{SliceAxis, SourceError, TilesetInfo};
use crate::tile::id::{parse_tile_key, tile_key};

use super::ComposeError;

/// How a 1D buffer is read out of a fetched square matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SliceOrientation {
    /// Values along one row.
    Row,
    /// Values along one column (the covering tile pair was swapped into
    /// ascending order, so the requested axis ended up second).
    Column,
    /// The tile sits on the diagonal: matrices there only store one
    /// triangle, so the row and the column are summed elementwise.
    Diagonal,
}

/// One planned 1D request: the originating key, the 2D tile that covers
/// it, and how to read the slice back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SectionRequest {
    /// The 1D key the caller asked for, used to re-key the result.
    pub key: String,
    pub zoom_level: u32,
    /// The requested position along the sliced axis.
    pub tile_pos: u64,
    /// Key of the covering 2D tile, coordinate pair sorted ascending.
    pub tile_2d_key: String,
    pub orientation: SliceOrientation,
    /// Bin offset of the slice position inside the covering tile.
    pub slice_index: usize,
}

/// Plans the covering 2D fetch for a batch of 1D section keys.
///
/// For each key `"<z>.<x>"` the tile holding `(x, slice_position)` is
/// located with the tileset's addressing scheme. The coordinate pair is
/// sorted ascending before keying, so requests on either side of the
/// diagonal of a symmetric matrix resolve to the same stored tile; the
/// orientation records which way the slice is read back out.
pub(super) fn plan(
    info: &TilesetInfo,
    axis: SliceAxis,
    slice_position: f64,
    tile_keys: &[String],
) -> Result<Vec<SectionRequest>, ComposeError> {
    // a horizontal section fixes a y coordinate, a vertical one an x
    let slice_axis_index = match axis {
        SliceAxis::Horizontal => 1,
        SliceAxis::Vertical => 0,
    };
    let axis_min = info.min_pos_along(slice_axis_index);

    let mut requests = Vec::with_capacity(tile_keys.len());
    for key in tile_keys {
        let parsed = parse_tile_key(key)?;
        if parsed.tile_pos.len() != 1 {
            return Err(ComposeError::SectionKey(key.clone()));
        }

        let zoom_level = parsed.zoom_level;
        let tile_pos = parsed.tile_pos[0];
        let tile_width = info.tile_width(zoom_level)?;
        if !(tile_width.is_finite() && tile_width > 0.0) {
            return Err(ComposeError::Source(SourceError::MissingAddressing));
        }

        let covering = (((slice_position - axis_min) / tile_width).floor() as i64).max(0) as u64;
        let (low, high) = if tile_pos <= covering {
            (tile_pos, covering)
        } else {
            (covering, tile_pos)
        };

        let orientation = if tile_pos == covering {
            SliceOrientation::Diagonal
        } else if low == tile_pos {
            SliceOrientation::Row
        } else {
            SliceOrientation::Column
        };

        let bins = info.bins_per_dimension() as usize;
        let tile_start = axis_min + covering as f64 * tile_width;
        let within = slice_position - tile_start;
        let slice_index =
            ((bins as f64 * within / tile_width).floor() as i64).clamp(0, bins as i64 - 1) as usize;

        requests.push(SectionRequest {
            key: key.clone(),
            zoom_level,
            tile_pos,
            tile_2d_key: tile_key(zoom_level, &[low, high]),
            orientation,
            slice_index,
        });
    }

    Ok(requests)
}

/// The distinct 2D keys of a plan, in first-seen order.
pub(super) fn distinct_2d_keys(requests: &[SectionRequest]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for request in requests {
        if !keys.contains(&request.tile_2d_key) {
            keys.push(request.tile_2d_key.clone());
        }
    }
    keys
}

/// Reads one 1D slice out of a row-major square matrix.
pub(super) fn extract_slice(
    dense: &[f64],
    slice_index: usize,
    orientation: SliceOrientation,
) -> Result<Vec<f64>, ComposeError> {
    let n = integer_sqrt(dense.len()).ok_or(ComposeError::NonSquareSection(dense.len()))?;
    let row_of = |index: usize| &dense[index * n..(index + 1) * n];
    let column_of = |index: usize| (0..n).map(move |row| dense[row * n + index]);

    if slice_index >= n {
        return Err(ComposeError::SliceOutOfBounds {
            slice_index,
            size: n,
        });
    }

    Ok(match orientation {
        SliceOrientation::Row => row_of(slice_index).to_vec(),
        SliceOrientation::Column => column_of(slice_index).collect(),
        SliceOrientation::Diagonal => row_of(slice_index)
            .iter()
            .zip(column_of(slice_index))
            .map(|(row, column)| row + column)
            .collect(),
    })
}

fn integer_sqrt(len: usize) -> Option<usize> {
    let n = (len as f64).sqrt().round() as usize;
    (n * n == len).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_info() -> TilesetInfo {
        TilesetInfo {
            min_pos: vec![0.0, 0.0],
            max_pos: vec![1024.0, 1024.0],
            max_zoom: 4,
            resolutions: None,
            max_width: Some(1024.0),
            bins_per_dimension: Some(256),
            name: None,
        }
    }

    #[test]
    fn test_plan_sorts_coordinates_ascending() {
        let info = legacy_info();
        // zoom 2: tile width 256; slice at y = 300 lives in y-tile 1
        let keys = vec!["2.0".to_string(), "2.3".to_string()];
        let plan = plan(&info, SliceAxis::Horizontal, 300.0, &keys).unwrap();

        assert_eq!(plan[0].tile_2d_key, "2.0.1");
        assert_eq!(plan[0].orientation, SliceOrientation::Row);
        assert_eq!(plan[1].tile_2d_key, "2.1.3");
        assert_eq!(plan[1].orientation, SliceOrientation::Column);
    }

    #[test]
    fn test_plan_marks_diagonal_tiles() {
        let info = legacy_info();
        let keys = vec!["2.1".to_string()];
        let plan = plan(&info, SliceAxis::Horizontal, 300.0, &keys).unwrap();

        assert_eq!(plan[0].tile_2d_key, "2.1.1");
        assert_eq!(plan[0].orientation, SliceOrientation::Diagonal);
    }

    #[test]
    fn test_plan_computes_bin_offset_in_covering_tile() {
        let info = legacy_info();
        // tile width 256, 256 bins, so one bin per domain unit at zoom 2
        let plan = plan(
            &info,
            SliceAxis::Horizontal,
            300.0,
            &["2.0".to_string()],
        )
        .unwrap();

        assert_eq!(plan[0].slice_index, 44);
    }

    #[test]
    fn test_plan_rejects_2d_keys() {
        let info = legacy_info();
        let result = plan(&info, SliceAxis::Horizontal, 0.0, &["2.0.0".to_string()]);
        assert!(matches!(result, Err(ComposeError::SectionKey(_))));
    }

    #[test]
    fn test_distinct_2d_keys_preserves_first_seen_order() {
        let info = legacy_info();
        // x-tiles 1 and 0 both pair with y-tile 1
        let keys = vec!["2.1".to_string(), "2.0".to_string(), "2.1".to_string()];
        let plan = plan(&info, SliceAxis::Horizontal, 300.0, &keys).unwrap();

        assert_eq!(distinct_2d_keys(&plan), vec!["2.1.1", "2.0.1"]);
    }

    #[test]
    fn test_extract_row_and_column() {
        // 3x3 row-major matrix
        let dense = vec![
            1.0, 2.0, 3.0, //
            4.0, 5.0, 6.0, //
            7.0, 8.0, 9.0,
        ];

        assert_eq!(
            extract_slice(&dense, 1, SliceOrientation::Row).unwrap(),
            vec![4.0, 5.0, 6.0]
        );
        assert_eq!(
            extract_slice(&dense, 1, SliceOrientation::Column).unwrap(),
            vec![2.0, 5.0, 8.0]
        );
    }

    #[test]
    fn test_extract_diagonal_sums_row_and_column() {
        let dense = vec![
            1.0, 2.0, 3.0, //
            4.0, 5.0, 6.0, //
            7.0, 8.0, 9.0,
        ];

        assert_eq!(
            extract_slice(&dense, 0, SliceOrientation::Diagonal).unwrap(),
            vec![2.0, 6.0, 10.0]
        );
    }

    #[test]
    fn test_diagonal_sum_reads_the_same_from_either_side() {
        let dense = vec![
            1.0, 2.0, 3.0, //
            4.0, 5.0, 6.0, //
            7.0, 8.0, 9.0,
        ];
        let transposed = vec![
            1.0, 4.0, 7.0, //
            2.0, 5.0, 8.0, //
            3.0, 6.0, 9.0,
        ];

        // row + column commutes, so a diagonal tile answers identically
        // whichever triangle the matrix was populated from
        for index in 0..3 {
            assert_eq!(
                extract_slice(&dense, index, SliceOrientation::Diagonal).unwrap(),
                extract_slice(&transposed, index, SliceOrientation::Diagonal).unwrap()
            );
        }
    }

    #[test]
    fn test_extract_rejects_non_square_buffers() {
        let result = extract_slice(&[1.0; 10], 0, SliceOrientation::Row);
        assert!(matches!(result, Err(ComposeError::NonSquareSection(10))));
    }

    #[test]
    fn test_extract_rejects_out_of_bounds_slice() {
        let result = extract_slice(&[1.0; 9], 3, SliceOrientation::Row);
        assert!(matches!(
            result,
            Err(ComposeError::SliceOutOfBounds { slice_index: 3, size: 3 })
        ));
    }
}
