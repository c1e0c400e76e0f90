//! Declarative data-source descriptions and their resolved form.
//!
//! A [`DataConfig`] describes where tile data comes from: a plain tileset
//! on a server, the elementwise ratio of two sources, or a 1D section
//! sliced out of a 2D source at a fixed coordinate. Configs form a tree;
//! only `Plain` leaves talk to the network.
//!
//! Resolution is two-phase: the immutable input config is walked once and
//! produces a distinct [`ResolvedSource`] tree in which every leaf carries
//! its assigned tileset id and fetched [`TilesetInfo`]. The input is never
//! mutated, so "resolved" is a type, not a flag.

mod info;
mod resolver;

pub use info::TilesetInfo;
pub use resolver::Resolver;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::FetchError;

/// Errors from resolving a data-source description.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// A collaborator request failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A zoom level indexed past the tileset's resolutions list.
    #[error("Zoom level {zoom_level} exceeds the {available} available resolutions")]
    ZoomOutOfRange { zoom_level: u32, available: usize },

    /// The tileset info carries neither addressing scheme.
    #[error("Tileset info has neither resolutions nor max_width addressing")]
    MissingAddressing,
}

/// How a plain leaf identifies its tileset on the server.
///
/// A pre-registered tileset is addressed by uid. A raw file is addressed
/// by url and filetype; it must be registered with the server (assigning
/// a uid) before tile requests can be served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TilesetLookup {
    Id {
        tileset_id: String,
    },
    RawFile {
        url: String,
        filetype: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coord_system: Option<String>,
    },
}

/// A declarative, possibly recursive, data-source description.
///
/// The closed set of variants makes invalid shapes unrepresentable: a
/// divided source always has exactly a numerator and a denominator, and a
/// section always carries its slice position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DataConfig {
    /// A single tileset on a tile server.
    Plain {
        server: String,
        #[serde(flatten)]
        lookup: TilesetLookup,
        /// Opaque options forwarded to the tile endpoint.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<serde_json::Value>,
    },
    /// The elementwise ratio of two congruent sources.
    Divided {
        numerator: Box<DataConfig>,
        denominator: Box<DataConfig>,
    },
    /// A 1D row sliced out of a 2D source at a fixed y coordinate.
    HorizontalSection {
        source: Box<DataConfig>,
        slice_position: f64,
    },
    /// A 1D column sliced out of a 2D source at a fixed x coordinate.
    VerticalSection {
        source: Box<DataConfig>,
        slice_position: f64,
    },
}

/// Which axis a section slices across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceAxis {
    Horizontal,
    Vertical,
}

/// A fully resolved source tree: the same shape as the [`DataConfig`] it
/// came from, with tileset identity and metadata attached to every leaf.
#[derive(Debug, Clone)]
pub enum ResolvedSource {
    Plain {
        server: String,
        tileset_id: String,
        options: Option<serde_json::Value>,
        info: TilesetInfo,
    },
    Divided {
        numerator: Box<ResolvedSource>,
        denominator: Box<ResolvedSource>,
    },
    Section {
        axis: SliceAxis,
        source: Box<ResolvedSource>,
        slice_position: f64,
    },
}

impl ResolvedSource {
    /// The tileset info this source presents to consumers.
    ///
    /// A divided source reuses the numerator's info (the children are
    /// assumed congruent and the denominator is not validated); a section
    /// presents the 2D child's info restricted to one axis by the caller.
    pub fn tileset_info(&self) -> &TilesetInfo {
        match self {
            ResolvedSource::Plain { info, .. } => info,
            ResolvedSource::Divided { numerator, .. } => numerator.tileset_info(),
            ResolvedSource::Section { source, .. } => source.tileset_info(),
        }
    }
}
