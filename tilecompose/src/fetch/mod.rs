//! Network collaborator seam.
//!
//! The [`TileSource`] trait is the boundary between this subsystem and
//! the transport that actually talks to tile servers. The abstraction
//! allows dependency injection and easier testing by enabling mock
//! sources in tests; [`HttpTileSource`] is the real implementation.
//!
//! Retry, backoff, and debouncing live behind this seam, not in front of
//! it: a rejected future here is surfaced to composition as-is.

mod http;

pub use http::HttpTileSource;

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::TilesetInfo;

/// Errors that can occur during collaborator requests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The HTTP request itself failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The tileset info endpoint did not return the requested tileset.
    #[error("No tileset info returned for '{0}'")]
    MissingTilesetInfo(String),
}

/// One entry of a sparse tile encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseEntry {
    pub index: usize,
    pub value: f64,
}

/// A tile record as returned by the tile server, before composition.
///
/// The payload arrives either as a dense value array or as a sparse
/// index/value list (plus the dense length); sparse payloads are expanded
/// before use. A record without either is a valid "no data" answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<Vec<SparseEntry>>,
    /// Dense length of a sparse payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl RawTile {
    /// The dense payload, expanding a sparse encoding by index.
    ///
    /// `None` when the record carries no data, or a sparse record lacks
    /// its dense length.
    pub fn dense_values(&self) -> Option<Vec<f64>> {
        if let Some(dense) = &self.dense {
            return Some(dense.clone());
        }

        let sparse = self.sparse.as_ref()?;
        let length = self.length?;

        let mut values = vec![0.0; length];
        for entry in sparse {
            if entry.index < length {
                values[entry.index] = entry.value;
            }
        }
        Some(values)
    }
}

/// Parameters for registering a raw file as a server-side tileset.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub server: String,
    pub url: String,
    pub filetype: String,
    pub coord_system: Option<String>,
}

/// A successful registration: the uid the server assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredTileset {
    pub uid: String,
}

/// Batched, non-retrying access to a tile server.
///
/// Implementors provide the three endpoints composition needs: batched
/// tile retrieval, tileset metadata, and one-shot registration of raw
/// file urls.
pub trait TileSource: Send + Sync {
    /// Fetches a batch of tiles by their full (tileset-prefixed) ids.
    ///
    /// # Arguments
    ///
    /// * `server` - The server api location (e.g. `http://localhost:8000/api/v1`)
    /// * `tile_ids` - Full tile ids (e.g. `asdf-sdfs.0.0.0`)
    /// * `options` - Opaque per-tileset options forwarded to the server
    ///
    /// # Returns
    ///
    /// Records keyed by full tile id. Ids the server has no data for may
    /// be missing or map to empty records.
    fn fetch_tiles(
        &self,
        server: &str,
        tile_ids: &[String],
        options: Option<&serde_json::Value>,
    ) -> impl Future<Output = Result<HashMap<String, RawTile>, FetchError>> + Send;

    /// Fetches the metadata of one tileset.
    fn fetch_tileset_info(
        &self,
        server: &str,
        tileset_id: &str,
    ) -> impl Future<Output = Result<TilesetInfo, FetchError>> + Send;

    /// Registers a raw file url as a tileset, returning the assigned uid.
    fn register_tileset(
        &self,
        request: &RegisterRequest,
    ) -> impl Future<Output = Result<RegisteredTileset, FetchError>> + Send;
}

/// Shared handles to a source are sources themselves.
impl<S: TileSource> TileSource for std::sync::Arc<S> {
    fn fetch_tiles(
        &self,
        server: &str,
        tile_ids: &[String],
        options: Option<&serde_json::Value>,
    ) -> impl Future<Output = Result<HashMap<String, RawTile>, FetchError>> + Send {
        (**self).fetch_tiles(server, tile_ids, options)
    }

    fn fetch_tileset_info(
        &self,
        server: &str,
        tileset_id: &str,
    ) -> impl Future<Output = Result<TilesetInfo, FetchError>> + Send {
        (**self).fetch_tileset_info(server, tileset_id)
    }

    fn register_tileset(
        &self,
        request: &RegisterRequest,
    ) -> impl Future<Output = Result<RegisteredTileset, FetchError>> + Send {
        (**self).register_tileset(request)
    }
}
