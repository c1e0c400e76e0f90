//! HTTP implementation of the tile source seam.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, trace};

use super::{FetchError, RawTile, RegisterRequest, RegisteredTileset, TileSource};
use crate::source::TilesetInfo;

/// If we request too many tiles at once the URL can get too long and
/// fail, so batches are broken into requests of at most this many ids.
const MAX_FETCH_TILES_PER_REQUEST: usize = 15;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Real tile source backed by an async reqwest client.
///
/// Talks to the tile server HTTP API:
///
/// - `GET {server}/tiles/?d=<id>&d=<id>&s=<session>`
/// - `GET {server}/tileset_info/?d=<uid>&s=<session>`
/// - `POST {server}/register_url/`
#[derive(Debug, Clone)]
pub struct HttpTileSource {
    client: reqwest::Client,
    session_id: String,
}

impl HttpTileSource {
    /// Creates a tile source with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a tile source with a custom request timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            session_id: new_session_id(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        trace!(url, "tile server GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("Failed to decode response: {}", e)))
    }
}

impl TileSource for HttpTileSource {
    async fn fetch_tiles(
        &self,
        server: &str,
        tile_ids: &[String],
        options: Option<&serde_json::Value>,
    ) -> Result<HashMap<String, RawTile>, FetchError> {
        let server = trim_trailing_slash(server);
        let mut tiles = HashMap::with_capacity(tile_ids.len());

        debug!(server, count = tile_ids.len(), "fetching tile batch");

        for chunk in tile_ids.chunks(MAX_FETCH_TILES_PER_REQUEST) {
            let batch: HashMap<String, RawTile> = match options {
                // Options ride in a POST body, grouped per tileset.
                Some(options) => {
                    let url = format!("{}/tiles/?s={}", server, self.session_id);
                    let body = group_by_tileset(chunk, options);
                    self.post_tiles(&url, &body).await?
                }
                None => {
                    let params: Vec<String> =
                        chunk.iter().map(|id| format!("d={}", id)).collect();
                    let url = format!(
                        "{}/tiles/?{}&s={}",
                        server,
                        params.join("&"),
                        self.session_id
                    );
                    self.get_json(&url).await?
                }
            };
            tiles.extend(batch);
        }

        Ok(tiles)
    }

    async fn fetch_tileset_info(
        &self,
        server: &str,
        tileset_id: &str,
    ) -> Result<TilesetInfo, FetchError> {
        let url = format!(
            "{}/tileset_info/?d={}&s={}",
            trim_trailing_slash(server),
            tileset_id,
            self.session_id
        );

        debug!(server, tileset_id, "fetching tileset info");

        // The endpoint answers with a map keyed by tileset uid.
        let mut infos: HashMap<String, TilesetInfo> = self.get_json(&url).await?;
        infos
            .remove(tileset_id)
            .ok_or_else(|| FetchError::MissingTilesetInfo(tileset_id.to_string()))
    }

    async fn register_tileset(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisteredTileset, FetchError> {
        let url = format!("{}/register_url/", trim_trailing_slash(&request.server));

        debug!(url = request.url, filetype = request.filetype, "registering file url");

        let payload = RegisterPayload {
            fileurl: &request.url,
            filetype: &request.filetype,
            coord_system: request.coord_system.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("Failed to decode response: {}", e)))
    }
}

impl HttpTileSource {
    async fn post_tiles(
        &self,
        url: &str,
        body: &[TilesetRequestBody<'_>],
    ) -> Result<HashMap<String, RawTile>, FetchError> {
        trace!(url, "tile server POST");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("Failed to decode response: {}", e)))
    }
}

#[derive(Serialize)]
struct RegisterPayload<'a> {
    fileurl: &'a str,
    filetype: &'a str,
    #[serde(rename = "coordSystem", skip_serializing_if = "Option::is_none")]
    coord_system: Option<&'a str>,
}

#[derive(Debug, PartialEq, Serialize)]
struct TilesetRequestBody<'a> {
    #[serde(rename = "tilesetUid")]
    tileset_uid: String,
    #[serde(rename = "tileIds")]
    tile_ids: Vec<String>,
    options: &'a serde_json::Value,
}

/// Groups full tile ids by their tileset uid prefix for the POST body.
fn group_by_tileset<'a>(
    tile_ids: &[String],
    options: &'a serde_json::Value,
) -> Vec<TilesetRequestBody<'a>> {
    let mut body: Vec<TilesetRequestBody<'a>> = Vec::new();

    for id in tile_ids {
        let (uid, tile_id) = match id.split_once('.') {
            Some(parts) => parts,
            None => continue,
        };

        match body.iter_mut().find(|b| b.tileset_uid == uid) {
            Some(entry) => entry.tile_ids.push(tile_id.to_string()),
            None => body.push(TilesetRequestBody {
                tileset_uid: uid.to_string(),
                tile_ids: vec![tile_id.to_string()],
                options,
            }),
        }
    }

    body
}

fn trim_trailing_slash(server: &str) -> &str {
    server.trim_end_matches('/')
}

/// Per-process session id appended to requests so the server can group
/// them, mirroring the transport the subsystem was extracted from.
fn new_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{:x}-{:x}", std::process::id(), nanos)
}
