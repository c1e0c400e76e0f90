//! Tilecompose - tile resolution, composition, and extrema caching
//!
//! This library turns a declarative data-source description into concrete
//! batched tile fetches against one or more remote tile servers, composes
//! derived sources (elementwise division of two tilesets, 1D sections
//! sliced out of symmetric 2D tilesets), and annotates every returned tile
//! with precomputed non-zero extrema so rendering code can pick value
//! scales without rescanning raw buffers.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use tilecompose::service::TileService;
//! use tilecompose::source::{DataConfig, TilesetLookup};
//! use tilecompose::fetch::HttpTileSource;
//!
//! let config = DataConfig::Plain {
//!     server: "https://higlass.io/api/v1".to_string(),
//!     lookup: TilesetLookup::Id {
//!         tileset_id: "CQMd6V_cRw6iCI_-Unl3PQ".to_string(),
//!     },
//!     options: None,
//! };
//! let service = TileService::new(config, HttpTileSource::new()?);
//!
//! let tiles = service
//!     .fetch_tiles_debounced(|_| {}, &["0.0".to_string()])
//!     .await?;
//! ```

pub mod compose;
pub mod extrema;
pub mod fetch;
pub mod logging;
pub mod service;
pub mod source;
pub mod tile;

/// Version of the tilecompose library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
