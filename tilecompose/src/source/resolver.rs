//! Resolution of data-source descriptions into resolved source trees.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use tracing::debug;

use super::{DataConfig, ResolvedSource, SliceAxis, SourceError, TilesetInfo, TilesetLookup};
use crate::fetch::{RegisterRequest, TileSource};

/// A memoized in-flight or completed resolution step.
type SharedStep<T> = Shared<BoxFuture<'static, Result<T, SourceError>>>;

/// Walks a [`DataConfig`] tree and produces the corresponding
/// [`ResolvedSource`] tree, fetching tileset metadata for every leaf.
///
/// Metadata lookups are memoized by `(server, tileset_id)` and raw-file
/// registrations by `(server, url)`. Concurrent resolutions of the same
/// key share a single in-flight request rather than issuing duplicates.
/// The caches are unbounded and never invalidated; tileset metadata is
/// read-only and the resolver is expected to live for one client
/// session.
pub struct Resolver<S> {
    source: Arc<S>,
    info_cache: DashMap<(String, String), SharedStep<TilesetInfo>>,
    registration_cache: DashMap<(String, String), SharedStep<String>>,
}

impl<S: TileSource + 'static> Resolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            info_cache: DashMap::new(),
            registration_cache: DashMap::new(),
        }
    }

    /// Resolves a config tree into a resolved source tree.
    ///
    /// Children of derived sources resolve concurrently. Resolution
    /// never partially succeeds: any failing leaf rejects the whole
    /// call.
    pub fn resolve<'a>(
        &'a self,
        config: &'a DataConfig,
    ) -> BoxFuture<'a, Result<ResolvedSource, SourceError>> {
        async move {
            match config {
                DataConfig::Plain {
                    server,
                    lookup,
                    options,
                } => {
                    let tileset_id = match lookup {
                        TilesetLookup::Id { tileset_id } => tileset_id.clone(),
                        TilesetLookup::RawFile {
                            url,
                            filetype,
                            coord_system,
                        } => {
                            self.cached_registration(server, url, filetype, coord_system.clone())
                                .await?
                        }
                    };

                    let info = self.cached_info(server, &tileset_id).await?;

                    Ok(ResolvedSource::Plain {
                        server: server.clone(),
                        tileset_id,
                        options: options.clone(),
                        info,
                    })
                }
                DataConfig::Divided {
                    numerator,
                    denominator,
                } => {
                    let (numerator, denominator) =
                        future::try_join(self.resolve(numerator), self.resolve(denominator))
                            .await?;

                    Ok(ResolvedSource::Divided {
                        numerator: Box::new(numerator),
                        denominator: Box::new(denominator),
                    })
                }
                DataConfig::HorizontalSection {
                    source,
                    slice_position,
                } => Ok(ResolvedSource::Section {
                    axis: SliceAxis::Horizontal,
                    source: Box::new(self.resolve(source).await?),
                    slice_position: *slice_position,
                }),
                DataConfig::VerticalSection {
                    source,
                    slice_position,
                } => Ok(ResolvedSource::Section {
                    axis: SliceAxis::Vertical,
                    source: Box::new(self.resolve(source).await?),
                    slice_position: *slice_position,
                }),
            }
        }
        .boxed()
    }

    /// Tileset metadata, shared across concurrent callers.
    async fn cached_info(&self, server: &str, tileset_id: &str) -> Result<TilesetInfo, SourceError> {
        let key = (server.to_string(), tileset_id.to_string());

        let step = match self.info_cache.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let source = Arc::clone(&self.source);
                let server = server.to_string();
                let tileset_id = tileset_id.to_string();

                debug!(server, tileset_id, "resolving tileset info");

                let step = async move {
                    Ok(source.fetch_tileset_info(&server, &tileset_id).await?)
                }
                .boxed()
                .shared();
                entry.insert(step.clone());
                step
            }
        };

        step.await
    }

    /// Raw-file registration, shared across concurrent callers.
    async fn cached_registration(
        &self,
        server: &str,
        url: &str,
        filetype: &str,
        coord_system: Option<String>,
    ) -> Result<String, SourceError> {
        let key = (server.to_string(), url.to_string());

        let step = match self.registration_cache.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let source = Arc::clone(&self.source);
                let request = RegisterRequest {
                    server: server.to_string(),
                    url: url.to_string(),
                    filetype: filetype.to_string(),
                    coord_system,
                };

                debug!(server, url = request.url, "registering raw file as tileset");

                let step = async move {
                    let registered = source.register_tileset(&request).await?;
                    Ok(registered.uid)
                }
                .boxed()
                .shared();
                entry.insert(step.clone());
                step
            }
        };

        step.await
    }
}
