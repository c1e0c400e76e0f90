//! High-level facade over resolution and composition.
//!
//! A [`TileService`] owns one data-source description and one transport.
//! The description is resolved lazily on first use and the resolved tree
//! is reused for every subsequent batch, so tileset metadata is fetched
//! at most once per leaf for the lifetime of the service.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::compose::{ComposeError, Composer};
use crate::fetch::TileSource;
use crate::source::{DataConfig, ResolvedSource, Resolver, TilesetInfo};
use crate::tile::Tile;

/// Fetches composed tile batches for one configured data source.
pub struct TileService<S> {
    config: DataConfig,
    resolver: Resolver<S>,
    composer: Composer<S>,
    resolved: OnceCell<ResolvedSource>,
}

impl<S: TileSource + 'static> TileService<S> {
    pub fn new(config: DataConfig, source: S) -> Self {
        let source = Arc::new(source);
        Self {
            config,
            resolver: Resolver::new(Arc::clone(&source)),
            composer: Composer::new(source),
            resolved: OnceCell::new(),
        }
    }

    /// Fetches and composes a batch of tiles by bare tile key.
    ///
    /// Callers are expected to debounce their own request stream; each
    /// call here issues one composed fetch. The callback is invoked once
    /// with the finished batch before the same map is returned, matching
    /// the event-driven consumer interface this service is plugged into.
    ///
    /// # Errors
    ///
    /// Resolution and composition failures reject the whole batch; the
    /// callback is not invoked in that case.
    pub async fn fetch_tiles_debounced<F>(
        &self,
        on_received: F,
        tile_keys: &[String],
    ) -> Result<HashMap<String, Tile>, ComposeError>
    where
        F: FnOnce(&HashMap<String, Tile>),
    {
        let resolved = self.resolved().await?;
        let tiles = self.composer.fetch_tiles(resolved, tile_keys).await?;

        debug!(count = tiles.len(), "composed tile batch ready");

        on_received(&tiles);
        Ok(tiles)
    }

    /// The tileset info this source presents, resolving it if necessary.
    ///
    /// The callback is invoked once with the info before it is returned.
    pub async fn tileset_info<F>(&self, on_info: F) -> Result<TilesetInfo, ComposeError>
    where
        F: FnOnce(&TilesetInfo),
    {
        let resolved = self.resolved().await?;
        let info = resolved.tileset_info().clone();
        on_info(&info);
        Ok(info)
    }

    /// The resolved source tree, built once on first use.
    ///
    /// Failed resolutions are not cached here; the next call retries.
    async fn resolved(&self) -> Result<&ResolvedSource, ComposeError> {
        self.resolved
            .get_or_try_init(|| async {
                let resolved = self.resolver.resolve(&self.config).await?;
                Ok::<_, ComposeError>(resolved)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::fetch::tests::MockTileSource;
    use crate::fetch::RawTile;
    use crate::source::TilesetLookup;

    fn info_1d() -> TilesetInfo {
        TilesetInfo {
            min_pos: vec![0.0],
            max_pos: vec![1024.0],
            max_zoom: 4,
            resolutions: None,
            max_width: Some(1024.0),
            bins_per_dimension: Some(256),
            name: Some("track".to_string()),
        }
    }

    fn service_with_tile() -> (Arc<MockTileSource>, TileService<Arc<MockTileSource>>) {
        let mut mock = MockTileSource::default();
        mock.infos
            .insert(("s".to_string(), "uid".to_string()), info_1d());
        mock.tiles.insert(
            "uid.1.0".to_string(),
            RawTile {
                dense: Some(vec![0.0, 2.0, 4.0]),
                ..Default::default()
            },
        );
        let mock = Arc::new(mock);

        let config = DataConfig::Plain {
            server: "s".to_string(),
            lookup: TilesetLookup::Id {
                tileset_id: "uid".to_string(),
            },
            options: None,
        };

        (Arc::clone(&mock), TileService::new(config, Arc::clone(&mock)))
    }

    #[tokio::test]
    async fn test_fetch_invokes_callback_with_returned_batch() {
        let (_, service) = service_with_tile();

        let mut seen = Vec::new();
        let tiles = service
            .fetch_tiles_debounced(
                |batch| seen.extend(batch.keys().cloned()),
                &["1.0".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(seen, vec!["1.0".to_string()]);
        assert_eq!(tiles["1.0"].max_non_zero, Some(4.0));
    }

    #[tokio::test]
    async fn test_resolution_happens_once_across_batches() {
        let (mock, service) = service_with_tile();

        service
            .fetch_tiles_debounced(|_| {}, &["1.0".to_string()])
            .await
            .unwrap();
        service
            .fetch_tiles_debounced(|_| {}, &["1.0".to_string()])
            .await
            .unwrap();

        assert_eq!(mock.info_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.tile_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tileset_info_surfaces_resolved_metadata() {
        let (_, service) = service_with_tile();

        let mut seen_name = None;
        let info = service
            .tileset_info(|info| seen_name = info.name.clone())
            .await
            .unwrap();

        assert_eq!(info, info_1d());
        assert_eq!(seen_name, Some("track".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_tileset_rejects_and_skips_callback() {
        let mock = Arc::new(MockTileSource::default());
        let config = DataConfig::Plain {
            server: "s".to_string(),
            lookup: TilesetLookup::Id {
                tileset_id: "missing".to_string(),
            },
            options: None,
        };
        let service = TileService::new(config, Arc::clone(&mock));

        let mut invoked = false;
        let result = service
            .fetch_tiles_debounced(|_| invoked = true, &["0.0".to_string()])
            .await;

        assert!(result.is_err());
        assert!(!invoked);
    }
}
