//! Tiered font resolution.
//!
//! `resolve` walks a strict chain ordered by increasing latency and
//! decreasing reliability: process-local cache, durable object store,
//! remote provider, bundled fallback file, system font. Matching is exact
//! on the normalized `(family, variant)` pair — an unmatched variant falls
//! through the whole chain for that pair, it is never substituted with a
//! "closest" variant.

use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use tracing::{debug, info, warn};

use crate::{
    fonts::cache::{FontCache, FontKey},
    fonts::provider::FontProvider,
    foundation::error::{FeedforgeError, FeedforgeResult},
    store::object::ObjectStore,
};

/// Where a resolved font payload came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontOrigin {
    LocalCache,
    ObjectStore,
    RemoteProvider,
    Bundled,
    SystemDefault,
}

/// A usable glyph source at a requested size.
#[derive(Clone, Debug)]
pub struct RenderableFont {
    pub family: String,
    pub variant: String,
    pub size: f32,
    pub data: Arc<Vec<u8>>,
    pub origin: FontOrigin,
}

/// Resolver owning its ephemeral cache and the injected storage backends.
pub struct FontResolver {
    cache: FontCache,
    store: Arc<dyn ObjectStore>,
    provider: Arc<dyn FontProvider>,
    bundled_path: Option<PathBuf>,
    bundled: OnceLock<Option<Arc<Vec<u8>>>>,
    system: OnceLock<Option<Arc<Vec<u8>>>>,
}

impl FontResolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        provider: Arc<dyn FontProvider>,
        bundled_path: Option<PathBuf>,
    ) -> Self {
        Self {
            cache: FontCache::new(),
            store,
            provider,
            bundled_path,
            bundled: OnceLock::new(),
            system: OnceLock::new(),
        }
    }

    /// Resolve a `(family, variant)` pair at `size`.
    ///
    /// Degrades through the tier chain and only errors when both the
    /// bundled fallback and the system font source are unavailable — a
    /// deployment-integrity failure, not a runtime condition.
    pub async fn resolve(
        &self,
        family: &str,
        variant: &str,
        size: f32,
    ) -> FeedforgeResult<RenderableFont> {
        let key = FontKey::new(family, variant);

        if let Some(data) = self.cache.get(&key) {
            debug!(font = %key, "font resolved from local cache");
            return Ok(self.renderable(&key, size, data, FontOrigin::LocalCache));
        }

        match self.store.get(&key.object_key()).await {
            Ok(Some(bytes)) => {
                let data = Arc::new(bytes);
                self.cache.insert(key.clone(), data.clone());
                debug!(font = %key, "font resolved from durable store");
                return Ok(self.renderable(&key, size, data, FontOrigin::ObjectStore));
            }
            Ok(None) => {}
            Err(e) => warn!(font = %key, error = %e, "durable font store lookup failed"),
        }

        match self.fetch_from_provider(&key).await {
            Ok(Some(data)) => {
                info!(font = %key, "font resolved from remote provider");
                return Ok(self.renderable(&key, size, data, FontOrigin::RemoteProvider));
            }
            Ok(None) => debug!(font = %key, "remote provider has no exact variant"),
            Err(e) => warn!(font = %key, error = %e, "remote font provider failed"),
        }

        if let Some(data) = self.bundled_bytes() {
            warn!(font = %key, "falling back to bundled font");
            return Ok(self.renderable(&key, size, data, FontOrigin::Bundled));
        }

        if let Some(data) = self.system_bytes() {
            warn!(font = %key, "falling back to system default font");
            return Ok(self.renderable(&key, size, data, FontOrigin::SystemDefault));
        }

        Err(FeedforgeError::font(
            "bundled fallback font is unreadable and no system font is available",
        ))
    }

    fn renderable(
        &self,
        key: &FontKey,
        size: f32,
        data: Arc<Vec<u8>>,
        origin: FontOrigin,
    ) -> RenderableFont {
        RenderableFont {
            family: key.family().to_string(),
            variant: key.variant().to_string(),
            size,
            data,
            origin,
        }
    }

    /// Query the provider for an exact variant, then write the payload
    /// through to both cache tiers. A failed durable write is logged and
    /// does not fail resolution.
    async fn fetch_from_provider(&self, key: &FontKey) -> FeedforgeResult<Option<Arc<Vec<u8>>>> {
        let Some(listing) = self.provider.lookup(key.family()).await? else {
            return Ok(None);
        };
        let Some(url) = listing.variant_url(key.variant()) else {
            return Ok(None);
        };

        let bytes = self.provider.fetch(url).await?;
        let data = Arc::new(bytes);
        self.cache.insert(key.clone(), data.clone());

        if let Err(e) = self
            .store
            .put(&key.object_key(), data.as_slice(), "font/ttf")
            .await
        {
            warn!(font = %key, error = %e, "best-effort durable font write failed");
        }

        Ok(Some(data))
    }

    fn bundled_bytes(&self) -> Option<Arc<Vec<u8>>> {
        self.bundled
            .get_or_init(|| {
                let path = self.bundled_path.as_ref()?;
                match std::fs::read(path) {
                    Ok(bytes) => Some(Arc::new(bytes)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "bundled font unreadable");
                        None
                    }
                }
            })
            .clone()
    }

    fn system_bytes(&self) -> Option<Arc<Vec<u8>>> {
        self.system
            .get_or_init(|| {
                let mut db = fontdb::Database::new();
                db.load_system_fonts();

                let query = fontdb::Query {
                    families: &[fontdb::Family::SansSerif],
                    weight: fontdb::Weight::NORMAL,
                    stretch: fontdb::Stretch::Normal,
                    style: fontdb::Style::Normal,
                };
                let id = db.query(&query).or_else(|| db.faces().next().map(|f| f.id))?;
                db.with_face_data(id, |data, _index| data.to_vec())
                    .map(Arc::new)
            })
            .clone()
    }

    /// Number of payloads in the ephemeral cache, exposed for tests.
    pub fn cached_fonts(&self) -> usize {
        self.cache.len()
    }
}
