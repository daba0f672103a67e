//! Process-wide access to the shared cache.

use std::sync::{Arc, OnceLock};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::handle::ImageHandle;
use crate::policy::EvictionPolicy;
use crate::resample::Resampler;
use crate::source::ImageSource;
use crate::store::{CacheStats, ImageStore};

static GLOBAL: OnceLock<ImageCache> = OnceLock::new();

/// Facade over the resource store.
///
/// Construct instances directly where injection matters (tests, embedders
/// with their own sources); use [`ImageCache::global`] for the single
/// instance the application shares. The global is built lazily on first
/// access, configured from the environment, and lives until process exit;
/// there is no teardown ordering for callers to get right.
#[derive(Clone)]
pub struct ImageCache {
    store: Arc<ImageStore>,
}

impl ImageCache {
    /// Cache with the default file-backed source and Lanczos resampler.
    pub fn new(config: CacheConfig) -> Self {
        Self { store: ImageStore::new(config) }
    }

    /// Cache with explicit collaborators; see
    /// [`ImageStore::with_parts`].
    pub fn with_parts(
        config: CacheConfig,
        source: Box<dyn ImageSource>,
        resampler: Box<dyn Resampler>,
        policy: Box<dyn EvictionPolicy>,
    ) -> Self {
        Self { store: ImageStore::with_parts(config, source, resampler, policy) }
    }

    /// The process-wide cache, built on first access.
    ///
    /// Environment overrides (`PANO_EDITOR_*`) are read once, at
    /// construction; an invalid environment logs a warning and falls back
    /// to defaults rather than failing the first image request.
    pub fn global() -> &'static ImageCache {
        GLOBAL.get_or_init(|| {
            let config = CacheConfig::from_env().unwrap_or_else(|err| {
                log::warn!("ignoring invalid cache configuration from environment: {err}");
                CacheConfig::default()
            });
            ImageCache::new(config)
        })
    }

    /// Fetch the original image, loading it on first request.
    pub fn get_original(&self, name: &str) -> Result<ImageHandle, CacheError> {
        self.store.get_original(name)
    }

    /// Fetch the bounded preview, deriving it on first request.
    pub fn get_preview(&self, name: &str) -> Result<ImageHandle, CacheError> {
        self.store.get_preview(name)
    }

    /// Fetch pyramid level `level`; level 0 is the original itself.
    pub fn get_pyramid_level(&self, name: &str, level: u32) -> Result<ImageHandle, CacheError> {
        self.store.get_pyramid_level(name, level)
    }

    /// Drop every record. Callers must have released their handles first.
    pub fn clear(&self) {
        self.store.clear()
    }

    /// Offer every unreferenced record to the eviction policy.
    pub fn reclaim(&self) {
        self.store.reclaim()
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// The underlying store, for callers that need its finer-grained
    /// surface (`contains`, `memory_used`, ...).
    pub fn store(&self) -> &Arc<ImageStore> {
        &self.store
    }
}
