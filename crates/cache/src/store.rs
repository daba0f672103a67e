//! The resource store: load-on-miss, derived renditions, deferred eviction.
//!
//! One mutex scopes the record map, the use counters, and the in-flight
//! reservations, so a lookup-plus-increment can never race an eviction of
//! the same key. Loading and resampling happen outside the lock behind a
//! per-key reservation: a second request for a key that is already being
//! produced waits for the first instead of duplicating the work.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};

use log::debug;

use crate::config::{CacheConfig, EvictionMode};
use crate::data::ImageData;
use crate::error::{CacheError, DerivationError};
use crate::handle::ImageHandle;
use crate::key::{ImageKey, ImageVariant};
use crate::policy::{EvictionPolicy, MemoryBudget, ReclaimImmediately, RetainAll};
use crate::refcount::{UsageObserver, UseCount};
use crate::resample::{LanczosResampler, Resampler};
use crate::source::{FileSource, ImageSource};

/// Counters describing cache behavior since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of records currently cached.
    pub records: usize,
    /// Total payload bytes currently cached.
    pub memory_used: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to produce their record first.
    pub misses: u64,
    /// Originals loaded from a source.
    pub loads: u64,
    /// Previews and pyramid levels computed.
    pub derivations: u64,
    /// Records reclaimed by the eviction policy.
    pub evictions: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// One cached image.
struct Record {
    payload: Arc<ImageData>,
    uses: UseCount,
    /// Key of the original this record was derived from; `None` for
    /// originals. An index lookup, never an owning link.
    derived_from: Option<ImageKey>,
}

struct StoreState {
    records: HashMap<ImageKey, Record>,
    /// Keys with a load or derivation in flight. At most one producer per
    /// key; everyone else waits on the store's condvar.
    pending: HashSet<ImageKey>,
    memory_used: usize,
    /// Bumped by `clear`. Handles stamped with an older generation are
    /// ignored on retain/release instead of tripping the underflow panic.
    generation: u64,
    policy: Box<dyn EvictionPolicy>,
    stats: CacheStats,
}

impl StoreState {
    /// Serve-able record: present, and for derived renditions the original
    /// it was computed from must still be present. A stale derived record
    /// is dropped here and reported as absent so the caller rebuilds it.
    fn has_valid(&mut self, key: &ImageKey) -> bool {
        let valid = match self.records.get(key) {
            None => return false,
            Some(record) => match &record.derived_from {
                Some(source) => self.records.contains_key(source),
                None => true,
            },
        };
        if !valid {
            debug!("dropping stale derived record {key}");
            self.remove_record(key);
        }
        valid
    }

    fn install(&mut self, key: ImageKey, payload: ImageData, derived_from: Option<ImageKey>) {
        if derived_from.is_none() {
            self.stats.loads += 1;
        } else {
            self.stats.derivations += 1;
        }
        debug!("cached {key} ({} bytes)", payload.memory_size());
        self.memory_used += payload.memory_size();
        self.records
            .insert(key, Record { payload: Arc::new(payload), uses: UseCount::new(), derived_from });
        self.sync_stats();
    }

    /// Removing a record is the only place payload memory is given up.
    fn remove_record(&mut self, key: &ImageKey) {
        if let Some(record) = self.records.remove(key) {
            self.memory_used = self.memory_used.saturating_sub(record.payload.memory_size());
            self.sync_stats();
        }
    }

    fn has_dependents(&self, key: &ImageKey) -> bool {
        self.records.values().any(|record| record.derived_from.as_ref() == Some(key))
    }

    /// Evicts `key` if nothing holds it, nothing depends on it, and the
    /// policy agrees.
    ///
    /// Eviction is deferred while a derived record still names `key` as
    /// its source; evicting a derived record re-offers its source, which
    /// is how a deferred eviction eventually happens.
    fn evict_if_unreferenced(&mut self, key: &ImageKey) {
        let Some(record) = self.records.get(key) else { return };
        if !record.uses.is_sole_holder() {
            return;
        }
        if self.has_dependents(key) {
            debug!("eviction of {key} deferred: derived records depend on it");
            return;
        }
        let bytes = record.payload.memory_size();
        if !self.policy.should_evict(key, bytes, self.memory_used) {
            return;
        }
        let source = record.derived_from.clone();
        self.remove_record(key);
        self.stats.evictions += 1;
        debug!("evicted {key} ({bytes} bytes)");
        if let Some(source) = source {
            self.evict_if_unreferenced(&source);
        }
    }

    fn sync_stats(&mut self) {
        self.stats.records = self.records.len();
        self.stats.memory_used = self.memory_used;
    }
}

impl UsageObserver for StoreState {
    /// The store became the sole remaining holder of `key`; decide about
    /// eviction, synchronously, on the releasing caller's thread.
    fn notify(&mut self, key: &ImageKey) {
        self.evict_if_unreferenced(key);
    }
}

/// A finished load or derivation, ready to install.
struct BuiltRecord {
    payload: ImageData,
    derived_from: Option<ImageKey>,
    /// Handles to the records this payload was derived from, held until
    /// the derived record is installed so its sources cannot be evicted
    /// in the window between derivation and insert.
    pins: Vec<ImageHandle>,
}

/// Shared store for original images and their derived renditions.
///
/// Records are reference counted: the store itself holds every record
/// once, and every [`ImageHandle`] adds one. When the last outside handle
/// goes away the eviction policy decides whether the record is reclaimed
/// or kept warm for the next request.
///
/// # Example
///
/// ```
/// use pano_editor_cache::{
///     CacheConfig, FileSource, ImageData, ImageStore, LanczosResampler, MemoryBudget,
///     ProducerRegistry,
/// };
///
/// let source = ProducerRegistry::new(Box::new(FileSource)).with_producer(
///     "flat",
///     Box::new(|_| Ok(ImageData::new(vec![255; 16 * 16 * 4], 16, 16))),
/// );
/// let store = ImageStore::with_parts(
///     CacheConfig::default(),
///     Box::new(source),
///     Box::new(LanczosResampler),
///     Box::new(MemoryBudget::with_mb(64)),
/// );
///
/// let image = store.get_original("flat://white").unwrap();
/// assert_eq!((image.width(), image.height()), (16, 16));
/// ```
pub struct ImageStore {
    state: Mutex<StoreState>,
    work_done: Condvar,
    source: Box<dyn ImageSource>,
    resampler: Box<dyn Resampler>,
    config: CacheConfig,
}

impl ImageStore {
    /// Store with the default file-backed source and Lanczos resampler;
    /// the eviction policy comes from `config.eviction`.
    pub fn new(config: CacheConfig) -> Arc<Self> {
        let policy: Box<dyn EvictionPolicy> = match config.eviction {
            EvictionMode::RetainAll => Box::new(RetainAll),
            EvictionMode::Immediate => Box::new(ReclaimImmediately),
            EvictionMode::Budget => Box::new(MemoryBudget::new(config.memory_budget)),
        };
        Self::with_parts(config, Box::new(FileSource), Box::new(LanczosResampler), policy)
    }

    /// Store with explicit collaborators, for tests and embedders that
    /// bring their own loading, resampling, or eviction behavior.
    pub fn with_parts(
        config: CacheConfig,
        source: Box<dyn ImageSource>,
        resampler: Box<dyn Resampler>,
        policy: Box<dyn EvictionPolicy>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StoreState {
                records: HashMap::new(),
                pending: HashSet::new(),
                memory_used: 0,
                generation: 0,
                policy,
                stats: CacheStats::default(),
            }),
            work_done: Condvar::new(),
            source,
            resampler,
            config,
        })
    }

    /// Fetch the original image, loading it on first request.
    ///
    /// Load failures are reported to the caller and leave nothing behind;
    /// the cache never retries on its own.
    pub fn get_original(self: &Arc<Self>, name: &str) -> Result<ImageHandle, CacheError> {
        self.lookup_or_build(ImageKey::original(name))
    }

    /// Fetch the bounded preview, deriving it (and the original, if
    /// needed) on first request.
    pub fn get_preview(self: &Arc<Self>, name: &str) -> Result<ImageHandle, CacheError> {
        self.lookup_or_build(ImageKey::preview(name))
    }

    /// Fetch pyramid level `level`, deriving every level below it first.
    /// Level 0 is the original itself.
    pub fn get_pyramid_level(
        self: &Arc<Self>,
        name: &str,
        level: u32,
    ) -> Result<ImageHandle, CacheError> {
        self.lookup_or_build(ImageKey::pyramid(name, level))
    }

    /// Drops every record unconditionally.
    ///
    /// Callers are expected to have released their handles first. A handle
    /// that outlives `clear` keeps its own payload readable (the buffer is
    /// shared) but its record is gone and its eventual release is ignored.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        let dropped = state.records.len();
        state.records.clear();
        state.memory_used = 0;
        state.generation += 1;
        state.sync_stats();
        debug!("cleared {dropped} cached images");
    }

    /// Explicit memory-pressure sweep: every unreferenced record is
    /// offered to the eviction policy. Derived records go first so a
    /// record freed by the sweep can free its source in the same pass.
    pub fn reclaim(&self) {
        let mut state = self.state.lock().unwrap();
        let mut candidates: Vec<ImageKey> = state
            .records
            .iter()
            .filter(|(_, record)| record.uses.is_sole_holder())
            .map(|(key, _)| key.clone())
            .collect();
        candidates.sort_by_key(|key| key.is_original());
        for key in candidates {
            state.evict_if_unreferenced(&key);
        }
    }

    /// Whether a record for `key` is currently cached.
    pub fn contains(&self, key: &ImageKey) -> bool {
        self.state.lock().unwrap().records.contains_key(key)
    }

    /// Number of records currently cached.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total payload bytes currently cached.
    pub fn memory_used(&self) -> usize {
        self.state.lock().unwrap().memory_used
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap().stats
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Re-registers a cloned handle. Ignored for handles from before the
    /// last `clear`.
    pub(crate) fn retain(&self, key: &ImageKey, generation: u64) {
        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            return;
        }
        let record = state
            .records
            .get_mut(key)
            .expect("cloned a handle for a record missing from a live generation");
        record.uses.increment();
    }

    /// Releases one handle. When the store becomes the sole holder the
    /// observer fires and may evict, inside this same critical section.
    pub(crate) fn release(&self, key: &ImageKey, generation: u64) {
        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            // Released after clear(); the record is already gone.
            return;
        }
        let transitioned = {
            let record = state
                .records
                .get_mut(key)
                .expect("released a handle for a record missing from a live generation");
            record.uses.decrement()
        };
        if transitioned {
            state.notify(key);
        }
    }

    fn lookup_or_build(self: &Arc<Self>, key: ImageKey) -> Result<ImageHandle, CacheError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.has_valid(&key) {
                state.stats.hits += 1;
                return Ok(self.issue_handle(&mut state, &key));
            }
            if state.pending.contains(&key) {
                // Someone else is producing this key; wait for the outcome
                // rather than duplicating the work.
                state = self.work_done.wait(state).unwrap();
                continue;
            }
            break;
        }
        state.stats.misses += 1;
        state.pending.insert(key.clone());
        drop(state);

        // Loading and resampling are slow; they run outside the lock
        // behind the reservation.
        let built = self.build(&key);

        let mut state = self.state.lock().unwrap();
        state.pending.remove(&key);
        self.work_done.notify_all();
        match built {
            Ok(BuiltRecord { payload, derived_from, pins }) => {
                state.install(key.clone(), payload, derived_from);
                let handle = self.issue_handle(&mut state, &key);
                drop(state);
                // Source pins release only now, after the derived record
                // is installed: the dependency check sees the dependent
                // and defers evicting the source.
                drop(pins);
                Ok(handle)
            }
            // Nothing was inserted; woken waiters run their own attempt.
            Err(err) => Err(err),
        }
    }

    fn build(self: &Arc<Self>, key: &ImageKey) -> Result<BuiltRecord, CacheError> {
        match *key.variant() {
            ImageVariant::Original => {
                let data = self.source.load(key.name())?;
                debug!("loaded {key} at {}x{}", data.width(), data.height());
                Ok(BuiltRecord { payload: data, derived_from: None, pins: Vec::new() })
            }
            ImageVariant::Preview => {
                // The original is materialized first; its load errors are
                // the caller's to see.
                let original = self.lookup_or_build(ImageKey::original(key.name()))?;
                let (width, height) =
                    preview_dims(original.width(), original.height(), self.config.preview_max_px);
                let data = self
                    .resampler
                    .resample(&original, width, height)
                    .map_err(|err| DerivationError::new(key.clone(), err.to_string()))?;
                Ok(BuiltRecord {
                    payload: data,
                    derived_from: Some(ImageKey::original(key.name())),
                    pins: vec![original],
                })
            }
            ImageVariant::Pyramid { level } => {
                // Level n comes from level n-1, recursively; level 0 folds
                // to the original. Target dimensions are measured against
                // the original, not the level above.
                let below = self.lookup_or_build(ImageKey::pyramid(key.name(), level - 1))?;
                let original = self.lookup_or_build(ImageKey::original(key.name()))?;
                let (width, height) = pyramid_dims(original.width(), original.height(), level);
                let data = self
                    .resampler
                    .resample(&below, width, height)
                    .map_err(|err| DerivationError::new(key.clone(), err.to_string()))?;
                Ok(BuiltRecord {
                    payload: data,
                    derived_from: Some(ImageKey::original(key.name())),
                    pins: vec![below, original],
                })
            }
        }
    }

    fn issue_handle(self: &Arc<Self>, state: &mut StoreState, key: &ImageKey) -> ImageHandle {
        let generation = state.generation;
        let record = state
            .records
            .get_mut(key)
            .expect("a record must be present when a handle is issued");
        record.uses.increment();
        ImageHandle::new(Arc::clone(&record.payload), key.clone(), generation, Arc::downgrade(self))
    }
}

/// Preview dimensions: longest side capped at `max_px`, aspect preserved
/// within rounding, never upscaled. An original already inside the bound
/// keeps its size.
fn preview_dims(width: u32, height: u32, max_px: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_px {
        return (width.max(1), height.max(1));
    }
    let scale = |side: u32| -> u32 {
        (((side as u64) * (max_px as u64) + (longest as u64) / 2) / (longest as u64)).max(1) as u32
    };
    (scale(width), scale(height))
}

/// Nominal pyramid dimensions: width / level, height / level², clamped to
/// at least one pixel. Level 1 therefore matches the original's size; the
/// asymmetric height falloff is intentional and kept as documented.
fn pyramid_dims(orig_width: u32, orig_height: u32, level: u32) -> (u32, u32) {
    let width = (orig_width / level).max(1);
    let height = (orig_height / level.saturating_mul(level)).max(1);
    (width, height)
}
