//! Pano Editor Image Cache Library
//!
//! Process-wide, in-memory cache for decoded images and the renditions
//! derived from them (bounded previews and resolution-pyramid levels).
//! Records are shared through reference-counted handles; memory comes back
//! when the last outside holder lets go and the eviction policy agrees.
//!
//! ```
//! use pano_editor_cache::{CacheConfig, ImageCache};
//!
//! let cache = ImageCache::new(CacheConfig::default().with_preview_max_px(256));
//! // Nothing is loaded until a caller asks for it.
//! assert_eq!(cache.stats().records, 0);
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod global;
pub mod handle;
pub mod key;
pub mod policy;
mod refcount;
pub mod resample;
pub mod source;
pub mod store;

pub use config::{CacheConfig, ConfigError, EvictionMode};
pub use data::ImageData;
pub use error::{CacheError, DerivationError, LoadError, ResampleError};
pub use global::ImageCache;
pub use handle::ImageHandle;
pub use key::{ImageKey, ImageVariant};
pub use policy::{EvictionPolicy, MemoryBudget, ReclaimImmediately, RetainAll};
pub use resample::{LanczosResampler, Resampler};
pub use source::{FileSource, ImageSource, Producer, ProducerRegistry};
pub use store::{CacheStats, ImageStore};
