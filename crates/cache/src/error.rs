//! Error taxonomy for the cache.
//!
//! Load and derivation failures are recoverable values reported to the
//! caller and never retried by the cache itself. Bookkeeping breaches
//! (use-count underflow, a record missing from a live generation) are
//! panics, never error values; continuing past one would risk serving
//! freed memory.

use thiserror::Error;

use crate::key::ImageKey;

/// The image source could not be read or decoded.
#[derive(Debug, Error)]
#[error("failed to load image {name:?}")]
pub struct LoadError {
    /// Logical name the load was addressed by.
    pub name: String,
    /// What went wrong underneath (I/O, decode, producer failure).
    #[source]
    pub cause: Box<dyn std::error::Error + Send + Sync>,
}

impl LoadError {
    pub fn new(
        name: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self { name: name.into(), cause: cause.into() }
    }
}

/// A derived rendition could not be computed from its source.
#[derive(Debug, Error)]
#[error("failed to derive {key}: {reason}")]
pub struct DerivationError {
    /// Key of the rendition that could not be produced.
    pub key: ImageKey,
    pub reason: String,
}

impl DerivationError {
    pub fn new(key: ImageKey, reason: impl Into<String>) -> Self {
        Self { key, reason: reason.into() }
    }
}

/// A single resampling operation failed.
#[derive(Debug, Error)]
#[error("resample to {width}x{height} failed: {reason}")]
pub struct ResampleError {
    pub width: u32,
    pub height: u32,
    pub reason: String,
}

/// Failures reported by the cache facade.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_carries_name_and_cause() {
        let err = LoadError::new("shot.png", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.to_string(), "failed to load image \"shot.png\"");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cache_error_is_transparent() {
        let err = CacheError::from(DerivationError::new(
            ImageKey::preview("shot.png"),
            "resample failed",
        ));
        assert_eq!(err.to_string(), "failed to derive \"shot.png\" (preview): resample failed");
    }
}
