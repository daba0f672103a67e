//! Byte loading: where original images come from.

use std::collections::HashMap;

use crate::data::ImageData;
use crate::error::LoadError;

/// Supplies original image payloads by logical name.
///
/// The store calls this on every original-image miss, outside its lock.
/// A load either completes or fails; there is no cancellation and the
/// cache never retries a failed load on its own.
pub trait ImageSource: Send + Sync {
    fn load(&self, name: &str) -> Result<ImageData, LoadError>;
}

/// Loads images from the filesystem, decoding via the `image` crate.
///
/// The logical name is used verbatim as a path; every format the `image`
/// crate's default feature set knows is accepted.
#[derive(Debug, Default)]
pub struct FileSource;

impl ImageSource for FileSource {
    fn load(&self, name: &str) -> Result<ImageData, LoadError> {
        let decoded = image::open(name).map_err(|err| LoadError::new(name, err))?;
        Ok(ImageData::from_rgba(decoded.to_rgba8()))
    }
}

/// Generator for a producer-backed image. Receives the part of the logical
/// name after the `tag://` prefix.
pub type Producer = Box<dyn Fn(&str) -> Result<ImageData, LoadError> + Send + Sync>;

/// Routes producer-tagged names to registered generators.
///
/// Special, non-file-backed images share the logical-name namespace with
/// files by carrying a `tag://rest` prefix: a registered tag resolves
/// through its producer, anything else falls through to the wrapped
/// source. The cache itself never needs to know which names are special.
pub struct ProducerRegistry {
    producers: HashMap<String, Producer>,
    fallback: Box<dyn ImageSource>,
}

impl ProducerRegistry {
    pub fn new(fallback: Box<dyn ImageSource>) -> Self {
        Self { producers: HashMap::new(), fallback }
    }

    /// Register a generator for `tag://...` names. Replaces any previous
    /// producer for the same tag.
    pub fn register(&mut self, tag: impl Into<String>, producer: Producer) {
        self.producers.insert(tag.into(), producer);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_producer(mut self, tag: impl Into<String>, producer: Producer) -> Self {
        self.register(tag, producer);
        self
    }
}

impl ImageSource for ProducerRegistry {
    fn load(&self, name: &str) -> Result<ImageData, LoadError> {
        if let Some((tag, rest)) = name.split_once("://") {
            if let Some(producer) = self.producers.get(tag) {
                return producer(rest);
            }
        }
        self.fallback.load(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_image(width: u32, height: u32, value: u8) -> ImageData {
        ImageData::new(vec![value; width as usize * height as usize * 4], width, height)
    }

    #[test]
    fn test_file_source_reports_missing_file() {
        let err = FileSource.load("definitely/not/here.png").unwrap_err();
        assert_eq!(err.name, "definitely/not/here.png");
    }

    #[test]
    fn test_registry_routes_tagged_names() {
        let registry = ProducerRegistry::new(Box::new(FileSource)).with_producer(
            "gradient",
            Box::new(|rest| {
                assert_eq!(rest, "gray");
                Ok(flat_image(4, 4, 128))
            }),
        );

        let data = registry.load("gradient://gray").unwrap();
        assert_eq!((data.width(), data.height()), (4, 4));
    }

    #[test]
    fn test_registry_falls_back_for_unknown_tags() {
        let registry = ProducerRegistry::new(Box::new(FileSource));
        // No producer for this tag; the fallback treats the whole name as
        // a path and fails to find it.
        let err = registry.load("nope://whatever").unwrap_err();
        assert_eq!(err.name, "nope://whatever");
    }

    #[test]
    fn test_producer_failures_surface_as_load_errors() {
        let registry = ProducerRegistry::new(Box::new(FileSource)).with_producer(
            "broken",
            Box::new(|rest| {
                Err(LoadError::new(format!("broken://{rest}"), "producer exploded".to_string()))
            }),
        );

        let err = registry.load("broken://x").unwrap_err();
        assert_eq!(err.name, "broken://x");
    }
}
