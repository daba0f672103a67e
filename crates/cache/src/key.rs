//! Cache keys: which image, and which rendition of it.

use std::fmt;

/// The rendition of a logical image a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageVariant {
    /// The image as loaded from its source, unmodified.
    Original,
    /// A bounded-dimension rendition used for low-cost display.
    Preview,
    /// A progressively downsampled rendition at `level` (always >= 1;
    /// level 0 means the original and is folded away at construction).
    Pyramid { level: u32 },
}

/// Lookup identity for a cached image: logical name plus rendition.
///
/// Keys are immutable values; two keys are equal iff name and variant both
/// match. Logical names are usually file paths, but producer-backed images
/// use a `tag://name` namespace (see [`crate::source::ProducerRegistry`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    name: String,
    variant: ImageVariant,
}

impl ImageKey {
    /// Key for the unmodified image.
    pub fn original(name: impl Into<String>) -> Self {
        Self { name: name.into(), variant: ImageVariant::Original }
    }

    /// Key for the bounded preview rendition.
    pub fn preview(name: impl Into<String>) -> Self {
        Self { name: name.into(), variant: ImageVariant::Preview }
    }

    /// Key for pyramid level `level`.
    ///
    /// Level 0 is the original by definition, so `pyramid(name, 0)` yields
    /// the Original key; the `Pyramid` variant always carries a level >= 1.
    pub fn pyramid(name: impl Into<String>, level: u32) -> Self {
        let variant =
            if level == 0 { ImageVariant::Original } else { ImageVariant::Pyramid { level } };
        Self { name: name.into(), variant }
    }

    /// The logical name the key addresses.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rendition the key addresses.
    pub fn variant(&self) -> &ImageVariant {
        &self.variant
    }

    /// Whether this key names an original (as opposed to a derived
    /// rendition).
    pub fn is_original(&self) -> bool {
        self.variant == ImageVariant::Original
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            ImageVariant::Original => write!(f, "{:?}", self.name),
            ImageVariant::Preview => write!(f, "{:?} (preview)", self.name),
            ImageVariant::Pyramid { level } => write!(f, "{:?} (pyramid {})", self.name, level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_over_name_and_variant() {
        assert_eq!(ImageKey::original("a.png"), ImageKey::original("a.png"));
        assert_ne!(ImageKey::original("a.png"), ImageKey::original("b.png"));
        assert_ne!(ImageKey::original("a.png"), ImageKey::preview("a.png"));
        assert_ne!(ImageKey::pyramid("a.png", 1), ImageKey::pyramid("a.png", 2));
    }

    #[test]
    fn test_pyramid_level_zero_folds_to_original() {
        assert_eq!(ImageKey::pyramid("a.png", 0), ImageKey::original("a.png"));
        assert!(ImageKey::pyramid("a.png", 0).is_original());
        assert!(!ImageKey::pyramid("a.png", 1).is_original());
    }

    #[test]
    fn test_display_names_the_rendition() {
        assert_eq!(ImageKey::original("a.png").to_string(), "\"a.png\"");
        assert_eq!(ImageKey::preview("a.png").to_string(), "\"a.png\" (preview)");
        assert_eq!(ImageKey::pyramid("a.png", 3).to_string(), "\"a.png\" (pyramid 3)");
    }
}
