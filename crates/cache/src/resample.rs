//! Downsampling for previews and pyramid levels.

use image::imageops::{self, FilterType};

use crate::data::ImageData;
use crate::error::ResampleError;

/// Produces a rendition of an image at the requested dimensions.
///
/// Implementations must low-pass filter before subsampling. Naive
/// pixel-skip decimation aliases badly on the detailed imagery this cache
/// exists for and is not an acceptable implementation.
pub trait Resampler: Send + Sync {
    fn resample(&self, src: &ImageData, width: u32, height: u32)
        -> Result<ImageData, ResampleError>;
}

/// Default resampler: Lanczos3, a windowed-sinc kernel whose support acts
/// as the low-pass stage. The same filter the photo pipeline uses for
/// thumbnails.
#[derive(Debug, Default)]
pub struct LanczosResampler;

impl Resampler for LanczosResampler {
    fn resample(
        &self,
        src: &ImageData,
        width: u32,
        height: u32,
    ) -> Result<ImageData, ResampleError> {
        if width == 0 || height == 0 {
            return Err(ResampleError {
                width,
                height,
                reason: "target dimensions must be at least one pixel".to_string(),
            });
        }
        let resized = imageops::resize(&src.to_rgba(), width, height, FilterType::Lanczos3);
        Ok(ImageData::from_rgba(resized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> ImageData {
        let image = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        });
        ImageData::from_rgba(image)
    }

    #[test]
    fn test_resample_hits_requested_dimensions() {
        let out = LanczosResampler.resample(&gradient(64, 48), 16, 12).unwrap();
        assert_eq!((out.width(), out.height()), (16, 12));
        assert_eq!(out.memory_size(), 16 * 12 * 4);
    }

    #[test]
    fn test_resample_is_deterministic() {
        let src = gradient(40, 30);
        let a = LanczosResampler.resample(&src, 10, 8).unwrap();
        let b = LanczosResampler.resample(&src, 10, 8).unwrap();
        assert_eq!(a.pixels(), b.pixels());
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        let err = LanczosResampler.resample(&gradient(8, 8), 0, 4).unwrap_err();
        assert_eq!(err.width, 0);
    }
}
