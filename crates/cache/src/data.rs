//! Owned pixel payloads for cached images.

use image::RgbaImage;

/// Decoded image payload in RGBA8 layout.
///
/// The store owns one of these per record and shares it with every handle
/// to that record. The buffer length always equals `width * height * 4`;
/// construction enforces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageData {
    /// Wrap an RGBA8 buffer with its dimensions.
    ///
    /// Panics if the buffer length does not match the dimensions; a
    /// mismatched payload would corrupt every consumer downstream.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize * 4,
            "pixel buffer length does not match {width}x{height} RGBA dimensions"
        );
        Self { pixels, width, height }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bytes of memory held by the payload.
    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }

    /// Adopt a decoded `image` crate buffer.
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self { pixels: image.into_raw(), width, height }
    }

    /// Copy out as an `image` crate buffer, for resampling or encoding.
    pub fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .expect("pixel buffer length matches dimensions by construction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_size_is_buffer_length() {
        let data = ImageData::new(vec![0u8; 8 * 4 * 4], 8, 4);
        assert_eq!(data.memory_size(), 128);
        assert_eq!(data.width(), 8);
        assert_eq!(data.height(), 4);
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_mismatched_buffer_is_fatal() {
        let _ = ImageData::new(vec![0u8; 10], 8, 4);
    }

    #[test]
    fn test_rgba_round_trip() {
        let image = RgbaImage::from_fn(6, 3, |x, y| image::Rgba([x as u8, y as u8, 0, 255]));
        let data = ImageData::from_rgba(image.clone());
        assert_eq!(data.to_rgba(), image);
    }
}
