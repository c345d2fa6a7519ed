//! Decoded video frames.

use image::RgbImage;

use crate::error::CoreError;
use crate::types::Timestamp;

/// A single decoded frame: tightly packed rgb24 pixels plus its position in
/// the source. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 0-based, source-monotonic frame index.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes of rgb24 pixel data.
    pub data: Vec<u8>,
    pub captured_at: Timestamp,
}

impl Frame {
    /// Wrap a raw rgb24 buffer, checking that its length matches the
    /// dimensions.
    pub fn from_rgb24(
        index: u64,
        width: u32,
        height: u32,
        data: Vec<u8>,
        captured_at: Timestamp,
    ) -> Result<Self, CoreError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(CoreError::Validation(format!(
                "rgb24 buffer is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            index,
            width,
            height,
            data,
            captured_at,
        })
    }

    /// View the pixel data as an [`RgbImage`] for annotation.
    ///
    /// Copies the buffer; the frame itself stays immutable.
    pub fn to_rgb_image(&self) -> RgbImage {
        // The length invariant is checked at construction.
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        let res = Frame::from_rgb24(0, 4, 4, vec![0u8; 10], chrono::Utc::now());
        assert!(res.is_err());
    }

    #[test]
    fn round_trips_through_rgb_image() {
        let frame = Frame::from_rgb24(3, 2, 2, vec![7u8; 12], chrono::Utc::now()).unwrap();
        let img = frame.to_rgb_image();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 1).0, [7, 7, 7]);
    }
}
