//! Owned RGB frames flowing from ingestion to the annotator.

use image::{ImageBuffer, RgbImage};

use crate::error::{Error, Result};

/// One frame of tightly-packed RGB8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| Error::MediaDecode("frame dimensions overflow".into()))?;
        if pixels.len() != expected {
            return Err(Error::MediaDecode(format!(
                "expected {} RGB bytes for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            pixels: image.into_raw(),
            width,
            height,
        }
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        ImageBuffer::from_raw(self.width, self.height, self.pixels.clone())
            .expect("frame buffer matches dimensions")
    }

    /// Resize to a fixed working width, preserving aspect ratio.
    /// Returns a clone when the frame is already at the target width.
    pub fn resized_to_width(&self, target_width: u32) -> Self {
        if self.width == target_width || self.width == 0 {
            return self.clone();
        }
        let target_height =
            ((target_width as u64 * self.height as u64 + self.width as u64 / 2)
                / self.width as u64)
                .max(1) as u32;
        let resized = image::imageops::resize(
            &self.to_rgb_image(),
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );
        Self::from_rgb_image(resized)
    }
}
