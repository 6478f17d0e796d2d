//! Frame annotator: draws class-colored boxes and confidence labels.

use ab_glyph::{FontVec, PxScale};
use image::Rgb;
use imageproc::rect::Rect;
use std::path::Path;

use crate::detect::{Detection, FrameTally};
use crate::error::{Error, Result};
use crate::frame::Frame;

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 18.0;

/// Draws detections onto frames and derives per-frame tallies.
///
/// Output is deterministic for identical input, and a frame with zero
/// detections passes through pixel-identical.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Annotator without a label font: boxes only.
    pub fn new() -> Self {
        Self { font: None }
    }

    /// Annotator with a TTF/OTF label font read from disk.
    pub fn with_font_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let font = FontVec::try_from_vec(data)
            .map_err(|e| Error::Config(format!("invalid label font {}: {}", path.display(), e)))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw boxes and labels for `detections`, returning the annotated frame
    /// and the helmet / no-helmet tally.
    pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> (Frame, FrameTally) {
        let tally = FrameTally::from_detections(detections);
        if detections.is_empty() {
            return (frame.clone(), tally);
        }

        let mut image = frame.to_rgb_image();
        let (width, height) = image.dimensions();

        for det in detections {
            let color = Rgb(det.class.color());
            let x = det.x1.floor().max(0.0) as i32;
            let y = det.y1.floor().max(0.0) as i32;
            let w = det.width().round().max(1.0) as u32;
            let h = det.height().round().max(1.0) as u32;

            for inset in 0..BOX_THICKNESS {
                let rw = w.saturating_sub(2 * inset as u32);
                let rh = h.saturating_sub(2 * inset as u32);
                if rw == 0 || rh == 0 {
                    break;
                }
                let rect = Rect::at(x + inset, y + inset).of_size(rw, rh);
                imageproc::drawing::draw_hollow_rect_mut(&mut image, rect, color);
            }

            if let Some(font) = &self.font {
                let label = format!("{} {:.2}", det.class, det.confidence);
                let ty = (y - LABEL_SCALE as i32 - 2).max(0);
                let tx = x.clamp(0, width.saturating_sub(1) as i32);
                if (ty as u32) < height {
                    imageproc::drawing::draw_text_mut(
                        &mut image,
                        color,
                        tx,
                        ty,
                        PxScale::from(LABEL_SCALE),
                        font,
                        &label,
                    );
                }
            }
        }

        (Frame::from_rgb_image(image), tally)
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::HelmetClass;

    fn frame_64() -> Frame {
        let pixels = (0..64usize * 64 * 3).map(|i| (i % 256) as u8).collect();
        Frame::new(pixels, 64, 64).unwrap()
    }

    #[test]
    fn no_detections_leaves_pixels_untouched() {
        let frame = frame_64();
        let (annotated, tally) = Annotator::new().annotate(&frame, &[]);
        assert_eq!(annotated, frame);
        assert_eq!(tally, FrameTally::default());
    }

    #[test]
    fn boxes_change_pixels_and_tally_counts() {
        let frame = frame_64();
        let detections = [Detection {
            x1: 8.0,
            y1: 8.0,
            x2: 32.0,
            y2: 32.0,
            confidence: 0.91,
            class: HelmetClass::NoHelmet,
        }];
        let (annotated, tally) = Annotator::new().annotate(&frame, &detections);
        assert_ne!(annotated, frame);
        assert_eq!(tally.no_helmet, 1);
        assert_eq!(tally.helmet, 0);
        // top-left corner of the box is the no-helmet red
        assert_eq!(annotated.to_rgb_image().get_pixel(8, 8), &Rgb([255, 0, 0]));
    }

    #[test]
    fn annotation_is_deterministic() {
        let frame = frame_64();
        let detections = [Detection {
            x1: 4.0,
            y1: 4.0,
            x2: 20.0,
            y2: 24.0,
            confidence: 0.75,
            class: HelmetClass::Helmet,
        }];
        let annotator = Annotator::new();
        let (first, _) = annotator.annotate(&frame, &detections);
        let (second, _) = annotator.annotate(&frame, &detections);
        assert_eq!(first, second);
    }
}
