#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::class::{Detection, HelmetClass};
use crate::error::{Error, Result};

/// Side length of the square model input.
const INPUT_SIZE: u32 = 640;
/// IoU threshold for class-aware non-maximum suppression.
const IOU_THRESHOLD: f32 = 0.45;

type RunnableOnnx = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Tract-based helmet detector for ONNX checkpoints.
///
/// Frames are resized to the model input square, run through the network,
/// and the YOLO-style output (rows = 4 box coordinates + per-class scores,
/// one column per candidate) is decoded back into source pixel coordinates.
pub struct TractDetector {
    model: RunnableOnnx,
}

impl TractDetector {
    /// Load an ONNX checkpoint from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| {
                Error::ModelLoad(format!(
                    "failed to read ONNX checkpoint {}: {}",
                    model_path.display(),
                    e
                ))
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
                ),
            )
            .map_err(|e| Error::ModelLoad(format!("failed to set input fact: {}", e)))?
            .into_optimized()
            .map_err(|e| Error::ModelLoad(format!("failed to optimize model: {}", e)))?
            .into_runnable()
            .map_err(|e| Error::ModelLoad(format!("failed to build runnable model: {}", e)))?;

        Ok(Self { model })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| Error::Inference("frame dimensions overflow".into()))?;
        if pixels.len() != expected {
            return Err(Error::Inference(format!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            )));
        }

        let image: image::RgbImage =
            image::ImageBuffer::from_raw(width, height, pixels.to_vec())
                .ok_or_else(|| Error::Inference("invalid frame buffer".into()))?;
        let resized = image::imageops::resize(
            &image,
            INPUT_SIZE,
            INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );

        let side = INPUT_SIZE as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, side, side),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }
}

impl Detector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        confidence: f32,
    ) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| Error::Inference(format!("ONNX inference failed: {}", e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| Error::Inference("model produced no outputs".into()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| Error::Inference(format!("model output was not f32: {}", e)))?;

        let shape = view.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(Error::Inference(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }
        let class_count = shape[1] - 4;
        let candidates = shape[2];

        // Scale factors from model input space back to the source frame.
        let sx = width as f32 / INPUT_SIZE as f32;
        let sy = height as f32 / INPUT_SIZE as f32;

        let mut detections = Vec::new();
        for col in 0..candidates {
            let mut best: Option<(HelmetClass, f32)> = None;
            for class in [HelmetClass::Helmet, HelmetClass::NoHelmet, HelmetClass::Person] {
                if class.id() >= class_count {
                    continue;
                }
                let score = view[[0, 4 + class.id(), col]];
                if score >= confidence && best.map_or(true, |(_, s)| score > s) {
                    best = Some((class, score));
                }
            }
            let Some((class, score)) = best else {
                continue;
            };

            let cx = view[[0, 0, col]];
            let cy = view[[0, 1, col]];
            let w = view[[0, 2, col]];
            let h = view[[0, 3, col]];
            detections.push(Detection {
                x1: ((cx - w / 2.0) * sx).clamp(0.0, width as f32),
                y1: ((cy - h / 2.0) * sy).clamp(0.0, height as f32),
                x2: ((cx + w / 2.0) * sx).clamp(0.0, width as f32),
                y2: ((cy + h / 2.0) * sy).clamp(0.0, height as f32),
                confidence: score,
                class,
            });
        }

        non_max_suppression(&mut detections, IOU_THRESHOLD);
        Ok(detections)
    }
}

/// Class-aware NMS: drop any box overlapping a higher-confidence box of the
/// same class beyond the IoU threshold.
fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept = 0;
    for index in 0..detections.len() {
        let candidate = detections[index];
        let suppressed = detections[..kept].iter().any(|prev| {
            prev.class == candidate.class && prev.iou(&candidate) > iou_threshold
        });
        if !suppressed {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, confidence: f32, class: HelmetClass) -> Detection {
        Detection {
            x1,
            y1: 0.0,
            x2: x1 + 10.0,
            y2: 10.0,
            confidence,
            class,
        }
    }

    #[test]
    fn nms_drops_overlapping_same_class_boxes() {
        let mut boxes = vec![
            det(0.0, 0.9, HelmetClass::Helmet),
            det(1.0, 0.8, HelmetClass::Helmet),
            det(100.0, 0.7, HelmetClass::Helmet),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_different_classes() {
        let mut boxes = vec![
            det(0.0, 0.9, HelmetClass::Helmet),
            det(1.0, 0.8, HelmetClass::NoHelmet),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
    }
}
