use sha2::{Digest, Sha256};

use crate::detect::backend::Detector;
use crate::detect::class::{Detection, HelmetClass};
use crate::error::Result;

/// Stub detector for tests and `stub://` checkpoints.
///
/// Detections are derived purely from a SHA-256 hash of the pixels, so output
/// is deterministic for identical input and carries no state between calls.
/// A uniform frame (every byte equal) yields no detections.
pub struct StubDetector;

impl StubDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        confidence: f32,
    ) -> Result<Vec<Detection>> {
        let uniform = pixels.windows(2).all(|w| w[0] == w[1]);
        if uniform || width < 8 || height < 8 {
            return Ok(Vec::new());
        }

        let hash: [u8; 32] = Sha256::digest(pixels).into();
        let count = 1 + (hash[0] % 3) as usize;

        let mut detections = Vec::with_capacity(count);
        for i in 0..count {
            let bytes = &hash[4 * i + 1..4 * i + 5];
            let x1 = (bytes[0] as f32 / 255.0) * (width as f32 / 2.0);
            let y1 = (bytes[1] as f32 / 255.0) * (height as f32 / 2.0);
            let x2 = x1 + 4.0 + (bytes[2] as f32 / 255.0) * (width as f32 / 2.0 - 4.0);
            let y2 = y1 + 4.0 + (bytes[3] as f32 / 255.0) * (height as f32 / 2.0 - 4.0);
            let score = 0.50 + (hash[16 + i] % 50) as f32 / 100.0;
            let class = match hash[20 + i] % 3 {
                0 => HelmetClass::Helmet,
                1 => HelmetClass::NoHelmet,
                _ => HelmetClass::Person,
            };
            if score >= confidence {
                detections.push(Detection {
                    x1,
                    y1,
                    x2,
                    y2,
                    confidence: score,
                    class,
                });
            }
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_pixels(width: u32, height: u32) -> Vec<u8> {
        (0..width as usize * height as usize * 3)
            .map(|i| (i * 31 % 251) as u8)
            .collect()
    }

    #[test]
    fn uniform_frame_yields_no_detections() {
        let mut det = StubDetector::new();
        let pixels = vec![128u8; 64 * 64 * 3];
        assert!(det.detect(&pixels, 64, 64, 0.3).unwrap().is_empty());
    }

    #[test]
    fn detections_are_deterministic() {
        let mut det = StubDetector::new();
        let pixels = noisy_pixels(64, 64);
        let first = det.detect(&pixels, 64, 64, 0.5).unwrap();
        let second = det.detect(&pixels, 64, 64, 0.5).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn threshold_filters_inside_backend() {
        let mut det = StubDetector::new();
        let pixels = noisy_pixels(64, 64);
        for d in det.detect(&pixels, 64, 64, 0.9).unwrap() {
            assert!(d.confidence >= 0.9);
        }
    }
}
