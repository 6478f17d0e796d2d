use crate::detect::class::Detection;
use crate::error::Result;

/// Detector backend trait.
///
/// Implementations run inference on one tightly-packed RGB8 frame and return
/// detections for the three classes of interest only. The confidence
/// threshold is a probability cutoff applied inside the backend; detections
/// below it never surface to callers.
///
/// Output must be deterministic for identical (pixels, threshold) input; no
/// state retained by the backend may affect results between calls.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Any failure is surfaced as `Error::Inference`; the caller decides
    /// whether to skip the frame or abort the session.
    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        confidence: f32,
    ) -> Result<Vec<Detection>>;
}
