//! Shared per-frame pipeline and session loop.
//!
//! Every source variant funnels through the same path: optional resize to the
//! working width, detect, annotate, tally, alert. The session loop owns the
//! stop flag polling (between frames only; there is no mid-inference
//! cancellation) and the per-frame error policy.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::annotate::Annotator;
use crate::detect::{DetectorHandle, FrameTally};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::ingest::FrameSource;

/// Alert banner state for one frame: red with a count when anyone is without
/// a helmet, green "all clear" otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alert {
    AllClear,
    Violation { count: u32 },
}

impl Alert {
    pub fn from_tally(tally: &FrameTally) -> Self {
        if tally.no_helmet > 0 {
            Alert::Violation {
                count: tally.no_helmet,
            }
        } else {
            Alert::AllClear
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, Alert::Violation { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Alert::AllClear => "all clear: everyone is wearing a helmet".to_string(),
            Alert::Violation { count } => {
                format!("safety alert: {} without helmet", count)
            }
        }
    }
}

/// Result of pushing one frame through the pipeline.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub frame: Frame,
    pub tally: FrameTally,
    pub alert: Alert,
}

/// Run the annotator contract for one frame: detect at the threshold,
/// draw, tally, derive the alert.
pub fn process_frame(
    detector: &DetectorHandle,
    annotator: &Annotator,
    confidence: f32,
    frame: &Frame,
) -> Result<FrameOutcome> {
    let detections = {
        let mut guard = detector
            .lock()
            .map_err(|_| Error::Inference("detector lock poisoned".into()))?;
        guard.detect(frame.pixels(), frame.width(), frame.height(), confidence)?
    };
    let (annotated, tally) = annotator.annotate(frame, &detections);
    let alert = Alert::from_tally(&tally);
    Ok(FrameOutcome {
        frame: annotated,
        tally,
        alert,
    })
}

/// Where annotated frames and their banners go.
pub trait FrameSink {
    fn render(&mut self, outcome: &FrameOutcome) -> Result<()>;
}

/// Renders the alert banner and summary as log lines.
pub struct LogSink;

impl FrameSink for LogSink {
    fn render(&mut self, outcome: &FrameOutcome) -> Result<()> {
        if outcome.alert.is_violation() {
            log::warn!("{} ({})", outcome.alert.message(), outcome.tally.summary());
        } else {
            log::info!("{} ({})", outcome.alert.message(), outcome.tally.summary());
        }
        Ok(())
    }
}

/// Writes each annotated frame to a single display-slot file (overwritten per
/// frame, no history), and logs the banner like `LogSink`.
pub struct SlotSink {
    slot_path: PathBuf,
    log: LogSink,
}

impl SlotSink {
    pub fn new(slot_dir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(slot_dir)?;
        Ok(Self {
            slot_path: slot_dir.join("annotated.jpg"),
            log: LogSink,
        })
    }

    pub fn slot_path(&self) -> &std::path::Path {
        &self.slot_path
    }
}

impl FrameSink for SlotSink {
    fn render(&mut self, outcome: &FrameOutcome) -> Result<()> {
        outcome
            .frame
            .to_rgb_image()
            .save(&self.slot_path)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        self.log.render(outcome)
    }
}

/// Per-session knobs.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Probability cutoff, 0.30-1.00.
    pub confidence: f32,
    /// Streaming sources resize each frame to this width before annotation.
    pub resize_width: Option<u32>,
    /// Single-image sessions abort on an inference error; streaming sessions
    /// skip the frame and continue.
    pub abort_on_inference_error: bool,
}

impl SessionOptions {
    pub fn single_image(confidence: f32) -> Self {
        Self {
            confidence,
            resize_width: None,
            abort_on_inference_error: true,
        }
    }

    pub fn streaming(confidence: f32) -> Self {
        Self {
            confidence,
            resize_width: Some(crate::config::STREAM_FRAME_WIDTH),
            abort_on_inference_error: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub violation_frames: u64,
}

/// Pull frames from `source` until end of stream, a decode failure, or the
/// stop flag (checked between frames). Each frame runs through
/// `process_frame` and is handed to `sink`.
pub fn run_session(
    source: &mut dyn FrameSource,
    detector: &DetectorHandle,
    annotator: &Annotator,
    sink: &mut dyn FrameSink,
    stop: &AtomicBool,
    options: SessionOptions,
) -> Result<SessionStats> {
    let mut stats = SessionStats::default();
    log::info!("session started on {}", source.describe());

    loop {
        if stop.load(Ordering::SeqCst) {
            log::info!("stop requested, ending session on {}", source.describe());
            break;
        }
        let Some(frame) = source.next_frame()? else {
            break;
        };
        let frame = match options.resize_width {
            Some(width) => frame.resized_to_width(width),
            None => frame,
        };
        match process_frame(detector, annotator, options.confidence, &frame) {
            Ok(outcome) => {
                stats.frames_processed += 1;
                if outcome.alert.is_violation() {
                    stats.violation_frames += 1;
                }
                sink.render(&outcome)?;
            }
            Err(err @ Error::Inference(_)) if !options.abort_on_inference_error => {
                stats.frames_skipped += 1;
                log::warn!(
                    "skipping frame {} on {}: {}",
                    stats.frames_processed + stats.frames_skipped,
                    source.describe(),
                    err
                );
            }
            Err(err) => return Err(err),
        }
    }

    log::info!(
        "session ended on {}: {} frames processed, {} skipped, {} with violations",
        source.describe(),
        stats.frames_processed,
        stats.frames_skipped,
        stats.violation_frames
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_is_red_iff_no_helmet_count_is_positive() {
        let clear = FrameTally {
            helmet: 4,
            no_helmet: 0,
        };
        assert_eq!(Alert::from_tally(&clear), Alert::AllClear);
        assert!(!Alert::from_tally(&clear).is_violation());

        let boundary = FrameTally {
            helmet: 0,
            no_helmet: 1,
        };
        assert_eq!(
            Alert::from_tally(&boundary),
            Alert::Violation { count: 1 }
        );
        assert!(Alert::from_tally(&boundary).is_violation());
    }

    #[test]
    fn alert_messages_carry_the_count() {
        assert_eq!(
            Alert::Violation { count: 2 }.message(),
            "safety alert: 2 without helmet"
        );
        assert!(Alert::AllClear.message().contains("all clear"));
    }
}
