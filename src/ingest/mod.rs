//! Frame ingestion sources.
//!
//! Three variants of one capability, producing zero or more frames:
//! - `ImageSource`: exactly one frame from an uploaded image file
//! - `VideoFileSource`: frames decoded from an uploaded video file
//!   (feature: ingest-file-ffmpeg; `.stub` files decode synthetically)
//! - `WebcamSource`: live capture device (feature: ingest-v4l2; `stub://`
//!   devices yield a synthetic stream)
//!
//! Sources own their underlying resources exclusively: the video source owns
//! its temp spool file and removes it when dropped, the webcam source
//! releases the capture device when dropped, on every exit path.

pub mod image;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod webcam;

pub use self::image::ImageSource;
pub use file::VideoFileSource;
pub use webcam::{WebcamConfig, WebcamSource};

use crate::error::Result;
use crate::frame::Frame;

/// A source of frames. `Ok(None)` signals a clean end of stream; an error is
/// a decode/device failure and ends the session.
pub trait FrameSource {
    /// Human-readable identifier for logs.
    fn describe(&self) -> String;

    /// Produce the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}
