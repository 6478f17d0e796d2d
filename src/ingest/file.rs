//! Uploaded-video frame source.
//!
//! The uploaded file is spooled into a temp file exclusively owned by the
//! source; the spool is removed when the source drops, on both the success
//! and failure paths. Decoding runs as fast as inference allows, with no
//! real-time pacing.
//!
//! `.stub` uploads decode synthetically (`frames=N`, optional `fail_at=K` to
//! inject a mid-stream decode error); anything else needs the
//! `ingest-file-ffmpeg` feature.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::ingest::FrameSource;

#[cfg(feature = "ingest-file-ffmpeg")]
use crate::ingest::file_ffmpeg::FfmpegVideoSource;

/// Frame source decoding an uploaded video file.
pub struct VideoFileSource {
    upload_path: PathBuf,
    /// Exclusively-owned temp spool; deleting happens in its Drop.
    spool: TempPath,
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticVideo),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegVideoSource),
}

impl VideoFileSource {
    /// Spool the uploaded file and open a decoder over the spool.
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            Error::MediaDecode(format!("failed to read upload {}: {}", path.display(), e))
        })?;
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&data)?;
        file.flush()?;
        let spool = file.into_temp_path();

        let is_stub = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("stub"));

        let backend = if is_stub {
            VideoBackend::Synthetic(SyntheticVideo::parse(&data)?)
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                VideoBackend::Ffmpeg(FfmpegVideoSource::new(&spool)?)
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                return Err(Error::MediaDecode(
                    "video decoding requires the ingest-file-ffmpeg feature".into(),
                ));
            }
        };

        log::info!("video source spooled {} for decoding", path.display());
        Ok(Self {
            upload_path: path.to_path_buf(),
            spool,
            backend,
        })
    }

    /// Path of the temp spool (exists only while the source is alive).
    pub fn spool_path(&self) -> &Path {
        &self.spool
    }
}

impl FrameSource for VideoFileSource {
    fn describe(&self) -> String {
        format!("video:{}", self.upload_path.display())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            VideoBackend::Synthetic(video) => video.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(video) => video.next_frame(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic decoder (.stub uploads) for tests
// ----------------------------------------------------------------------------

const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 480;

struct SyntheticVideo {
    frames_total: u64,
    fail_at: Option<u64>,
    produced: u64,
}

impl SyntheticVideo {
    fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::MediaDecode("stub video is not UTF-8".into()))?;
        let mut frames_total = None;
        let mut fail_at = None;
        for line in text.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("frames=") {
                frames_total = Some(value.parse::<u64>().map_err(|_| {
                    Error::MediaDecode(format!("invalid stub frame count '{}'", value))
                })?);
            } else if let Some(value) = line.strip_prefix("fail_at=") {
                fail_at = Some(value.parse::<u64>().map_err(|_| {
                    Error::MediaDecode(format!("invalid stub fail_at '{}'", value))
                })?);
            }
        }
        let frames_total = frames_total
            .ok_or_else(|| Error::MediaDecode("stub video missing 'frames=N' line".into()))?;
        Ok(Self {
            frames_total,
            fail_at,
            produced: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_at == Some(self.produced + 1) {
            return Err(Error::MediaDecode(format!(
                "synthetic decode failure at frame {}",
                self.produced + 1
            )));
        }
        if self.produced >= self.frames_total {
            return Ok(None);
        }
        self.produced += 1;

        let pixel_count = (SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.produced) % 256) as u8;
        }
        Ok(Some(Frame::new(
            pixels,
            SYNTHETIC_WIDTH,
            SYNTHETIC_HEIGHT,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_upload(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("clip.stub");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn yields_declared_frame_count_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let upload = stub_upload(dir.path(), "frames=3\n");
        let mut source = VideoFileSource::open(&upload).unwrap();

        for _ in 0..3 {
            assert!(source.next_frame().unwrap().is_some());
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn spool_is_removed_on_drop_after_clean_run() {
        let dir = tempfile::tempdir().unwrap();
        let upload = stub_upload(dir.path(), "frames=1\n");
        let mut source = VideoFileSource::open(&upload).unwrap();
        let spool = source.spool_path().to_path_buf();
        assert!(spool.exists());

        while source.next_frame().unwrap().is_some() {}
        drop(source);
        assert!(!spool.exists());
    }

    #[test]
    fn spool_is_removed_after_mid_stream_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let upload = stub_upload(dir.path(), "frames=5\nfail_at=2\n");
        let mut source = VideoFileSource::open(&upload).unwrap();
        let spool = source.spool_path().to_path_buf();

        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(source.next_frame(), Err(Error::MediaDecode(_))));
        drop(source);
        assert!(!spool.exists());
    }

    #[test]
    fn missing_frames_line_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let upload = stub_upload(dir.path(), "fail_at=2\n");
        assert!(matches!(
            VideoFileSource::open(&upload),
            Err(Error::MediaDecode(_))
        ));
    }
}
