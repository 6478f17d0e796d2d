//! Live camera frame source.
//!
//! Captures continuously until the device reports failure or the session's
//! stop flag is raised (the stop flag lives in the session loop and is
//! checked between frames). The device handle is owned by the source and
//! released by Drop on every exit path, including errors.
//!
//! Real devices need the `ingest-v4l2` feature; `stub://` devices yield an
//! endless synthetic stream for tests.

use crate::error::Result;
use crate::frame::Frame;
use crate::ingest::FrameSource;

#[cfg(not(feature = "ingest-v4l2"))]
use crate::error::Error;

/// Configuration for a camera capture source.
#[derive(Clone, Debug)]
pub struct WebcamConfig {
    /// Device path (e.g., "/dev/video0"), or "stub://..." for synthetic.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate hint for the device.
    pub target_fps: u32,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

/// Live capture source.
pub struct WebcamSource {
    device: String,
    backend: WebcamBackend,
}

enum WebcamBackend {
    Synthetic(SyntheticWebcam),
    #[cfg(feature = "ingest-v4l2")]
    Device(device::DeviceWebcam),
}

impl WebcamSource {
    pub fn open(config: WebcamConfig) -> Result<Self> {
        let device = config.device.clone();
        let backend = if config.device.starts_with("stub://") {
            WebcamBackend::Synthetic(SyntheticWebcam::new(config))
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                WebcamBackend::Device(device::DeviceWebcam::open(config)?)
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                return Err(Error::MediaDecode(
                    "webcam capture requires the ingest-v4l2 feature".into(),
                ));
            }
        };
        Ok(Self { device, backend })
    }
}

impl FrameSource for WebcamSource {
    fn describe(&self) -> String {
        format!("webcam:{}", self.device)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            WebcamBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            WebcamBackend::Device(source) => source.next_frame(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticWebcam {
    config: WebcamConfig,
    frame_count: u64,
}

impl SyntheticWebcam {
    fn new(config: WebcamConfig) -> Self {
        log::info!("WebcamSource: connected to {} (synthetic)", config.device);
        Self {
            config,
            frame_count: 0,
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frame_count += 1;
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
        )?))
    }
}

// ----------------------------------------------------------------------------
// V4L2 capture device
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
mod device {
    use ouroboros::self_referencing;

    use super::WebcamConfig;
    use crate::error::{Error, Result};
    use crate::frame::Frame;

    pub(super) struct DeviceWebcam {
        config: WebcamConfig,
        state: DeviceState,
        active_width: u32,
        active_height: u32,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceWebcam {
        pub(super) fn open(config: WebcamConfig) -> Result<Self> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&config.device).map_err(|e| {
                Error::MediaDecode(format!("open capture device {}: {}", config.device, e))
            })?;
            let mut format = device
                .format()
                .map_err(|e| Error::MediaDecode(format!("read capture format: {}", e)))?;
            format.width = config.width;
            format.height = config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "WebcamSource: failed to set format on {}: {}",
                        config.device,
                        err
                    );
                    device.format().map_err(|e| {
                        Error::MediaDecode(format!("read capture format after set failure: {}", e))
                    })?
                }
            };

            if config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "WebcamSource: failed to set fps on {}: {}",
                        config.device,
                        err
                    );
                }
            }

            let active_width = format.width;
            let active_height = format.height;

            let state = DeviceStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4).map_err(
                        |e| Error::MediaDecode(format!("create capture buffer stream: {}", e)),
                    )
                },
            }
            .try_build()?;

            log::info!(
                "WebcamSource: connected to {} ({}x{})",
                config.device,
                active_width,
                active_height
            );

            Ok(Self {
                config,
                state,
                active_width,
                active_height,
            })
        }

        pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
            use v4l::io::traits::CaptureStream;

            let device = &self.config.device;
            let (buf, _meta) = self
                .state
                .with_stream_mut(|stream| stream.next())
                .map_err(|e| Error::MediaDecode(format!("capture from {}: {}", device, e)))?;
            let pixels = buf.to_vec();
            Ok(Some(Frame::new(
                pixels,
                self.active_width,
                self.active_height,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_camera_streams_without_end() {
        let mut source = WebcamSource::open(WebcamConfig {
            device: "stub://gate_camera".to_string(),
            ..WebcamConfig::default()
        })
        .unwrap();

        for _ in 0..5 {
            let frame = source.next_frame().unwrap().expect("endless stream");
            assert_eq!((frame.width(), frame.height()), (640, 480));
        }
    }
}
