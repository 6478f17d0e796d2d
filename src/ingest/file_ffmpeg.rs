//! FFmpeg-backed video decoder.
//!
//! Decodes the spooled upload frame-by-frame into RGB24. Frames are handed
//! out as fast as the caller asks for them; there is no real-time pacing.

use ffmpeg_next as ffmpeg;
use std::path::Path;

use crate::error::{Error, Result};
use crate::frame::Frame;

pub(crate) struct FfmpegVideoSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl FfmpegVideoSource {
    pub(crate) fn new(path: &Path) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::MediaDecode(format!("initialize ffmpeg: {}", e)))?;
        let input = ffmpeg::format::input(&path).map_err(|e| {
            Error::MediaDecode(format!("failed to open video {}: {}", path.display(), e))
        })?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| Error::MediaDecode("upload has no video track".into()))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(|e| Error::MediaDecode(format!("load video decoder parameters: {}", e)))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| Error::MediaDecode(format!("open video decoder: {}", e)))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| Error::MediaDecode(format!("create scaler: {}", e)))?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut got = self.decoder.receive_frame(&mut decoded).is_ok();

        if !got && !self.eof_sent {
            let decoder = &mut self.decoder;
            let stream_index = self.stream_index;
            for (stream, packet) in self.input.packets() {
                if stream.index() != stream_index {
                    continue;
                }
                decoder
                    .send_packet(&packet)
                    .map_err(|e| Error::MediaDecode(format!("send packet to decoder: {}", e)))?;
                if decoder.receive_frame(&mut decoded).is_ok() {
                    got = true;
                    break;
                }
            }
            if !got {
                // Exhausted the container; flush delayed frames.
                let _ = self.decoder.send_eof();
                self.eof_sent = true;
                got = self.decoder.receive_frame(&mut decoded).is_ok();
            }
        }

        if !got {
            return Ok(None);
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| Error::MediaDecode(format!("scale frame to RGB: {}", e)))?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        Ok(Some(Frame::new(pixels, width, height)?))
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .ok_or_else(|| Error::MediaDecode("frame row out of bounds".into()))?,
        );
    }

    Ok((pixels, width, height))
}
