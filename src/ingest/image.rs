//! Single-frame source for uploaded images.

use std::path::{Path, PathBuf};

use crate::config::IMAGE_EXTENSIONS;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::ingest::FrameSource;

/// Yields exactly one frame decoded from an image file, then end of stream.
pub struct ImageSource {
    path: PathBuf,
    consumed: bool,
}

impl ImageSource {
    /// Open an image upload. The extension must be one of the accepted
    /// upload formats (jpg/jpeg/png/bmp/webp).
    pub fn open(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => {}
            other => {
                return Err(Error::MediaDecode(format!(
                    "unsupported image extension {:?} for {}",
                    other,
                    path.display()
                )))
            }
        }
        if !path.is_file() {
            return Err(Error::MediaDecode(format!(
                "image {} is missing",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            consumed: false,
        })
    }
}

impl FrameSource for ImageSource {
    fn describe(&self) -> String {
        format!("image:{}", self.path.display())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.consumed {
            return Ok(None);
        }
        self.consumed = true;
        let image = image::open(&self.path)
            .map_err(|e| {
                Error::MediaDecode(format!("failed to decode {}: {}", self.path.display(), e))
            })?
            .to_rgb8();
        Ok(Some(Frame::from_rgb_image(image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_extensions() {
        assert!(matches!(
            ImageSource::open(Path::new("site.gif")),
            Err(Error::MediaDecode(_))
        ));
        assert!(matches!(
            ImageSource::open(Path::new("site")),
            Err(Error::MediaDecode(_))
        ));
    }

    #[test]
    fn yields_exactly_one_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.png");
        let image = image::RgbImage::from_pixel(16, 12, image::Rgb([10, 20, 30]));
        image.save(&path).unwrap();

        let mut source = ImageSource::open(&path).unwrap();
        let frame = source.next_frame().unwrap().expect("one frame");
        assert_eq!((frame.width(), frame.height()), (16, 12));
        assert!(source.next_frame().unwrap().is_none());
    }
}
