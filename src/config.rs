use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const DEFAULT_MODEL_DIR: &str = "weights/detection";
const DEFAULT_CONFIDENCE_SLIDER: u32 = 50;
const DEFAULT_API_HOST: &str = "0.0.0.0";
const DEFAULT_API_PORT: u16 = 8502;
const DEFAULT_MAX_PORT_RETRIES: u16 = 10;
const DEFAULT_DISPLAY_SLOT: &str = "display";
const DEFAULT_WEBCAM_DEVICE: &str = "/dev/video0";

/// Confidence slider bounds (integer percent).
pub const CONFIDENCE_SLIDER_MIN: u32 = 30;
pub const CONFIDENCE_SLIDER_MAX: u32 = 100;

/// Working width streaming frames are resized to before annotation.
pub const STREAM_FRAME_WIDTH: u32 = 720;

/// Selectable model checkpoints, relative to the model directory.
pub const DETECTION_MODEL_LIST: &[&str] = &["yolov8n.onnx", "SafetyHelmetWearing.onnx"];

/// Accepted image upload extensions.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Input source kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Image,
    Video,
    Webcam,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Image => write!(f, "image"),
            SourceKind::Video => write!(f, "video"),
            SourceKind::Webcam => write!(f, "webcam"),
        }
    }
}

/// Map the 30-100 integer confidence slider to a 0.30-1.00 fraction.
pub fn confidence_fraction(slider: u32) -> Result<f32> {
    if !(CONFIDENCE_SLIDER_MIN..=CONFIDENCE_SLIDER_MAX).contains(&slider) {
        return Err(Error::Config(format!(
            "confidence slider must be {}-{}, got {}",
            CONFIDENCE_SLIDER_MIN, CONFIDENCE_SLIDER_MAX, slider
        )));
    }
    Ok(slider as f32 / 100.0)
}

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    model_dir: Option<PathBuf>,
    model: Option<String>,
    confidence: Option<u32>,
    api: Option<ApiConfigFile>,
    display: Option<DisplayConfigFile>,
    webcam_device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    host: Option<String>,
    port: Option<u16>,
    max_port_retries: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    slot_dir: Option<PathBuf>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding model checkpoints.
    pub model_dir: PathBuf,
    /// Selected model filename (normally one of `DETECTION_MODEL_LIST`).
    pub model: String,
    /// Confidence threshold as an integer slider value (30-100).
    pub confidence_slider: u32,
    pub api: ApiSettings,
    pub display: DisplaySettings,
    /// Capture device for the webcam source.
    pub webcam_device: String,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    /// How many successive ports to try when the configured one is bound.
    pub max_port_retries: u16,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    /// Directory the per-frame display slot is written into.
    pub slot_dir: PathBuf,
    /// Optional TTF/OTF font for box labels. Without it, labels are skipped.
    pub font_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration: optional JSON file (HELMWATCH_CONFIG), then
    /// HELMWATCH_* environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HELMWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let api = ApiSettings {
            host: file
                .api
                .as_ref()
                .and_then(|api| api.host.clone())
                .unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
            port: file
                .api
                .as_ref()
                .and_then(|api| api.port)
                .unwrap_or(DEFAULT_API_PORT),
            max_port_retries: file
                .api
                .as_ref()
                .and_then(|api| api.max_port_retries)
                .unwrap_or(DEFAULT_MAX_PORT_RETRIES),
        };
        let display = DisplaySettings {
            slot_dir: file
                .display
                .as_ref()
                .and_then(|display| display.slot_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DISPLAY_SLOT)),
            font_path: file.display.and_then(|display| display.font_path),
        };
        Self {
            model_dir: file
                .model_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            model: file
                .model
                .unwrap_or_else(|| DETECTION_MODEL_LIST[0].to_string()),
            confidence_slider: file.confidence.unwrap_or(DEFAULT_CONFIDENCE_SLIDER),
            api,
            display,
            webcam_device: file
                .webcam_device
                .unwrap_or_else(|| DEFAULT_WEBCAM_DEVICE.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("HELMWATCH_MODEL_DIR") {
            if !dir.trim().is_empty() {
                self.model_dir = PathBuf::from(dir);
            }
        }
        if let Ok(model) = std::env::var("HELMWATCH_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        if let Ok(conf) = std::env::var("HELMWATCH_CONFIDENCE") {
            let slider: u32 = conf
                .parse()
                .map_err(|_| Error::Config("HELMWATCH_CONFIDENCE must be an integer".into()))?;
            self.confidence_slider = slider;
        }
        if let Ok(port) = std::env::var("HELMWATCH_API_PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::Config("HELMWATCH_API_PORT must be a port number".into()))?;
            self.api.port = port;
        }
        if let Ok(font) = std::env::var("HELMWATCH_FONT") {
            if !font.trim().is_empty() {
                self.display.font_path = Some(PathBuf::from(font));
            }
        }
        if let Ok(device) = std::env::var("HELMWATCH_DEVICE") {
            if !device.trim().is_empty() {
                self.webcam_device = device;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        confidence_fraction(self.confidence_slider)?;
        if self.model.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".into()));
        }
        Ok(())
    }

    /// Filesystem path of the selected checkpoint.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model)
    }

    /// Confidence threshold as a 0.30-1.00 fraction.
    pub fn confidence(&self) -> f32 {
        // validate() already range-checked the slider
        self.confidence_slider as f32 / 100.0
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid config file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slider_maps_to_exact_fraction() {
        assert_eq!(confidence_fraction(50).unwrap(), 0.50);
        assert_eq!(confidence_fraction(30).unwrap(), 0.30);
        assert_eq!(confidence_fraction(100).unwrap(), 1.00);
    }

    #[test]
    fn slider_out_of_range_is_rejected() {
        assert!(confidence_fraction(29).is_err());
        assert!(confidence_fraction(101).is_err());
        assert!(confidence_fraction(0).is_err());
    }

    #[test]
    fn model_path_joins_dir_and_name() {
        let cfg = AppConfig::from_file(AppConfigFile::default());
        assert_eq!(
            cfg.model_path(),
            PathBuf::from(DEFAULT_MODEL_DIR).join(DETECTION_MODEL_LIST[0])
        );
    }
}
