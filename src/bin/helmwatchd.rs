//! helmwatchd - helmet monitoring daemon
//!
//! This daemon:
//! 1. Starts the health listener on its own thread (port 8502 by default)
//! 2. Loads the selected model through the explicit process-scoped cache
//! 3. Acquires frames from the selected source (image, video, webcam)
//! 4. Runs each frame through detect -> annotate -> tally -> alert
//! 5. Renders results to the display slot and the log
//!
//! Ctrl-C raises the stop flag; streaming sessions end at the next frame
//! boundary. The process exits 0 after the session ends.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use helmwatch::{
    confidence_fraction, run_session, Annotator, ApiConfig, ApiServer, AppConfig, FrameSource,
    HealthState, ImageSource, LoadOptions, LogSink, ModelCache, SessionOptions, SlotSink,
    SourceKind, VideoFileSource, WebcamConfig, WebcamSource,
};

#[derive(Parser, Debug)]
#[command(name = "helmwatchd", about = "Construction-site helmet monitoring daemon")]
struct Args {
    /// Input source kind.
    #[arg(long, value_enum, env = "HELMWATCH_SOURCE")]
    source: SourceKind,

    /// Uploaded file for image/video sources.
    #[arg(long, env = "HELMWATCH_INPUT")]
    input: Option<PathBuf>,

    /// Model filename (overrides config/env).
    #[arg(long)]
    model: Option<String>,

    /// Confidence slider, 30-100 percent (overrides config/env).
    #[arg(long)]
    confidence: Option<u32>,

    /// Log results only; skip writing the annotated display slot.
    #[arg(long)]
    no_display: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = AppConfig::load()?;
    if let Some(model) = &args.model {
        cfg.model = model.clone();
    }
    if let Some(slider) = args.confidence {
        cfg.confidence_slider = slider;
    }
    let confidence = confidence_fraction(cfg.confidence_slider)?;

    println!("helmet monitoring daemon starting");
    println!(
        "health check API: http://localhost:{}/health",
        cfg.api.port
    );

    let health = HealthState::new();
    let api_handle = ApiServer::new(
        ApiConfig {
            host: cfg.api.host.clone(),
            port: cfg.api.port,
            max_port_retries: cfg.api.max_port_retries,
            default_model: Some(cfg.model_path()),
        },
        health.clone(),
    )
    .spawn()?;
    log::info!("health listener on {}", api_handle.addr);

    // The checkpoint cache is owned here and passed to whoever needs a
    // detector; handles are process-scoped, keyed by path, never evicted.
    let mut cache = ModelCache::new();
    let model_path = cfg.model_path();
    let detector = cache
        .load(&model_path, LoadOptions::trusted())
        .with_context(|| format!("cannot load model {}", model_path.display()))?;
    health.set_loaded(&model_path.display().to_string());

    let annotator = match &cfg.display.font_path {
        Some(path) => Annotator::with_font_path(path)?,
        None => Annotator::new(),
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("install ctrl-c handler")?;
    }

    let options = match args.source {
        SourceKind::Image => SessionOptions::single_image(confidence),
        SourceKind::Video | SourceKind::Webcam => SessionOptions::streaming(confidence),
    };

    let session = (|| -> helmwatch::Result<helmwatch::SessionStats> {
        let mut source = open_source(&cfg, &args)?;
        if args.no_display {
            run_session(
                source.as_mut(),
                &detector,
                &annotator,
                &mut LogSink,
                &stop,
                options,
            )
        } else {
            let mut sink = SlotSink::new(&cfg.display.slot_dir)?;
            if args.source == SourceKind::Image {
                // keep the original next to the annotated result
                if let Some(input) = &args.input {
                    let original = cfg.display.slot_dir.join(original_name(input));
                    std::fs::copy(input, original)?;
                }
            }
            run_session(
                source.as_mut(),
                &detector,
                &annotator,
                &mut sink,
                &stop,
                options,
            )
        }
    })();

    // Session errors are rendered, not propagated: the daemon stays the
    // boundary for media and inference failures.
    match session {
        Ok(stats) => {
            println!(
                "session complete: {} frames processed, {} skipped, {} with violations",
                stats.frames_processed, stats.frames_skipped, stats.violation_frames
            );
        }
        Err(err) => {
            log::error!("session failed: {}", err);
            println!("session failed: {}", err);
        }
    }

    api_handle
        .stop()
        .map_err(|e| anyhow!("stopping health listener: {}", e))?;
    println!("services stopped");
    Ok(())
}

fn open_source(cfg: &AppConfig, args: &Args) -> helmwatch::Result<Box<dyn FrameSource>> {
    match args.source {
        SourceKind::Image => {
            let input = require_input(args)?;
            Ok(Box::new(ImageSource::open(&input)?))
        }
        SourceKind::Video => {
            let input = require_input(args)?;
            Ok(Box::new(VideoFileSource::open(&input)?))
        }
        SourceKind::Webcam => Ok(Box::new(WebcamSource::open(WebcamConfig {
            device: cfg.webcam_device.clone(),
            ..WebcamConfig::default()
        })?)),
    }
}

fn require_input(args: &Args) -> helmwatch::Result<PathBuf> {
    args.input.clone().ok_or_else(|| {
        helmwatch::Error::MediaDecode(format!("--input is required for the {} source", args.source))
    })
}

fn original_name(input: &std::path::Path) -> String {
    match input.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("original.{}", ext.to_ascii_lowercase()),
        None => "original".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_and_input_parse_from_flags() {
        let args =
            Args::try_parse_from(["helmwatchd", "--source", "video", "--input", "clip.mp4"])
                .expect("parse");
        assert_eq!(args.source, SourceKind::Video);
        assert_eq!(args.input.as_deref(), Some(std::path::Path::new("clip.mp4")));
    }

    #[test]
    fn source_and_input_fall_back_to_env() {
        std::env::set_var("HELMWATCH_SOURCE", "webcam");
        let args = Args::try_parse_from(["helmwatchd"]).expect("parse");
        assert_eq!(args.source, SourceKind::Webcam);
        std::env::remove_var("HELMWATCH_SOURCE");
    }
}
