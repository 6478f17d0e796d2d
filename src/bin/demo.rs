//! demo - end-to-end pipeline walkthrough on synthetic inputs.
//!
//! Loads a synthetic detector through the checkpoint cache, spools a short
//! synthetic clip the way a real upload would be spooled, and runs the full
//! detect -> annotate -> tally -> alert session against it. Useful for
//! exercising the pipeline on machines without models or cameras.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use helmwatch::{
    run_session, Annotator, LoadOptions, LogSink, ModelCache, SessionOptions, VideoFileSource,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("helmet monitoring pipeline demo (synthetic model and clip)");

    let mut cache = ModelCache::new();
    let detector = cache.load(Path::new("stub://demo"), LoadOptions::default())?;
    let annotator = Annotator::new();

    let dir = tempfile::tempdir().context("create demo workspace")?;
    let clip = dir.path().join("site_footage.stub");
    let mut upload = std::fs::File::create(&clip)?;
    writeln!(upload, "frames=8")?;
    drop(upload);

    let mut source = VideoFileSource::open(&clip)?;
    let stop = AtomicBool::new(false);
    let stats = run_session(
        &mut source,
        &detector,
        &annotator,
        &mut LogSink,
        &stop,
        SessionOptions::streaming(0.50),
    )?;

    println!(
        "demo complete: {} frames processed, {} with violations",
        stats.frames_processed, stats.violation_frames
    );
    Ok(())
}
