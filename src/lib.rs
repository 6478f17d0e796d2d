//! helmwatch: construction-site helmet monitoring.
//!
//! Frames come in from an image upload, a video upload, or a live camera;
//! a detection model classifies persons as wearing or not wearing safety
//! helmets; frames go out annotated with class-colored boxes, per-frame
//! tallies, and an alert when violations are present.
//!
//! # Module Structure
//!
//! - `config`: model list, source kinds, confidence slider, JSON file + env
//! - `detect`: detector trait, stub/tract backends, the explicit model cache
//! - `ingest`: frame sources (image upload, video upload, live camera)
//! - `annotate`: box/label drawing and per-frame tallies
//! - `monitor`: the shared per-frame pipeline, session loop, and sinks
//! - `api`: health endpoint for liveness/readiness probes
//!
//! The session is single-threaded: one frame at a time, synchronously. The
//! health listener runs on its own thread with no shared mutable state
//! beyond the `HealthState` snapshot source.

pub mod annotate;
pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod monitor;

pub use annotate::Annotator;
pub use api::{ApiConfig, ApiHandle, ApiServer, HealthState};
pub use config::{confidence_fraction, AppConfig, SourceKind};
pub use detect::{
    Detection, Detector, DetectorHandle, FrameTally, HelmetClass, LoadOptions, ModelCache,
    StubDetector,
};
pub use error::{Error, Result};
pub use frame::Frame;
pub use ingest::{FrameSource, ImageSource, VideoFileSource, WebcamConfig, WebcamSource};
pub use monitor::{
    process_frame, run_session, Alert, FrameOutcome, FrameSink, LogSink, SessionOptions,
    SessionStats, SlotSink,
};
