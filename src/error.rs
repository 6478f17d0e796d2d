//! Error taxonomy for helmwatch.
//!
//! Each variant corresponds to one failure class with a distinct recovery
//! policy:
//! - `ModelLoad`: checkpoint missing/corrupt/incompatible; the session halts.
//! - `MediaDecode`: unreadable video or unavailable camera; the loop exits.
//! - `Inference`: detection failed on one frame; streaming sessions skip the
//!   frame, single-image sessions abort.
//! - `ListenerBind`: health listener could not bind after retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("media decode failed: {0}")]
    MediaDecode(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("listener bind failed: {0}")]
    ListenerBind(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
