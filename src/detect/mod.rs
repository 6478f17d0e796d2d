mod backend;
mod backends;
mod class;
mod loader;

pub use backend::Detector;
pub use backends::StubDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use class::{Detection, FrameTally, HelmetClass};
pub use loader::{DetectorHandle, LoadOptions, ModelCache};
