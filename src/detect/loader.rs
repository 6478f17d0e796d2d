use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::detect::backend::Detector;
use crate::detect::backends::StubDetector;
use crate::error::{Error, Result};

/// Shared handle to a loaded detector.
pub type DetectorHandle = Arc<Mutex<dyn Detector + Send>>;

/// Options for one load call.
///
/// `trust_model_graph` is the explicit opt-in for deserializing a
/// checkpoint's embedded computation graph (the full serialized model, not
/// just weights). It is a trust decision about the checkpoint's origin and is
/// scoped to the individual load call, never a process-wide override.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadOptions {
    pub trust_model_graph: bool,
}

impl LoadOptions {
    pub fn trusted() -> Self {
        Self {
            trust_model_graph: true,
        }
    }
}

/// Process-scoped checkpoint cache keyed by path, no eviction.
///
/// Owned by the application context and passed explicitly to whichever
/// component needs a detector. Repeated loads of the same path return the
/// same handle without touching the filesystem again.
pub struct ModelCache {
    entries: HashMap<PathBuf, DetectorHandle>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return a ready detector for `path`, loading it on first use.
    pub fn load(&mut self, path: &Path, options: LoadOptions) -> Result<DetectorHandle> {
        if let Some(handle) = self.entries.get(path) {
            return Ok(handle.clone());
        }
        let handle = open_checkpoint(path, options)?;
        self.entries.insert(path.to_path_buf(), handle.clone());
        log::info!("loaded model checkpoint {}", path.display());
        Ok(handle)
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

fn open_checkpoint(path: &Path, options: LoadOptions) -> Result<DetectorHandle> {
    if is_stub_path(path) {
        return Ok(Arc::new(Mutex::new(StubDetector::new())));
    }

    if !path.is_file() {
        return Err(Error::ModelLoad(format!(
            "checkpoint {} is missing or not a regular file",
            path.display()
        )));
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        // file-backed stub checkpoints, same synthetic backend as stub://
        Some("stub") => Ok(Arc::new(Mutex::new(StubDetector::new()))),
        Some("onnx") => {
            if !options.trust_model_graph {
                return Err(Error::ModelLoad(format!(
                    "checkpoint {} embeds a serialized model graph; \
                     loading it requires LoadOptions::trust_model_graph",
                    path.display()
                )));
            }
            load_onnx(path)
        }
        other => Err(Error::ModelLoad(format!(
            "unsupported checkpoint format {:?} for {}",
            other,
            path.display()
        ))),
    }
}

#[cfg(feature = "backend-tract")]
fn load_onnx(path: &Path) -> Result<DetectorHandle> {
    let detector = crate::detect::backends::TractDetector::new(path)?;
    Ok(Arc::new(Mutex::new(detector)))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(path: &Path) -> Result<DetectorHandle> {
    Err(Error::ModelLoad(format!(
        "cannot load {}: built without the backend-tract feature",
        path.display()
    )))
}

fn is_stub_path(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.starts_with("stub://"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_returns_the_same_handle() {
        let mut cache = ModelCache::new();
        let path = Path::new("stub://site_camera");
        let first = cache.load(path, LoadOptions::default()).unwrap();
        let second = cache.load(path, LoadOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_paths_get_distinct_handles() {
        let mut cache = ModelCache::new();
        let first = cache
            .load(Path::new("stub://front"), LoadOptions::default())
            .unwrap();
        let second = cache
            .load(Path::new("stub://rear"), LoadOptions::default())
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cached_handle_survives_checkpoint_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helmet.stub");
        std::fs::write(&path, b"synthetic checkpoint").unwrap();

        let mut cache = ModelCache::new();
        let first = cache.load(&path, LoadOptions::default()).unwrap();

        std::fs::remove_file(&path).unwrap();
        let second = cache.load(&path, LoadOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_checkpoint_fails_and_leaves_cache_unset() {
        let mut cache = ModelCache::new();
        let path = Path::new("weights/detection/does_not_exist.onnx");
        assert!(matches!(
            cache.load(path, LoadOptions::trusted()),
            Err(Error::ModelLoad(_))
        ));
        assert!(!cache.is_loaded(path));
    }

    #[test]
    fn untrusted_model_graph_is_rejected() {
        let file = tempfile::Builder::new()
            .suffix(".onnx")
            .tempfile()
            .unwrap();
        let mut cache = ModelCache::new();
        let Err(err) = cache.load(file.path(), LoadOptions::default()) else {
            panic!("untrusted full-model checkpoint must not load");
        };
        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(err.to_string().contains("trust_model_graph"));
    }
}
