use std::path::{Path, PathBuf};

use crate::image_impl::Frame;
use crate::marker::BoundingBox;
use crate::reader;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("data file {0} does not set `{1}`")]
    MissingKey(PathBuf, &'static str),

    #[error("data file {path}: there is no key `{key}` to be set")]
    UnknownKey { path: PathBuf, key: String },

    #[error("{path}: unknown name `{name}`")]
    UnknownName { path: PathBuf, name: String },

    #[error("marker {id} is listed on both surface `{first}` and surface `{second}`")]
    DuplicateMarker { id: u32, first: String, second: String },

    #[error("building `{building}` lists surface `{surface}` twice")]
    DuplicateSurface { building: String, surface: String },

    #[error("{0} does not describe any building")]
    Empty(PathBuf),
}

impl ConfigError {
    pub(crate) fn parse(path: &Path, line: usize, message: impl Into<String>) -> Self {
        ConfigError::Parse {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The object detector the pipeline is layered on.
///
/// Implementations return raw boxes for one frame; everything after that
/// (dedup, grouping, matching, transform) is done by `WindowDetector`.
pub trait Detector {
    fn detect(&self, frame: &Frame, thresh: f32) -> Result<Vec<BoundingBox>, EngineError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&self, frame: &Frame, thresh: f32) -> Result<Vec<BoundingBox>, EngineError> {
        (**self).detect(frame, thresh)
    }
}

/// Replays detections stored next to each image.
///
/// For `dir/front.jpg` the boxes are read from `dir/front.<extension>`, one
/// `<class id> <confidence> <x> <y> <w> <h>` record per line.
#[derive(Debug, Clone)]
pub struct SidecarDetector {
    pub extension: String,
}

impl Default for SidecarDetector {
    fn default() -> Self {
        Self {
            extension: "detections".to_string(),
        }
    }
}

impl SidecarDetector {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn sidecar_path(&self, frame: &Frame) -> PathBuf {
        frame.sibling_with_extension(&self.extension)
    }
}

impl Detector for SidecarDetector {
    fn detect(&self, frame: &Frame, thresh: f32) -> Result<Vec<BoundingBox>, EngineError> {
        let path = self.sidecar_path(frame);
        let boxes = reader::read_detections(&path)
            .map_err(|e| EngineError::Detector(e.to_string()))?;
        Ok(boxes.into_iter().filter(|b| b.prob >= thresh).collect())
    }
}
