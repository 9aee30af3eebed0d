//! # winlay - window overlays from fiducial markers
//!
//! winlay projects a building's known window layout onto a photograph. An
//! external detector finds fiducial markers in the image; markers are
//! deduplicated, grouped by the building surface they belong to, matched
//! against the surface's reference layout, and a projective transform per
//! surface carries the reference windows into image space. Projected windows
//! can be scored against ground truth with polygon IoU.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use winlay::{WindowOverlay, WindowOverlayConfig};
//!
//! let config = WindowOverlayConfig::new("cfg/obj.data");
//! let mut overlay = WindowOverlay::new(config)?;
//! let output = overlay.overlay("photos/front.jpg")?;
//!
//! for window in output.windows.iter() {
//!     println!("{}: {:?}", window.id, window.vertices);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
mod engine;
mod image_impl;
mod types;

pub mod batch;
pub mod building;
pub mod det;
pub mod eval;
pub mod geodesy;
pub mod geometry;
pub mod homography;
pub mod marker;
pub mod postprocess;
pub mod reader;
pub mod window;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

// Public API exports
pub use crate::batch::{BatchSummary, ImageResult};
pub use crate::building::{BuildingModel, SurfaceId};
pub use crate::det::{OverlayOutput, WindowDetector};
pub use crate::engine::{ConfigError, Detector, EngineError, SidecarDetector};
pub use crate::eval::{EvalReport, MatchKind};
pub use crate::homography::{Homography, HomographyError, RansacSolver, TransformSolver};
pub use crate::image_impl::{draw_markers, draw_windows, imread, imwrite, Frame, Mat, Point, Point2d, Point2i, Size};
pub use crate::marker::{BoundingBox, Marker, NormalizedMarker};
pub use crate::postprocess::{CorrespondenceError, SurfaceOutcome};
pub use crate::types::{DataFileConfig, DetectConfig, EvalConfig, IouMethod, RansacConfig};
pub use crate::window::{Window, WindowStructure};

/// Configuration for WindowOverlay
#[derive(Debug, Clone)]
pub struct WindowOverlayConfig {
    /// `key = value` data file naming the names files and building info directory.
    pub data_file: PathBuf,
    pub detect: DetectConfig,
    pub ransac: RansacConfig,
    pub eval: EvalConfig,
    /// Extension of the precomputed detection files read by `SidecarDetector`.
    pub detections_ext: String,
}

impl WindowOverlayConfig {
    pub fn new<P: AsRef<Path>>(data_file: P) -> Self {
        Self {
            data_file: data_file.as_ref().to_path_buf(),
            detect: DetectConfig::default(),
            ransac: RansacConfig::default(),
            eval: EvalConfig::default(),
            detections_ext: SidecarDetector::default().extension,
        }
    }
}

/// Main WindowOverlay interface
pub struct WindowOverlay {
    config: WindowOverlayConfig,
    detector: WindowDetector,
}

impl WindowOverlay {
    /// Load the building model and set up the sidecar detector and RANSAC solver.
    pub fn new(config: WindowOverlayConfig) -> Result<Self, EngineError> {
        let detector = Box::new(SidecarDetector::new(config.detections_ext.clone()));
        Self::with_detector(config, detector)
    }

    /// Same as `new` with a caller supplied detector.
    pub fn with_detector(config: WindowOverlayConfig, detector: Box<dyn Detector>) -> Result<Self, EngineError> {
        let model = BuildingModel::from_data_file(&config.data_file)?;
        info!(
            "loaded {} buildings, {} surfaces from {}",
            model.buildings().len(),
            model.surfaces().len(),
            config.data_file.display()
        );
        let detector = WindowDetector::new(
            config.detect.clone(),
            detector,
            Box::new(RansacSolver::new(config.ransac.clone())),
            Arc::new(model),
        );
        Ok(Self { config, detector })
    }

    pub fn config(&self) -> &WindowOverlayConfig {
        &self.config
    }

    pub fn model(&self) -> &BuildingModel {
        &self.detector.model
    }

    pub fn detector_mut(&mut self) -> &mut WindowDetector {
        &mut self.detector
    }

    /// Rebuild the building model from the data file. The current model is
    /// kept if loading fails.
    pub fn reload(&mut self) -> Result<(), EngineError> {
        let model = BuildingModel::from_data_file(&self.config.data_file)?;
        self.detector.set_model(Arc::new(model));
        info!("building model reloaded from {}", self.config.data_file.display());
        Ok(())
    }

    /// Run the overlay pipeline on an image file
    pub fn overlay<P: AsRef<Path>>(&mut self, image_path: P) -> Result<OverlayOutput, EngineError> {
        let frame = Frame::open(image_path)?;
        self.detector.run(&frame)
    }

    /// Score projected windows against ground truth with the configured method.
    pub fn evaluate(&self, detected: &WindowStructure, ground_truth: &WindowStructure) -> EvalReport {
        eval::evaluate_detailed(detected, ground_truth, self.config.eval.iou_method)
    }

    /// Draw overlays for every image in `dir`.
    pub fn overlay_dir(&mut self, dir: &Path, out_dir: Option<&Path>) -> Result<BatchSummary, EngineError> {
        batch::run_overlay_batch(&mut self.detector, dir, out_dir)
    }

    /// Score every image in `dir` against `<stem>.<gt_ext>` ground truth.
    pub fn iou_dir(&mut self, dir: &Path, gt_ext: &str) -> Result<BatchSummary, EngineError> {
        batch::run_iou_batch(&mut self.detector, dir, gt_ext, self.config.eval.iou_method)
    }
}
