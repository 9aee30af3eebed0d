use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Runtime knobs of the per-image pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectConfig {
    /// Detector confidence threshold.
    pub thresh: f32,
    /// Surfaces with fewer distinct markers than this are dropped; four is the
    /// minimum for a projective transform.
    pub min_markers_per_surface: usize,
    /// Write `<stem>_marker` / `<stem>_noRedundantMarker` debug images.
    pub show_markers: bool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            thresh: 0.2,
            min_markers_per_surface: 4,
            show_markers: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Reprojection error (pixels) under which a correspondence is an inlier.
    pub inlier_threshold: f64,
    /// Desired probability that at least one sample is outlier free.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 3.0,
            confidence: 0.995,
            seed: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IouMethod {
    /// Centroid fan over inside points and edge crossings.
    #[default]
    Fan,
    /// Full polygon clipping.
    Clipper,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EvalConfig {
    pub iou_method: IouMethod,
}

/// Contents of the `key = value` data file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFileConfig {
    pub window_names: PathBuf,
    pub marker_names: PathBuf,
    pub building_info_dir: PathBuf,
}

impl DataFileConfig {
    pub fn building_info_path(&self) -> PathBuf {
        self.building_info_dir.join("building.info")
    }

    /// Reference file for one surface: spaces in the surface name become `_`.
    pub fn surface_file(&self, surface_name: &str, ext: &str) -> PathBuf {
        self.building_info_dir
            .join(format!("{}.{}", surface_name.replace(' ', "_"), ext))
    }
}
