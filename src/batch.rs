//! Directory-wide runs. Every image is processed independently and a failure
//! on one image is recorded and skipped, never propagated.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::det::WindowDetector;
use crate::engine::EngineError;
use crate::eval::evaluate_detailed;
use crate::image_impl::{draw_windows, imwrite, Frame};
use crate::reader;
use crate::types::IouMethod;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Suffixes of images this tool writes itself.
const DERIVED_SUFFIXES: [&str; 3] = ["_overlay", "_marker", "_noRedundantMarker"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    pub path: PathBuf,
    pub windows: usize,
    pub iou: Option<f64>,
    pub error: Option<String>,
}

impl ImageResult {
    fn failed(path: &Path, error: &EngineError) -> Self {
        Self {
            path: path.to_path_buf(),
            windows: 0,
            iou: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<ImageResult>,
}

impl BatchSummary {
    fn record(&mut self, result: ImageResult) {
        if result.error.is_some() {
            self.failed += 1;
        } else {
            self.processed += 1;
        }
        self.results.push(result);
    }

    /// Mean IoU over successfully scored images.
    pub fn mean_iou(&self) -> Option<f64> {
        let scores: Vec<f64> = self.results.iter().filter_map(|r| r.iou).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    /// Pretty JSON with the counts, the mean and every per-image result.
    pub fn to_json(&self) -> Result<String, EngineError> {
        let json_output = serde_json::json!({
            "processed": self.processed,
            "failed": self.failed,
            "mean_iou": self.mean_iou(),
            "results": self.results,
        });
        Ok(serde_json::to_string_pretty(&json_output)?)
    }
}

/// Images directly inside `dir`, sorted by path, skipping our own outputs.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let is_derived = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| DERIVED_SUFFIXES.iter().any(|suffix| s.ends_with(suffix)))
            .unwrap_or(false);
        if is_image && !is_derived {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn overlay_one(detector: &mut WindowDetector, path: &Path, out_dir: Option<&Path>) -> Result<ImageResult, EngineError> {
    let frame = Frame::open(path)?;
    let output = detector.run(&frame)?;
    let size = output.image_size;
    let valid = output.windows.valid_only(size.width, size.height);

    let sibling = frame.sibling_with_suffix("_overlay");
    let target = match (out_dir, sibling.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => sibling.clone(),
    };
    imwrite(&target, &draw_windows(&frame.mat, &output.windows))?;
    info!("{}: {} windows drawn -> {}", path.display(), valid.len(), target.display());

    Ok(ImageResult {
        path: path.to_path_buf(),
        windows: valid.len(),
        iou: None,
        error: None,
    })
}

/// Draw projected windows on every image in `dir`.
pub fn run_overlay_batch(
    detector: &mut WindowDetector,
    dir: &Path,
    out_dir: Option<&Path>,
) -> Result<BatchSummary, EngineError> {
    if let Some(out) = out_dir {
        std::fs::create_dir_all(out)?;
    }

    let mut summary = BatchSummary::default();
    for path in list_images(dir)? {
        let result = overlay_one(detector, &path, out_dir).unwrap_or_else(|e| {
            warn!("{}: {}", path.display(), e);
            ImageResult::failed(&path, &e)
        });
        summary.record(result);
    }
    info!("overlay done: {} processed, {} failed", summary.processed, summary.failed);
    Ok(summary)
}

fn score_one(
    detector: &mut WindowDetector,
    path: &Path,
    gt_ext: &str,
    method: IouMethod,
) -> Result<ImageResult, EngineError> {
    let frame = Frame::open(path)?;
    let truth = reader::read_ground_truth(&frame.sibling_with_extension(gt_ext), detector.model.window_names())?;
    let output = detector.run(&frame)?;
    let report = evaluate_detailed(&output.windows, &truth, method);
    info!("{}: IoU {:.4} over {} windows", path.display(), report.mean_iou, report.scores.len());

    Ok(ImageResult {
        path: path.to_path_buf(),
        windows: output.windows.len(),
        iou: Some(report.mean_iou),
        error: None,
    })
}

/// Score every image in `dir` against its `<stem>.<gt_ext>` ground truth.
pub fn run_iou_batch(
    detector: &mut WindowDetector,
    dir: &Path,
    gt_ext: &str,
    method: IouMethod,
) -> Result<BatchSummary, EngineError> {
    let mut summary = BatchSummary::default();
    for path in list_images(dir)? {
        let result = score_one(detector, &path, gt_ext, method).unwrap_or_else(|e| {
            warn!("{}: {}", path.display(), e);
            ImageResult::failed(&path, &e)
        });
        summary.record(result);
    }
    match summary.mean_iou() {
        Some(mean) => info!(
            "IoU done: mean {:.4}, {} processed, {} failed",
            mean, summary.processed, summary.failed
        ),
        None => info!("IoU done: nothing scored, {} failed", summary.failed),
    }
    Ok(summary)
}
