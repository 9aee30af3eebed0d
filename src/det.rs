use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::building::BuildingModel;
use crate::engine::{Detector, EngineError};
use crate::geometry::scale_to_absolute;
use crate::homography::TransformSolver;
use crate::image_impl::{draw_markers, imwrite, Frame, Size};
use crate::marker::{dedup_markers, BoundingBox, Marker};
use crate::postprocess::{estimate_surface_transform, group_by_surface, SurfaceOutcome};
use crate::types::DetectConfig;
use crate::window::WindowStructure;

pub struct OverlayOutput {
    /// Projected windows of every surface whose transform was estimated.
    pub windows: WindowStructure,
    /// Detected markers after deduplication.
    pub markers: Vec<Marker>,
    /// One entry per surface that survived grouping.
    pub surfaces: Vec<SurfaceOutcome>,
    pub image_size: Size,
    pub elapse: f64,
}

impl OverlayOutput {
    pub fn failed_surfaces(&self) -> usize {
        self.surfaces.iter().filter(|s| !s.is_ok()).count()
    }
}

/// Marker post-processing layered on top of an external detector.
pub struct WindowDetector {
    pub cfg: DetectConfig,
    pub detector: Box<dyn Detector>,
    pub solver: Box<dyn TransformSolver>,
    pub model: Arc<BuildingModel>,
    last_image_size: Option<Size>,
}

impl WindowDetector {
    pub fn new(
        cfg: DetectConfig,
        detector: Box<dyn Detector>,
        solver: Box<dyn TransformSolver>,
        model: Arc<BuildingModel>,
    ) -> Self {
        Self {
            cfg,
            detector,
            solver,
            model,
            last_image_size: None,
        }
    }

    /// Size of the most recently processed image.
    pub fn last_image_size(&self) -> Option<Size> {
        self.last_image_size
    }

    pub fn set_model(&mut self, model: Arc<BuildingModel>) {
        self.model = model;
    }

    /// Raw detector output turned into markers, one per box center.
    pub fn detect_markers(&self, frame: &Frame) -> Result<Vec<Marker>, EngineError> {
        let boxes: Vec<BoundingBox> = self.detector.detect(frame, self.cfg.thresh)?;
        Ok(boxes.iter().map(BoundingBox::to_marker).collect())
    }

    pub fn run(&mut self, frame: &Frame) -> Result<OverlayOutput, EngineError> {
        let start = Instant::now();
        let size = frame.size();
        self.last_image_size = Some(size);

        let raw = self.detect_markers(frame)?;
        if self.cfg.show_markers {
            imwrite(frame.sibling_with_suffix("_marker"), &draw_markers(&frame.mat, &raw))?;
        }

        let markers = dedup_markers(raw);
        debug!("{} markers after dedup", markers.len());
        if self.cfg.show_markers {
            imwrite(
                frame.sibling_with_suffix("_noRedundantMarker"),
                &draw_markers(&frame.mat, &markers),
            )?;
        }

        let groups = group_by_surface(&markers, &self.model, self.cfg.min_markers_per_surface);
        debug!("{} surfaces retained after grouping", groups.len());

        let mut windows = WindowStructure::new();
        let mut surfaces = Vec::with_capacity(groups.len());
        for (sid, detected) in groups {
            let surface = self.model.surface(sid);
            let reference: Vec<Marker> = surface
                .markers
                .iter()
                .map(|m| Marker::reference(m.id, scale_to_absolute(m.location, size.width, size.height)))
                .collect();

            let (matches, result) = estimate_surface_transform(&reference, &detected, self.solver.as_ref());
            match &result {
                Ok(h) => {
                    let mut projected = WindowStructure::from_normalized(&surface.windows, size.width, size.height);
                    projected.perspective_transform(h);
                    debug!(
                        "surface `{}`: {} matches, {} windows",
                        surface.name,
                        matches,
                        projected.len()
                    );
                    windows.merge(&projected);
                }
                Err(e) => warn!("surface `{}` skipped: {}", surface.name, e),
            }

            surfaces.push(SurfaceOutcome {
                surface: sid,
                name: surface.name.clone(),
                matches,
                result,
            });
        }

        Ok(OverlayOutput {
            windows,
            markers,
            surfaces,
            image_size: size,
            elapse: start.elapsed().as_secs_f64(),
        })
    }
}
