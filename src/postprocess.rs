//! Marker post-processing: surface grouping and reference/detection
//! correspondence.

use std::collections::BTreeMap;

use crate::building::{BuildingModel, SurfaceId};
use crate::homography::{Homography, HomographyError, TransformSolver, MIN_CORRESPONDENCES};
use crate::image_impl::Point2d;
use crate::marker::Marker;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CorrespondenceError {
    #[error("too few matched markers: need {needed}, got {got}")]
    TooFewMatches { needed: usize, got: usize },

    #[error("transform estimation failed: {0}")]
    Solver(#[from] HomographyError),
}

/// What happened to one surface that survived grouping.
#[derive(Debug, Clone)]
pub struct SurfaceOutcome {
    pub surface: SurfaceId,
    pub name: String,
    /// Matched reference/detection pairs.
    pub matches: usize,
    pub result: Result<Homography, CorrespondenceError>,
}

impl SurfaceOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Partition deduplicated markers by owning surface.
///
/// Markers with no owning surface are dropped, as are surfaces that end up
/// with fewer than `min_markers` markers. Groups come out in surface order.
pub fn group_by_surface(
    markers: &[Marker],
    model: &BuildingModel,
    min_markers: usize,
) -> Vec<(SurfaceId, Vec<Marker>)> {
    let mut groups: BTreeMap<SurfaceId, Vec<Marker>> = BTreeMap::new();
    for marker in markers {
        if let Some(sid) = model.surface_of(marker.id) {
            groups.entry(sid).or_default().push(*marker);
        }
    }
    groups
        .into_iter()
        .filter(|(_, group)| group.len() >= min_markers)
        .collect()
}

/// Sorted merge-join by identity.
///
/// Returns parallel `(reference, detected)` location lists, one entry per
/// identity present on both sides.
pub fn match_correspondences(reference: &[Marker], detected: &[Marker]) -> (Vec<Point2d>, Vec<Point2d>) {
    let mut reference = reference.to_vec();
    let mut detected = detected.to_vec();
    reference.sort_by_key(|m| m.id);
    detected.sort_by_key(|m| m.id);

    let mut src = Vec::new();
    let mut dst = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < reference.len() && j < detected.len() {
        let (r, d) = (&reference[i], &detected[j]);
        if r.id == d.id {
            src.push(r.location.to_f64());
            dst.push(d.location.to_f64());
            i += 1;
            j += 1;
        } else if r.id < d.id {
            i += 1;
        } else {
            j += 1;
        }
    }
    (src, dst)
}

/// Match one surface's markers and estimate the reference→image transform.
///
/// Returns the transform and the number of matched pairs.
pub fn estimate_surface_transform<S: TransformSolver + ?Sized>(
    reference: &[Marker],
    detected: &[Marker],
    solver: &S,
) -> (usize, Result<Homography, CorrespondenceError>) {
    let (src, dst) = match_correspondences(reference, detected);
    let matches = src.len();
    if matches < MIN_CORRESPONDENCES {
        return (
            matches,
            Err(CorrespondenceError::TooFewMatches {
                needed: MIN_CORRESPONDENCES,
                got: matches,
            }),
        );
    }
    (matches, solver.estimate(&src, &dst).map_err(CorrespondenceError::from))
}
