//! Accuracy scoring of projected windows against ground-truth quadrangles.

use serde::{Deserialize, Serialize};

use crate::geometry::{iou, iou_clipped};
use crate::types::IouMethod;
use crate::window::{Window, WindowStructure};

pub fn polygon_iou(a: &Window, b: &Window, method: IouMethod) -> f64 {
    match method {
        IouMethod::Fan => iou(&a.vertices, &b.vertices),
        IouMethod::Clipper => iou_clipped(&a.vertices, &b.vertices),
    }
}

/// Score of one identity in the merge of detections and ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowScore {
    pub id: u32,
    pub iou: f64,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Matched,
    /// Ground truth with no detection.
    Missed,
    /// Detection with no ground truth.
    Spurious,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub mean_iou: f64,
    pub scores: Vec<WindowScore>,
}

impl EvalReport {
    pub fn count(&self, kind: MatchKind) -> usize {
        self.scores.iter().filter(|s| s.kind == kind).count()
    }
}

fn sorted_by_id(ws: &WindowStructure) -> Vec<Window> {
    let mut windows = ws.windows();
    windows.sort_by_key(|w| w.id);
    windows
}

/// For each identity keep the detection that best overlaps the ground-truth
/// window of the same identity (the first one on ties).
fn dedup_detections(detected: Vec<Window>, ground_truth: &[Window], method: IouMethod) -> Vec<Window> {
    let score = |w: &Window| {
        ground_truth
            .iter()
            .find(|g| g.id == w.id)
            .map_or(0.0, |g| polygon_iou(w, g, method))
    };

    let mut out: Vec<(Window, f64)> = Vec::with_capacity(detected.len());
    for w in detected {
        let s = score(&w);
        match out.last_mut() {
            Some((last, best)) if last.id == w.id => {
                if s > *best {
                    *last = w;
                    *best = s;
                }
            }
            _ => out.push((w, s)),
        }
    }
    out.into_iter().map(|(w, _)| w).collect()
}

/// Merge-join detections and ground truth by identity.
///
/// Missed and spurious windows count as IoU 0; the mean is taken over all of
/// them and is 0 when both sides are empty.
pub fn evaluate_detailed(detected: &WindowStructure, ground_truth: &WindowStructure, method: IouMethod) -> EvalReport {
    let truth = sorted_by_id(ground_truth);
    let detections = dedup_detections(sorted_by_id(detected), &truth, method);

    let mut scores = Vec::with_capacity(truth.len().max(detections.len()));
    let (mut i, mut j) = (0, 0);
    while i < detections.len() || j < truth.len() {
        match (detections.get(i), truth.get(j)) {
            (Some(d), Some(g)) if d.id == g.id => {
                scores.push(WindowScore {
                    id: d.id,
                    iou: polygon_iou(d, g, method),
                    kind: MatchKind::Matched,
                });
                i += 1;
                j += 1;
            }
            (Some(d), Some(g)) if d.id < g.id => {
                scores.push(WindowScore { id: d.id, iou: 0.0, kind: MatchKind::Spurious });
                i += 1;
            }
            (Some(d), None) => {
                scores.push(WindowScore { id: d.id, iou: 0.0, kind: MatchKind::Spurious });
                i += 1;
            }
            (_, Some(g)) => {
                scores.push(WindowScore { id: g.id, iou: 0.0, kind: MatchKind::Missed });
                j += 1;
            }
            (None, None) => break,
        }
    }

    let mean_iou = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| s.iou).sum::<f64>() / scores.len() as f64
    };
    EvalReport { mean_iou, scores }
}

pub fn evaluate(detected: &WindowStructure, ground_truth: &WindowStructure, method: IouMethod) -> f64 {
    evaluate_detailed(detected, ground_truth, method).mean_iou
}
