use serde::{Deserialize, Serialize};

use crate::image_impl::Point;

/// A fiducial marker: identity, detector confidence and location.
///
/// Detected markers live in pixel space (`Marker<i32>`); reference markers
/// are stored normalized to `0..1` (`Marker<f64>`) and carry no confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker<T = i32> {
    pub id: u32,
    pub confidence: f32,
    pub location: Point<T>,
}

pub type NormalizedMarker = Marker<f64>;

impl<T> Marker<T> {
    pub fn new(id: u32, confidence: f32, location: Point<T>) -> Self {
        Self {
            id,
            confidence,
            location,
        }
    }

    /// Reference marker; confidence is not meaningful and is set to 1.
    pub fn reference(id: u32, location: Point<T>) -> Self {
        Self::new(id, 1.0, location)
    }
}

/// Raw detector output: class id, confidence and an XYWH box in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub obj_id: u32,
    pub prob: f32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub fn new(obj_id: u32, prob: f32, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            obj_id,
            prob,
            x,
            y,
            w,
            h,
        }
    }

    /// Box center as a marker location (integer halves, like the detector's own math).
    pub fn center(&self) -> Point<i32> {
        Point::new(
            clamp_i32(self.x.saturating_add(self.w / 2)),
            clamp_i32(self.y.saturating_add(self.h / 2)),
        )
    }

    pub fn to_marker(&self) -> Marker {
        Marker::new(self.obj_id, self.prob, self.center())
    }

    /// Corners in top-left, bottom-left, bottom-right, top-right order.
    pub fn corners(&self) -> [Point<i32>; 4] {
        let (x, y) = (clamp_i32(self.x), clamp_i32(self.y));
        let (w, h) = (clamp_i32(self.w), clamp_i32(self.h));
        let (right, bottom) = (x.saturating_add(w), y.saturating_add(h));
        [
            Point::new(x, y),
            Point::new(x, bottom),
            Point::new(right, bottom),
            Point::new(right, y),
        ]
    }
}

fn clamp_i32(v: u32) -> i32 {
    v.min(i32::MAX as u32) as i32
}

/// Collapse repeated detections of the same identity.
///
/// The result is sorted by ascending identity and keeps, for each identity,
/// the detection with the highest confidence (the first one on ties).
pub fn dedup_markers<T>(mut markers: Vec<Marker<T>>) -> Vec<Marker<T>> {
    markers.sort_by_key(|m| m.id);

    let mut out: Vec<Marker<T>> = Vec::with_capacity(markers.len());
    for marker in markers {
        match out.last_mut() {
            Some(last) if last.id == marker.id => {
                if last.confidence < marker.confidence {
                    *last = marker;
                }
            }
            _ => out.push(marker),
        }
    }
    out
}
