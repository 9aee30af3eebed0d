use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::geometry::scale_to_absolute;
use crate::homography::Homography;
use crate::image_impl::{Point, Point2d, Point2i};
use crate::marker::BoundingBox;

/// One window opening: identity plus four ordered corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window<T = i32> {
    pub id: u32,
    pub vertices: [Point<T>; 4],
}

impl<T> Window<T> {
    pub fn new(id: u32, vertices: [Point<T>; 4]) -> Self {
        Self { id, vertices }
    }
}

/// Windows stored as parallel arrays: `ids[i]` owns `vertices[4 * i..4 * i + 4]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStructure {
    ids: Vec<u32>,
    vertices: Vec<Point2i>,
}

impl WindowStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_windows(windows: &[Window]) -> Self {
        let mut ws = Self::new();
        for w in windows {
            ws.push_window(*w);
        }
        ws
    }

    /// Scale normalized windows to a `width` x `height` image.
    pub fn from_normalized(windows: &[Window<f64>], width: i32, height: i32) -> Self {
        let mut ws = Self::new();
        for w in windows {
            ws.push_window(Window::new(
                w.id,
                w.vertices.map(|v| scale_to_absolute(v, width, height)),
            ));
        }
        ws
    }

    /// Interpret detector boxes directly as window candidates.
    pub fn from_boxes(boxes: &[BoundingBox]) -> Self {
        let mut ws = Self::new();
        for b in boxes {
            ws.push_window(Window::new(b.obj_id, b.corners()));
        }
        ws
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn vertices(&self) -> &[Point2i] {
        &self.vertices
    }

    pub fn push_window(&mut self, window: Window) {
        self.ids.push(window.id);
        self.vertices.extend_from_slice(&window.vertices);
    }

    /// The four corners of window `index`.
    pub fn polygon(&self, index: usize) -> &[Point2i] {
        &self.vertices[index * 4..index * 4 + 4]
    }

    pub fn get(&self, index: usize) -> Option<Window> {
        let id = *self.ids.get(index)?;
        let p = self.polygon(index);
        Some(Window::new(id, [p[0], p[1], p[2], p[3]]))
    }

    pub fn iter(&self) -> impl Iterator<Item = Window> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn windows(&self) -> Vec<Window> {
        self.iter().collect()
    }

    /// Map every vertex through `h` in one batch. Results are truncated
    /// toward zero, not rounded.
    pub fn perspective_transform(&mut self, h: &Homography) {
        let src: Vec<Point2d> = self.vertices.iter().map(|v| v.to_f64()).collect();
        let dst = h.project_batch(&src);
        for (v, p) in self.vertices.iter_mut().zip(dst) {
            *v = Point2i::new(p.x as i32, p.y as i32);
        }
    }

    /// All four corners of window `index` lie in `[0, width) x [0, height)`.
    pub fn is_valid(&self, index: usize, width: i32, height: i32) -> bool {
        self.polygon(index)
            .iter()
            .all(|v| v.x >= 0 && v.x < width && v.y >= 0 && v.y < height)
    }

    pub fn check_valid_windows(&self, width: i32, height: i32) -> Vec<bool> {
        (0..self.len()).map(|i| self.is_valid(i, width, height)).collect()
    }

    /// Copy of the structure keeping only windows valid for the image.
    pub fn valid_only(&self, width: i32, height: i32) -> Self {
        let mut out = Self::new();
        for (i, w) in self.iter().enumerate() {
            if self.is_valid(i, width, height) {
                out.push_window(w);
            }
        }
        out
    }

    /// Append `other` in order. Identities are not deduplicated.
    pub fn merge(&mut self, other: &WindowStructure) {
        self.ids.extend_from_slice(&other.ids);
        self.vertices.extend_from_slice(&other.vertices);
    }
}

impl AddAssign<&WindowStructure> for WindowStructure {
    fn add_assign(&mut self, other: &WindowStructure) {
        self.merge(other);
    }
}
