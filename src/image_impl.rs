//! Image abstraction layer: points, sizes, decoded frames and overlay drawing

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::marker::Marker;
use crate::window::WindowStructure;

pub type Result<T> = std::result::Result<T, EngineError>;

/// 2D point generic over its coordinate type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point<T> {
    pub x: T,
    pub y: T,
}

impl<T> Point<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

/// Pixel coordinates.
pub type Point2i = Point<i32>;
/// Normalized or sub-pixel coordinates.
pub type Point2d = Point<f64>;

impl Point2i {
    pub fn to_f64(self) -> Point2d {
        Point2d::new(self.x as f64, self.y as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone)]
pub struct Mat {
    image: DynamicImage,
}

impl Default for Mat {
    fn default() -> Self {
        Self {
            image: DynamicImage::new_rgb8(1, 1),
        }
    }
}

impl Mat {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Blank RGB canvas, mostly useful for tests and synthetic frames.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(DynamicImage::new_rgb8(width, height))
    }

    pub fn rows(&self) -> i32 {
        self.image.height() as i32
    }

    pub fn cols(&self) -> i32 {
        self.image.width() as i32
    }

    pub fn size(&self) -> Size {
        Size::new(self.cols(), self.rows())
    }

    pub fn empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn to_rgb8(&self) -> RgbImage {
        self.image.to_rgb8()
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let pixel = self.image.get_pixel(x, y);
        [pixel[0], pixel[1], pixel[2]]
    }
}

/// A decoded image together with the file it came from.
///
/// Detectors receive the whole frame: pixel-based detectors look at `mat`,
/// file-backed ones only need `path`.
#[derive(Clone)]
pub struct Frame {
    pub path: PathBuf,
    pub mat: Mat,
}

impl Frame {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mat = imread(&path)?;
        Ok(Self { path, mat })
    }

    pub fn size(&self) -> Size {
        self.mat.size()
    }

    /// Sibling path `<dir>/<stem><suffix>.<ext>`, keeping the frame's extension.
    pub fn sibling_with_suffix(&self, suffix: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
            None => format!("{}{}", stem, suffix),
        };
        self.path.with_file_name(name)
    }

    /// Sibling path with the extension replaced, e.g. `a.jpg` -> `a.quads`.
    pub fn sibling_with_extension(&self, ext: &str) -> PathBuf {
        self.path.with_extension(ext)
    }
}

pub fn imread<P: AsRef<Path>>(path: P) -> Result<Mat> {
    let path = path.as_ref();
    let img = image::open(path)
        .map_err(|e| EngineError::ImageError(format!("{}: {}", path.display(), e)))?;
    let mat = Mat::new(img);
    if mat.empty() {
        return Err(EngineError::ImageError(format!("{}: empty image", path.display())));
    }
    Ok(mat)
}

pub fn imwrite<P: AsRef<Path>>(path: P, img: &Mat) -> Result<()> {
    let path = path.as_ref();
    img.image
        .save(path)
        .map_err(|e| EngineError::ImageError(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

/// Stable per-identity colour so the same window or marker always looks the same.
pub fn id_to_color(id: u32) -> Rgb<u8> {
    const COLORS: [[u8; 3]; 6] = [[1, 0, 1], [0, 0, 1], [0, 1, 1], [0, 1, 0], [1, 1, 0], [1, 0, 0]];
    let hashed = (id as u64).wrapping_mul(123_457);
    let offset = (hashed % 6) as usize;
    let scale = (150 + hashed % 100) as u8;
    let [r, g, b] = COLORS[offset];
    Rgb([r * scale, g * scale, b * scale])
}

/// Draw outlines of every window that lies fully inside the image.
pub fn draw_windows(img: &Mat, windows: &WindowStructure) -> Mat {
    let mut canvas = img.to_rgb8();
    let size = img.size();
    let valids = windows.check_valid_windows(size.width, size.height);

    for (index, valid) in valids.iter().enumerate() {
        if !valid {
            continue;
        }
        let Some(window) = windows.get(index) else {
            continue;
        };
        let color = id_to_color(window.id);
        for i in 0..4 {
            let a = window.vertices[i];
            let b = window.vertices[(i + 1) % 4];
            // 2px stroke
            for d in [0.0f32, 1.0] {
                draw_line_segment_mut(
                    &mut canvas,
                    (a.x as f32 + d, a.y as f32),
                    (b.x as f32 + d, b.y as f32),
                    color,
                );
            }
        }
    }

    Mat::new(DynamicImage::ImageRgb8(canvas))
}

pub fn draw_markers(img: &Mat, markers: &[Marker]) -> Mat {
    let mut canvas = img.to_rgb8();
    let radius = (img.cols().max(img.rows()) / 200).max(3);
    for marker in markers {
        draw_filled_circle_mut(
            &mut canvas,
            (marker.location.x, marker.location.y),
            radius,
            id_to_color(marker.id),
        );
    }
    Mat::new(DynamicImage::ImageRgb8(canvas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Window;

    #[test]
    fn test_id_to_color_is_stable() {
        assert_eq!(id_to_color(7), id_to_color(7));
        // 0 hashes to offset 0 ([1, 0, 1]) with scale 150
        assert_eq!(id_to_color(0), Rgb([150, 0, 150]));
    }

    #[test]
    fn test_sibling_paths() {
        let frame = Frame {
            path: PathBuf::from("/data/img/front.jpg"),
            mat: Mat::default(),
        };
        assert_eq!(frame.sibling_with_suffix("_overlay"), PathBuf::from("/data/img/front_overlay.jpg"));
        assert_eq!(frame.sibling_with_extension("quads"), PathBuf::from("/data/img/front.quads"));
    }

    #[test]
    fn test_draw_windows_skips_out_of_bounds() {
        let img = Mat::blank(20, 20);
        let mut ws = WindowStructure::new();
        ws.push_window(Window::new(
            1,
            [Point::new(2, 2), Point::new(2, 10), Point::new(10, 10), Point::new(10, 2)],
        ));
        ws.push_window(Window::new(
            2,
            [Point::new(15, 15), Point::new(15, 30), Point::new(30, 30), Point::new(30, 15)],
        ));

        let drawn = draw_windows(&img, &ws);
        assert_ne!(drawn.get_pixel(2, 5), [0, 0, 0]);
        assert_eq!(drawn.get_pixel(15, 17), [0, 0, 0]);
    }
}
