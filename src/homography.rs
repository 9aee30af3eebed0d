//! Projective transforms between reference and image space.
//!
//! `RansacSolver` is the default `TransformSolver`: exact 4-point solves on
//! random minimal samples, inlier voting by reprojection error, then a
//! normalized DLT refit over the winning inlier set.

use nalgebra::{DMatrix, Matrix3, Matrix3xX, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::image_impl::Point2d;
use crate::types::RansacConfig;

/// Minimum number of correspondences for a projective transform.
pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    #[error("too few correspondences: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("source and destination sizes differ ({0} vs {1})")]
    LengthMismatch(usize, usize),

    #[error("degenerate correspondences (collinear or coincident points)")]
    Degenerate,

    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers { needed: usize, found: usize },

    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

/// 3x3 projective transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn new(m: Matrix3<f64>) -> Self {
        Self(m)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    pub fn inverse(&self) -> Option<Homography> {
        self.0.try_inverse().map(Homography)
    }

    /// Dehomogenize; a vanishing weight maps to the origin.
    fn dehomogenize(p: Vector3<f64>) -> Point2d {
        let w = p[2];
        if w.abs() > f32::EPSILON as f64 {
            Point2d::new(p[0] / w, p[1] / w)
        } else {
            Point2d::new(0.0, 0.0)
        }
    }

    pub fn project(&self, p: Point2d) -> Point2d {
        Self::dehomogenize(self.0 * Vector3::new(p.x, p.y, 1.0))
    }

    /// Project all points with a single 3xN matrix product.
    pub fn project_batch(&self, points: &[Point2d]) -> Vec<Point2d> {
        let homogeneous = Matrix3xX::from_fn(points.len(), |r, c| match r {
            0 => points[c].x,
            1 => points[c].y,
            _ => 1.0,
        });
        let projected = self.0 * homogeneous;
        projected
            .column_iter()
            .map(|c| Self::dehomogenize(Vector3::new(c[0], c[1], c[2])))
            .collect()
    }

    pub fn reprojection_error(&self, src: Point2d, dst: Point2d) -> f64 {
        let p = self.project(src);
        (p.x - dst.x).hypot(p.y - dst.y)
    }

    fn is_usable(&self) -> bool {
        self.0.iter().all(|v| v.is_finite()) && self.0.determinant().abs() > f64::EPSILON
    }
}

/// Estimates the transform mapping `src` onto `dst`.
pub trait TransformSolver {
    fn estimate(&self, src: &[Point2d], dst: &[Point2d]) -> Result<Homography, HomographyError>;
}

/// True when three of the four points are (nearly) collinear.
fn has_collinear_triplet(pts: &[Point2d; 4]) -> bool {
    for i in 0..4 {
        for j in (i + 1)..4 {
            for k in (j + 1)..4 {
                let (dx1, dy1) = (pts[j].x - pts[i].x, pts[j].y - pts[i].y);
                let (dx2, dy2) = (pts[k].x - pts[i].x, pts[k].y - pts[i].y);
                let cross = dx1 * dy2 - dy1 * dx2;
                let scale = dx1.abs() + dy1.abs() + dx2.abs() + dy2.abs();
                if cross.abs() <= f32::EPSILON as f64 * scale {
                    return true;
                }
            }
        }
    }
    false
}

/// Exact transform from four correspondences.
///
/// Solves the 8-parameter system with h22 = 1 by LU; falls back to the
/// 9-parameter DLT when that system is ill-posed.
pub fn get_perspective_transform(
    src: &[Point2d; 4],
    dst: &[Point2d; 4],
) -> Result<Homography, HomographyError> {
    let mut a = DMatrix::<f64>::zeros(8, 8);
    let mut b = DMatrix::<f64>::zeros(8, 1);

    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);

        a[(i, 0)] = x;
        a[(i, 1)] = y;
        a[(i, 2)] = 1.0;
        a[(i, 6)] = -u * x;
        a[(i, 7)] = -u * y;
        b[(i, 0)] = u;

        a[(i + 4, 3)] = x;
        a[(i + 4, 4)] = y;
        a[(i + 4, 5)] = 1.0;
        a[(i + 4, 6)] = -v * x;
        a[(i + 4, 7)] = -v * y;
        b[(i + 4, 0)] = v;
    }

    if let Some(sol) = a.clone().lu().solve(&b) {
        let residual = (&a * &sol - &b).norm();
        if residual < 1e-8 {
            let h = Homography(Matrix3::new(
                sol[(0, 0)], sol[(1, 0)], sol[(2, 0)],
                sol[(3, 0)], sol[(4, 0)], sol[(5, 0)],
                sol[(6, 0)], sol[(7, 0)], 1.0,
            ));
            if h.is_usable() {
                return Ok(h);
            }
        }
    }

    estimate_dlt(src, dst)
}

/// Translate the centroid to the origin and scale the mean distance to sqrt(2).
fn normalize_points(pts: &[Point2d]) -> (Matrix3<f64>, Vec<Point2d>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = pts.iter().map(|p| (p.x - cx).hypot(p.y - cy)).sum::<f64>() / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| Point2d::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    (t, normalized)
}

/// Least-squares transform from four or more correspondences (normalized DLT).
pub fn estimate_dlt(src: &[Point2d], dst: &[Point2d]) -> Result<Homography, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch(src.len(), dst.len()));
    }
    let n = src.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n,
        });
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i].x, src_n[i].y);
        let (dx, dy) = (dst_n[i].x, dst_n[i].y);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // Null vector of A = eigenvector of A^T A with the smallest eigenvalue.
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let (min_idx, _) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, &v)| if v.abs() < best.1 { (i, v.abs()) } else { best });
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| HomographyError::NumericalFailure("normalization not invertible".into()))?;
    let mut m = t_dst_inv * h_norm * t_src;
    let scale = m[(2, 2)];
    if scale.abs() > 1e-15 {
        m /= scale;
    }

    let h = Homography(m);
    if h.is_usable() {
        Ok(h)
    } else {
        Err(HomographyError::Degenerate)
    }
}

/// Iterations needed to draw one all-inlier sample with `confidence`.
fn update_num_iters(confidence: f64, outlier_ratio: f64, max_iters: usize) -> usize {
    let confidence = confidence.clamp(0.0, 1.0);
    let outlier_ratio = outlier_ratio.clamp(0.0, 1.0);

    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let denom = 1.0 - (1.0 - outlier_ratio).powi(MIN_CORRESPONDENCES as i32);
    if denom < f64::MIN_POSITIVE {
        return 0;
    }
    let denom = denom.ln();
    if denom >= 0.0 || -num >= max_iters as f64 * -denom {
        return max_iters;
    }
    (num / denom).round() as usize
}

#[derive(Debug, Clone, Default)]
pub struct RansacSolver {
    pub config: RansacConfig,
}

impl RansacSolver {
    pub fn new(config: RansacConfig) -> Self {
        Self { config }
    }

    fn count_inliers(&self, h: &Homography, src: &[Point2d], dst: &[Point2d], mask: &mut [bool]) -> usize {
        let mut count = 0;
        for i in 0..src.len() {
            mask[i] = h.reprojection_error(src[i], dst[i]) < self.config.inlier_threshold;
            count += mask[i] as usize;
        }
        count
    }
}

impl TransformSolver for RansacSolver {
    fn estimate(&self, src: &[Point2d], dst: &[Point2d]) -> Result<Homography, HomographyError> {
        if src.len() != dst.len() {
            return Err(HomographyError::LengthMismatch(src.len(), dst.len()));
        }
        let n = src.len();
        if n < MIN_CORRESPONDENCES {
            return Err(HomographyError::TooFewPoints {
                needed: MIN_CORRESPONDENCES,
                got: n,
            });
        }

        if n == MIN_CORRESPONDENCES {
            let s = [src[0], src[1], src[2], src[3]];
            let d = [dst[0], dst[1], dst[2], dst[3]];
            if has_collinear_triplet(&s) || has_collinear_triplet(&d) {
                return Err(HomographyError::Degenerate);
            }
            return get_perspective_transform(&s, &d);
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut best: Option<(Homography, usize)> = None;
        let mut best_mask = vec![false; n];
        let mut mask = vec![false; n];
        let mut niters = self.config.max_iters;
        let mut iter = 0;

        while iter < niters {
            iter += 1;
            let idx = rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES);
            let s = [src[idx.index(0)], src[idx.index(1)], src[idx.index(2)], src[idx.index(3)]];
            let d = [dst[idx.index(0)], dst[idx.index(1)], dst[idx.index(2)], dst[idx.index(3)]];
            if has_collinear_triplet(&s) || has_collinear_triplet(&d) {
                continue;
            }
            let Ok(h) = get_perspective_transform(&s, &d) else {
                continue;
            };

            let count = self.count_inliers(&h, src, dst, &mut mask);
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((h, count));
                best_mask.copy_from_slice(&mask);
                let outlier_ratio = (n - count) as f64 / n as f64;
                niters = update_num_iters(self.config.confidence, outlier_ratio, self.config.max_iters);
            }
        }

        let (best_h, best_count) = best.ok_or(HomographyError::Degenerate)?;
        if best_count < MIN_CORRESPONDENCES {
            return Err(HomographyError::InsufficientInliers {
                needed: MIN_CORRESPONDENCES,
                found: best_count,
            });
        }

        let inlier_src: Vec<Point2d> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
        let inlier_dst: Vec<Point2d> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
        Ok(estimate_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h))
    }
}
