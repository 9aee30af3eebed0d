//! Integer polygon kernel used for window IoU scoring.
//!
//! Areas are kept doubled so shoelace sums stay integral. Polygons are
//! ordered vertex lists; the last vertex implicitly connects to the first.

use std::cmp::Ordering;

use geo_clipper::Clipper;
use geo_types::{LineString, Polygon};

use crate::image_impl::{Point2d, Point2i};

/// Slopes closer than this are treated as parallel.
pub const PARALLEL_SLOPE_EPS: f64 = 0.01;

/// Twice the signed area (positive for counter-clockwise in a y-up frame).
pub fn signed_doubled_area(points: &[Point2i]) -> i64 {
    if points.len() < 3 {
        return 0;
    }
    let n = points.len();
    let mut sum = 0i64;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        sum += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    sum
}

/// Twice the polygon area.
pub fn doubled_area(points: &[Point2i]) -> i64 {
    signed_doubled_area(points).abs()
}

/// Exact containment test: the fan of triangles from `point` to every edge
/// covers exactly the polygon area iff the point is inside or on the boundary.
///
/// Valid for convex polygons, or for points strictly inside.
pub fn is_inside(point: Point2i, polygon: &[Point2i]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let n = polygon.len();
    let fan: i64 = (0..n)
        .map(|i| doubled_area(&[point, polygon[i], polygon[(i + 1) % n]]))
        .sum();
    fan == doubled_area(polygon)
}

/// Intersection of the infinite lines through two segments.
fn find_line_intersection(s1: [Point2i; 2], s2: [Point2i; 2]) -> Option<(f64, f64)> {
    let [a1, a2] = s1.map(Point2i::to_f64);
    let [b1, b2] = s2.map(Point2i::to_f64);

    let vertical1 = s1[0].x == s1[1].x;
    let vertical2 = s2[0].x == s2[1].x;

    match (vertical1, vertical2) {
        (true, true) => None,
        (true, false) => {
            let m2 = (b2.y - b1.y) / (b2.x - b1.x);
            let x = a1.x;
            Some((x, m2 * (x - b1.x) + b1.y))
        }
        (false, true) => {
            let m1 = (a2.y - a1.y) / (a2.x - a1.x);
            let x = b1.x;
            Some((x, m1 * (x - a1.x) + a1.y))
        }
        (false, false) => {
            let m1 = (a2.y - a1.y) / (a2.x - a1.x);
            let m2 = (b2.y - b1.y) / (b2.x - b1.x);
            if (m1 - m2).abs() < PARALLEL_SLOPE_EPS {
                return None;
            }
            let x = (b1.y - a1.y + m1 * a1.x - m2 * b1.x) / (m1 - m2);
            Some((x, m1 * (x - a1.x) + a1.y))
        }
    }
}

fn within_bbox(p: Point2i, s: [Point2i; 2]) -> bool {
    let (min_x, max_x) = (s[0].x.min(s[1].x), s[0].x.max(s[1].x));
    let (min_y, max_y) = (s[0].y.min(s[1].y), s[0].y.max(s[1].y));
    p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y
}

/// Intersection point of two segments, if the line intersection falls within
/// both segments' bounding boxes.
///
/// The bounding-box check is necessary but not sufficient for diagonal
/// segments; this tolerance is what the scoring has always used.
pub fn find_bounded_line_intersection(s1: [Point2i; 2], s2: [Point2i; 2]) -> Option<Point2i> {
    let (x, y) = find_line_intersection(s1, s2)?;
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let p = Point2i::new(x.round() as i32, y.round() as i32);
    (within_bbox(p, s1) && within_bbox(p, s2)).then_some(p)
}

fn edges(polygon: &[Point2i]) -> impl Iterator<Item = [Point2i; 2]> + '_ {
    let n = polygon.len();
    (0..n).map(move |i| [polygon[i], polygon[(i + 1) % n]])
}

/// Twice the area shared by two polygons.
///
/// The intersection ring is rebuilt by sorting the collected points around
/// their centroid, which is exact only when the intersection is star-shaped
/// from that centroid (always the case for two convex quadrilaterals).
pub fn doubled_intersected_area(a: &[Point2i], b: &[Point2i]) -> i64 {
    let mut points: Vec<Point2i> = Vec::new();

    points.extend(a.iter().copied().filter(|&p| is_inside(p, b)));
    points.extend(b.iter().copied().filter(|&p| is_inside(p, a)));

    for ea in edges(a) {
        for eb in edges(b) {
            if let Some(p) = find_bounded_line_intersection(ea, eb) {
                points.push(p);
            }
        }
    }

    points.sort_by_key(|p| (p.x, p.y));
    points.dedup();
    if points.len() < 3 {
        return 0;
    }

    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y as f64).sum::<f64>() / n;
    points.sort_by(|p, q| {
        let ap = (p.y as f64 - cy).atan2(p.x as f64 - cx);
        let aq = (q.y as f64 - cy).atan2(q.x as f64 - cx);
        ap.partial_cmp(&aq).unwrap_or(Ordering::Equal)
    });

    doubled_area(&points)
}

fn ratio_or_zero(inter: f64, union: f64) -> f64 {
    if union <= 0.0 {
        return 0.0;
    }
    let iou = inter / union;
    if iou.is_finite() {
        iou
    } else {
        0.0
    }
}

/// Intersection over union; 0 when both polygons are degenerate.
pub fn iou(a: &[Point2i], b: &[Point2i]) -> f64 {
    let inter = doubled_intersected_area(a, b);
    let union = doubled_area(a) + doubled_area(b) - inter;
    ratio_or_zero(inter as f64, union as f64)
}

// Clipper snaps to an integer grid; scale so sub-pixel intersections survive.
const CLIPPER_FACTOR: f64 = 1024.0;

fn to_geo_polygon(points: &[Point2i]) -> Polygon<f64> {
    let ring: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    Polygon::new(LineString::from(ring), vec![])
}

fn ring_area(ring: &LineString<f64>) -> f64 {
    let coords = &ring.0;
    if coords.len() < 3 {
        return 0.0;
    }
    let n = coords.len();
    let mut sum = 0.0;
    for i in 0..n {
        let p = coords[i];
        let q = coords[(i + 1) % n];
        sum += p.x * q.y - q.x * p.y;
    }
    (sum / 2.0).abs()
}

fn polygon_area(polygon: &Polygon<f64>) -> f64 {
    let holes: f64 = polygon.interiors().iter().map(ring_area).sum();
    ring_area(polygon.exterior()) - holes
}

/// IoU through real polygon clipping, exact for any pair of simple polygons.
pub fn iou_clipped(a: &[Point2i], b: &[Point2i]) -> f64 {
    if a.len() < 3 || b.len() < 3 {
        return 0.0;
    }
    let pa = to_geo_polygon(a);
    let pb = to_geo_polygon(b);
    let inter: f64 = pa
        .intersection(&pb, CLIPPER_FACTOR)
        .0
        .iter()
        .map(polygon_area)
        .sum();
    let union = polygon_area(&pa) + polygon_area(&pb) - inter;
    ratio_or_zero(inter, union)
}

/// Scale a normalized (`0..1`) point to pixels. Truncates like the
/// reference tooling that produced the normalized files.
pub fn scale_to_absolute(p: Point2d, width: i32, height: i32) -> Point2i {
    Point2i::new((p.x * width as f64) as i32, (p.y * height as f64) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad(pts: [(i32, i32); 4]) -> Vec<Point2i> {
        pts.iter().map(|&(x, y)| Point2i::new(x, y)).collect()
    }

    fn square(x: i32, y: i32, s: i32) -> Vec<Point2i> {
        quad([(x, y), (x, y + s), (x + s, y + s), (x + s, y)])
    }

    #[test]
    fn test_doubled_area_square() {
        assert_eq!(doubled_area(&square(0, 0, 10)), 200);
    }

    #[test]
    fn test_doubled_area_degenerate() {
        assert_eq!(doubled_area(&[]), 0);
        assert_eq!(doubled_area(&[Point2i::new(1, 1), Point2i::new(5, 5)]), 0);
    }

    #[test]
    fn test_area_rotation_and_winding() {
        let q = quad([(0, 0), (2, 9), (11, 7), (8, -1)]);
        let base = signed_doubled_area(&q);
        for k in 1..4 {
            let mut rotated = q.clone();
            rotated.rotate_left(k);
            assert_eq!(signed_doubled_area(&rotated), base);
        }
        let mut reversed = q.clone();
        reversed.reverse();
        assert_eq!(signed_doubled_area(&reversed), -base);
        assert_eq!(doubled_area(&reversed), doubled_area(&q));
    }

    #[test]
    fn test_is_inside() {
        let sq = square(0, 0, 10);
        assert!(is_inside(Point2i::new(5, 5), &sq));
        assert!(is_inside(Point2i::new(0, 5), &sq));
        assert!(is_inside(Point2i::new(10, 10), &sq));
        assert!(!is_inside(Point2i::new(11, 5), &sq));
        assert!(!is_inside(Point2i::new(-1, -1), &sq));
    }

    #[test]
    fn test_is_inside_needs_polygon() {
        let seg = [Point2i::new(0, 0), Point2i::new(4, 4)];
        assert!(!is_inside(Point2i::new(2, 2), &seg));
    }

    #[test]
    fn test_bounded_intersection_crossing() {
        let p = find_bounded_line_intersection(
            [Point2i::new(0, 0), Point2i::new(10, 10)],
            [Point2i::new(0, 10), Point2i::new(10, 0)],
        );
        assert_eq!(p, Some(Point2i::new(5, 5)));
    }

    #[test]
    fn test_bounded_intersection_vertical() {
        let p = find_bounded_line_intersection(
            [Point2i::new(5, -10), Point2i::new(5, 10)],
            [Point2i::new(0, 0), Point2i::new(10, 0)],
        );
        assert_eq!(p, Some(Point2i::new(5, 0)));

        let both_vertical = find_bounded_line_intersection(
            [Point2i::new(5, -10), Point2i::new(5, 10)],
            [Point2i::new(5, 0), Point2i::new(5, 20)],
        );
        assert_eq!(both_vertical, None);
    }

    #[test]
    fn test_bounded_intersection_outside_segments() {
        // Lines cross at (20, 0), beyond the first segment.
        let p = find_bounded_line_intersection(
            [Point2i::new(0, 0), Point2i::new(10, 0)],
            [Point2i::new(20, -5), Point2i::new(20, 5)],
        );
        assert_eq!(p, None);
    }

    #[test]
    fn test_near_parallel_is_rejected() {
        // slopes 0 and 0.005
        let p = find_bounded_line_intersection(
            [Point2i::new(0, 0), Point2i::new(1000, 0)],
            [Point2i::new(0, -1), Point2i::new(1000, 4)],
        );
        assert_eq!(p, None);
    }

    #[test]
    fn test_iou_identical_is_one() {
        let shapes = [
            square(0, 0, 10),
            quad([(3, 1), (1, 9), (12, 11), (10, 2)]),
            quad([(100, 100), (90, 180), (210, 190), (220, 95)]),
        ];
        for q in &shapes {
            assert_relative_eq!(iou(q, q), 1.0);
        }
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = square(0, 0, 10);
        let b = square(20, 20, 10);
        assert_eq!(doubled_intersected_area(&a, &b), 0);
        assert_eq!(iou(&a, &b), 0.0);

        let c = square(0, 30, 10);
        assert_eq!(doubled_intersected_area(&a, &c), 0);
        assert_eq!(iou(&a, &c), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = square(0, 0, 10);
        let b = square(5, 0, 10);
        assert_eq!(doubled_intersected_area(&a, &b), 100);
        assert_relative_eq!(iou(&a, &b), 50.0 / 150.0);
    }

    #[test]
    fn test_iou_contained() {
        let outer = square(0, 0, 10);
        let inner = square(2, 2, 5);
        assert_eq!(doubled_intersected_area(&outer, &inner), 50);
        assert_relative_eq!(iou(&outer, &inner), 25.0 / 100.0);
    }

    #[test]
    fn test_iou_degenerate_is_zero() {
        let flat = quad([(0, 0), (5, 0), (10, 0), (3, 0)]);
        assert_eq!(iou(&flat, &flat), 0.0);
    }

    #[test]
    fn test_iou_clipped_agrees_on_convex() {
        let a = square(0, 0, 10);
        let b = square(5, 0, 10);
        assert_relative_eq!(iou_clipped(&a, &b), iou(&a, &b), epsilon = 1e-6);
        assert_relative_eq!(iou_clipped(&a, &a), 1.0, epsilon = 1e-9);
        assert_eq!(iou_clipped(&a, &square(50, 50, 3)), 0.0);
    }

    #[test]
    fn test_scale_to_absolute_truncates() {
        let p = scale_to_absolute(Point2d::new(0.5, 0.999), 101, 100);
        assert_eq!(p, Point2i::new(50, 99));
    }
}
