//! Flat-earth mapping between GPS coordinates and a normalized `-1..1` plane
//! spanning a rectangular site.

use serde::{Deserialize, Serialize};

use crate::image_impl::Point2i;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Site bounds and altitude range. All derived scales are computed from
/// these on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub top_left_latitude: f64,
    pub top_left_longitude: f64,
    pub bottom_right_latitude: f64,
    pub bottom_right_longitude: f64,
    pub min_altitude: f64,
    pub max_altitude: f64,
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self {
            top_left_latitude: 37.586620,
            top_left_longitude: 127.054646,
            bottom_right_latitude: 37.579896,
            bottom_right_longitude: 127.064674,
            min_altitude: 0.0,
            max_altitude: 150.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalized2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalized3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFrame {
    pub bounds: GeoBounds,
    origin_latitude: f64,
    origin_longitude: f64,
    /// Meters per normalized unit along each axis.
    dist_per_normalized: [f64; 3],
    /// Meters per degree of latitude / longitude at the origin.
    dist_per_latitude: f64,
    dist_per_longitude: f64,
}

impl Default for GeoFrame {
    fn default() -> Self {
        Self::new(GeoBounds::default())
    }
}

impl GeoFrame {
    pub fn new(bounds: GeoBounds) -> Self {
        let origin_latitude = (bounds.top_left_latitude + bounds.bottom_right_latitude) / 2.0;
        let origin_longitude = (bounds.top_left_longitude + bounds.bottom_right_longitude) / 2.0;

        let dist_per_latitude = 2.0 * std::f64::consts::PI * EARTH_RADIUS_M / 360.0;
        let dist_per_longitude = dist_per_latitude * origin_latitude.to_radians().cos();
        let plane_width = (bounds.bottom_right_longitude - bounds.top_left_longitude) * dist_per_longitude;
        let plane_height = (bounds.top_left_latitude - bounds.bottom_right_latitude) * dist_per_latitude;

        Self {
            bounds,
            origin_latitude,
            origin_longitude,
            dist_per_normalized: [
                plane_width / 2.0,
                plane_height / 2.0,
                bounds.max_altitude - bounds.min_altitude,
            ],
            dist_per_latitude,
            dist_per_longitude,
        }
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_latitude, self.origin_longitude)
    }

    /// Site extent in meters (width, height).
    pub fn plane_size(&self) -> (f64, f64) {
        (self.dist_per_normalized[0] * 2.0, self.dist_per_normalized[1] * 2.0)
    }

    pub fn gps_to_normalized_2d(&self, latitude: f64, longitude: f64) -> Normalized2 {
        Normalized2 {
            x: (longitude - self.origin_longitude) * self.dist_per_longitude / self.dist_per_normalized[0],
            y: (latitude - self.origin_latitude) * self.dist_per_latitude / self.dist_per_normalized[1],
        }
    }

    /// Altitude is measured from ground level (0 m).
    pub fn gps_to_normalized_3d(&self, latitude: f64, longitude: f64, altitude: f64) -> Normalized3 {
        let p = self.gps_to_normalized_2d(latitude, longitude);
        Normalized3 {
            x: p.x,
            y: p.y,
            z: altitude / self.dist_per_normalized[2],
        }
    }

    /// Distance in meters between two normalized points.
    pub fn real_distance_2d(&self, a: Normalized2, b: Normalized2) -> f64 {
        let dx = (a.x - b.x) * self.dist_per_normalized[0];
        let dy = (a.y - b.y) * self.dist_per_normalized[1];
        dx.hypot(dy)
    }

    pub fn real_distance_3d(&self, a: Normalized3, b: Normalized3) -> f64 {
        let dx = (a.x - b.x) * self.dist_per_normalized[0];
        let dy = (a.y - b.y) * self.dist_per_normalized[1];
        let dz = (a.z - b.z) * self.dist_per_normalized[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Normalized plane to image pixels; north is up. Truncates.
pub fn normalized_to_image(p: Normalized2, width: i32, height: i32) -> Point2i {
    Point2i::new(
        ((p.x + 1.0) / 2.0 * width as f64) as i32,
        ((-p.y + 1.0) / 2.0 * height as f64) as i32,
    )
}
