//! # Geographic Utilities
//!
//! Coordinate and wind-vector helpers shared by the map layers.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_km`] | Great-circle distance between two region coordinates |
//! | [`wind_speed`] | Magnitude of a `(u, v)` wind vector |
//! | [`wind_angle_deg`] | Direction of a `(u, v)` vector in `[0, 360)` degrees |
//! | [`wind_segment`] | Line from a base coordinate along a scaled wind vector |
//! | [`segment_coords`] | `[[lon, lat], [lon, lat]]` endpoints of a segment |
//!
//! All coordinates are WGS84 longitude/latitude in degrees. Wind components
//! are added to coordinates directly after scaling, so segments are a
//! visual cue rather than a physical displacement.
//!
//! ## Example
//!
//! ```rust
//! use air_quality_core::{geo_utils, RegionCoord};
//!
//! let base = RegionCoord::new(116.4, 39.9);
//! let line = geo_utils::wind_segment(base, 3.0, 4.0, 0.3);
//! assert_eq!(geo_utils::wind_speed(3.0, 4.0), 5.0);
//! let [start, end] = geo_utils::segment_coords(&line);
//! assert_eq!(start, [116.4, 39.9]);
//! assert!((end[0] - 117.3).abs() < 1e-9);
//! ```

use crate::RegionCoord;
use geo::{coord, Distance, Haversine, Line, Point};

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in kilometres (spherical Earth, 6,371 km radius).
#[inline]
pub fn haversine_km(a: &RegionCoord, b: &RegionCoord) -> f64 {
    let p1 = Point::new(a.lon, a.lat);
    let p2 = Point::new(b.lon, b.lat);
    Haversine::distance(p1, p2) / 1000.0
}

// =============================================================================
// Wind Vectors
// =============================================================================

#[inline]
pub fn wind_speed(u: f64, v: f64) -> f64 {
    u.hypot(v)
}

/// Direction of the vector measured counter-clockwise from +u, in `[0, 360)`.
pub fn wind_angle_deg(u: f64, v: f64) -> f64 {
    (v.atan2(u).to_degrees() + 360.0) % 360.0
}

/// Segment starting at `base` and ending at `base + (u, v) * scale`.
pub fn wind_segment(base: RegionCoord, u: f64, v: f64, scale: f64) -> Line<f64> {
    let start = coord! { x: base.lon, y: base.lat };
    let end = start + coord! { x: u * scale, y: v * scale };
    Line::new(start, end)
}

pub fn segment_coords(line: &Line<f64>) -> [[f64; 2]; 2] {
    [[line.start.x, line.start.y], [line.end.x, line.end.y]]
}
