//! Wind rose over `(u, v)` wind components.

use crate::fields::RowExt;
use crate::geo_utils::{wind_angle_deg, wind_speed};
use crate::ranking::mean;
use crate::{round_to, Row};
use serde::Serialize;

/// Octant labels, indexed by `round(angle / 45) % 8`.
pub const WIND_DIRECTIONS: [&str; 8] = ["E", "NE", "N", "NW", "W", "SW", "S", "SE"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindRoseBin {
    pub dir: &'static str,
    /// Mean wind speed in the octant, two decimals
    pub value: f64,
}

/// Finite `(u, v)` components of a row.
pub fn wind_components(row: &Row) -> Option<(f64, f64)> {
    Some((row.number("u")?, row.number("v")?))
}

/// Octant of a wind vector, `0..8`.
pub fn wind_octant(u: f64, v: f64) -> usize {
    ((wind_angle_deg(u, v) / 45.0).round() as usize) % 8
}

/// Mean wind speed per compass octant. Rows without both components are
/// skipped; empty octants report 0.
///
/// ```
/// use air_quality_core::{compute_wind_rose, Row};
/// use serde_json::json;
///
/// let rows: Vec<Row> = serde_json::from_value(json!([
///     {"u": 3.0, "v": 0.0},
///     {"u": 5.0, "v": 0.0},
/// ])).unwrap();
///
/// let rose = compute_wind_rose(&rows);
/// assert_eq!(rose[0].dir, "E");
/// assert_eq!(rose[0].value, 4.0);
/// ```
pub fn compute_wind_rose(rows: &[Row]) -> Vec<WindRoseBin> {
    let mut bins = [(0.0f64, 0usize); 8];
    for (u, v) in rows.iter().filter_map(wind_components) {
        let bin = &mut bins[wind_octant(u, v)];
        bin.0 += wind_speed(u, v);
        bin.1 += 1;
    }

    WIND_DIRECTIONS
        .iter()
        .zip(bins)
        .map(|(&dir, (sum, count))| WindRoseBin {
            dir,
            value: round_to(mean(sum, count), 2),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn rows(v: Value) -> Vec<Row> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_octants() {
        assert_eq!(wind_octant(1.0, 0.0), 0);
        assert_eq!(wind_octant(1.0, 1.0), 1);
        assert_eq!(wind_octant(0.0, 1.0), 2);
        assert_eq!(wind_octant(-1.0, 0.0), 4);
        assert_eq!(wind_octant(0.0, -1.0), 6);
        // 350° rounds up to 360° and wraps to E
        let a = 350f64.to_radians();
        assert_eq!(wind_octant(a.cos(), a.sin()), 0);
    }

    #[test]
    fn test_wind_rose_means() {
        let data = rows(json!([
            {"u": 0, "v": 2},
            {"u": 0, "v": 4},
            {"u": -3, "v": -4},
            {"u": "x", "v": 1},
            {"v": 1},
        ]));
        let rose = compute_wind_rose(&data);
        assert_eq!(rose.len(), 8);
        assert_eq!(rose[2].dir, "N");
        assert_eq!(rose[2].value, 3.0);
        // atan2(-4, -3) = 233.13° → SW
        assert_eq!(rose[5].value, 5.0);
        assert_eq!(rose[0].value, 0.0);
    }
}
