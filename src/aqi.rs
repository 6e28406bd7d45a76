//! IAQI and AQI computation.
//!
//! The overall AQI of a reading is the maximum sub-index across the six
//! pollutants; the pollutant that attains it is the primary pollutant.

use crate::breakpoints::locate;
use crate::fields::{FieldConventions, RowExt};
use crate::{round_to, Granularity, Pollutant, Row};
use serde::Serialize;
use serde_json::{json, Value};

// ============================================================================
// Core Types
// ============================================================================

/// Sub-index of a single pollutant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IaqiEntry {
    pub pollutant: Pollutant,
    pub iaqi: f64,
}

/// Overall AQI of one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AqiResult {
    pub aqi: f64,
    /// Pollutant attaining the maximum IAQI. When every sub-index is zero
    /// this is the first pollutant in scan order.
    pub primary_pollutant: Pollutant,
    /// One entry per pollutant, in scan order.
    pub iaqis: Vec<IaqiEntry>,
}

/// AQI category, named as the dashboards label them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AqiLevel {
    #[serde(rename = "优")]
    Excellent,
    #[serde(rename = "良")]
    Good,
    #[serde(rename = "轻度")]
    Light,
    #[serde(rename = "中度")]
    Moderate,
    #[serde(rename = "重度")]
    Heavy,
    #[serde(rename = "严重")]
    Severe,
}

impl AqiLevel {
    pub const ALL: [AqiLevel; 6] = [
        AqiLevel::Excellent,
        AqiLevel::Good,
        AqiLevel::Light,
        AqiLevel::Moderate,
        AqiLevel::Heavy,
        AqiLevel::Severe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AqiLevel::Excellent => "优",
            AqiLevel::Good => "良",
            AqiLevel::Light => "轻度",
            AqiLevel::Moderate => "中度",
            AqiLevel::Heavy => "重度",
            AqiLevel::Severe => "严重",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

// ============================================================================
// Core Functions
// ============================================================================

/// Sub-index for one concentration.
///
/// Missing or NaN values yield 0. Values above the table extrapolate from
/// the top segment and are capped at its IAQI ceiling. Rounded to one
/// decimal place.
///
/// ```
/// use air_quality_core::{compute_iaqi, Pollutant};
///
/// assert_eq!(compute_iaqi(Some(35.0), Pollutant::Pm25), 50.0);
/// assert_eq!(compute_iaqi(Some(2000.0), Pollutant::Pm25), 500.0);
/// assert_eq!(compute_iaqi(None, Pollutant::O3), 0.0);
/// ```
pub fn compute_iaqi(value: Option<f64>, pollutant: Pollutant) -> f64 {
    let value = match value {
        Some(v) if !v.is_nan() => v,
        _ => return 0.0,
    };
    let seg = locate(pollutant, value);
    round_to(seg.interpolate(value).min(seg.iaqi_hi), 1)
}

/// [`compute_iaqi`] keyed by field name. Unknown pollutants yield 0.
pub fn compute_iaqi_for_key(value: Option<f64>, key: &str) -> f64 {
    match Pollutant::from_key(key) {
        Some(p) => compute_iaqi(value, p),
        None => 0.0,
    }
}

/// AQI from per-pollutant concentrations, indexed like [`Pollutant::ALL`].
pub fn compute_aqi_from_values(values: [Option<f64>; 6]) -> AqiResult {
    let iaqis: Vec<IaqiEntry> = Pollutant::ALL
        .iter()
        .map(|&p| IaqiEntry {
            pollutant: p,
            iaqi: compute_iaqi(values[p.index()], p),
        })
        .collect();

    let mut best = iaqis[0];
    for entry in &iaqis[1..] {
        if entry.iaqi > best.iaqi {
            best = *entry;
        }
    }

    AqiResult {
        aqi: best.iaqi,
        primary_pollutant: best.pollutant,
        iaqis,
    }
}

/// AQI of a daily row, reading the bare pollutant fields.
pub fn compute_aqi(row: &Row) -> AqiResult {
    compute_aqi_from_values(Pollutant::ALL.map(|p| row.number(p.key())))
}

/// AQI of a row at any granularity, resolving suffixed aggregate fields.
pub fn compute_aqi_for_granularity(
    row: &Row,
    granularity: Granularity,
    conventions: &FieldConventions,
) -> AqiResult {
    compute_aqi_from_values(Pollutant::ALL.map(|p| row.number_at(p.key(), granularity, conventions)))
}

/// Category for an AQI value. Bounds are inclusive upper limits.
pub fn aqi_to_level(aqi: f64) -> AqiLevel {
    if aqi <= 50.0 {
        AqiLevel::Excellent
    } else if aqi <= 100.0 {
        AqiLevel::Good
    } else if aqi <= 150.0 {
        AqiLevel::Light
    } else if aqi <= 200.0 {
        AqiLevel::Moderate
    } else if aqi <= 300.0 {
        AqiLevel::Heavy
    } else {
        AqiLevel::Severe
    }
}

fn with_aqi(row: &Row) -> Row {
    let result = compute_aqi(row);
    let mut out = row.clone();
    out.insert("aqi".to_string(), json!(result.aqi));
    out.insert(
        "primaryPollutant".to_string(),
        Value::String(result.primary_pollutant.key().to_string()),
    );
    out.insert(
        "iaqis".to_string(),
        Value::Array(
            result
                .iaqis
                .iter()
                .map(|e| json!({ "pollutant": e.pollutant.key(), "iaqi": e.iaqi }))
                .collect(),
        ),
    );
    out
}

/// Copies of `rows` with `aqi`, `primaryPollutant` and `iaqis` attached.
/// Existing fields are preserved; the inputs are not modified.
pub fn attach_aqi(rows: &[Row]) -> Vec<Row> {
    rows.iter().map(with_aqi).collect()
}

/// Parallel [`attach_aqi`]. Output order matches input order.
#[cfg(feature = "parallel")]
pub fn attach_aqi_parallel(rows: &[Row]) -> Vec<Row> {
    use rayon::prelude::*;

    rows.par_iter().map(with_aqi).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoints::breakpoints_for;

    fn row(v: Value) -> Row {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_iaqi_segment_boundaries() {
        assert_eq!(compute_iaqi(Some(0.0), Pollutant::Pm25), 0.0);
        assert_eq!(compute_iaqi(Some(35.0), Pollutant::Pm25), 50.0);
        assert_eq!(compute_iaqi(Some(75.0), Pollutant::Pm25), 100.0);
        assert_eq!(compute_iaqi(Some(40.0), Pollutant::Pm25), 56.3);
        assert_eq!(compute_iaqi(Some(3.0), Pollutant::Co), 75.0);
    }

    #[test]
    fn test_iaqi_rounds_exact_value() {
        // 50.1 interpolates to 50.04999…, which rounds down
        assert_eq!(compute_iaqi(Some(50.1), Pollutant::Pm10), 50.0);
        assert_eq!(compute_iaqi(Some(50.3), Pollutant::Pm10), 50.1);
        assert_eq!(compute_iaqi(Some(51.1), Pollutant::Pm10), 50.5);
    }

    #[test]
    fn test_iaqi_at_every_breakpoint() {
        for p in Pollutant::ALL {
            for seg in breakpoints_for(p) {
                assert_eq!(compute_iaqi(Some(seg.bp_lo), p), seg.iaqi_lo, "{p} at {}", seg.bp_lo);
                assert_eq!(compute_iaqi(Some(seg.bp_hi), p), seg.iaqi_hi, "{p} at {}", seg.bp_hi);
            }
        }
        assert_eq!(compute_iaqi(Some(150.0), Pollutant::Pm25), 200.0);
    }

    #[test]
    fn test_iaqi_monotone_sweep() {
        for p in Pollutant::ALL {
            let mut prev = 0.0;
            for i in 0..=13_000 {
                let v = i as f64 / 10.0;
                let iaqi = compute_iaqi(Some(v), p);
                assert!(iaqi >= prev, "{p} decreases at {v}: {prev} -> {iaqi}");
                assert!((0.0..=500.0).contains(&iaqi));
                prev = iaqi;
            }
        }
    }

    #[test]
    fn test_iaqi_caps_at_top_segment() {
        assert_eq!(compute_iaqi(Some(600.0), Pollutant::Pm25), 500.0);
        assert_eq!(compute_iaqi(Some(f64::INFINITY), Pollutant::So2), 500.0);
    }

    #[test]
    fn test_iaqi_missing_and_unknown() {
        assert_eq!(compute_iaqi(None, Pollutant::Pm10), 0.0);
        assert_eq!(compute_iaqi(Some(f64::NAN), Pollutant::Pm10), 0.0);
        assert_eq!(compute_iaqi_for_key(Some(40.0), "pm1"), 0.0);
        assert_eq!(compute_iaqi_for_key(Some(40.0), "pm25"), 56.3);
    }

    #[test]
    fn test_aqi_picks_max_subindex() {
        let r = row(json!({"pm25": 40, "pm10": 60, "so2": 10, "no2": 20, "co": 1, "o3": 50}));
        let result = compute_aqi(&r);
        assert_eq!(result.aqi, 56.3);
        assert_eq!(result.primary_pollutant, Pollutant::Pm25);
        assert_eq!(result.iaqis.len(), 6);
        assert_eq!(result.iaqis[1].iaqi, 55.0);
    }

    #[test]
    fn test_aqi_tie_goes_to_first_pollutant() {
        // pm25 35 and pm10 50 both hit IAQI 50
        let r = row(json!({"pm25": 35, "pm10": 50}));
        let result = compute_aqi(&r);
        assert_eq!(result.aqi, 50.0);
        assert_eq!(result.primary_pollutant, Pollutant::Pm25);
    }

    #[test]
    fn test_aqi_empty_row() {
        let result = compute_aqi(&Row::new());
        assert_eq!(result.aqi, 0.0);
        assert_eq!(result.primary_pollutant, Pollutant::Pm25);
    }

    #[test]
    fn test_aqi_for_month_granularity() {
        let r = row(json!({"o3_mean": 160, "pm25_mean": 10}));
        let result = compute_aqi_for_granularity(&r, Granularity::Month, &FieldConventions::default());
        assert_eq!(result.aqi, 100.0);
        assert_eq!(result.primary_pollutant, Pollutant::O3);
    }

    #[test]
    fn test_aqi_to_level_bounds() {
        assert_eq!(aqi_to_level(50.0), AqiLevel::Excellent);
        assert_eq!(aqi_to_level(50.1), AqiLevel::Good);
        assert_eq!(aqi_to_level(150.0), AqiLevel::Light);
        assert_eq!(aqi_to_level(200.0), AqiLevel::Moderate);
        assert_eq!(aqi_to_level(300.0), AqiLevel::Heavy);
        assert_eq!(aqi_to_level(300.1), AqiLevel::Severe);
        assert_eq!(AqiLevel::Severe.name(), "严重");
    }

    #[test]
    fn test_attach_aqi_preserves_fields() {
        let rows = vec![row(json!({"city": "北京", "pm25": "40"}))];
        let out = attach_aqi(&rows);
        assert_eq!(out[0]["city"], json!("北京"));
        assert_eq!(out[0]["aqi"], json!(56.3));
        assert_eq!(out[0]["primaryPollutant"], json!("pm25"));
        assert_eq!(out[0]["iaqis"].as_array().map(Vec::len), Some(6));
        // input untouched
        assert!(rows[0].get("aqi").is_none());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_attach_aqi_parallel_matches_sequential() {
        let rows: Vec<Row> = (0..50)
            .map(|i| row(json!({"pm25": i * 7, "o3": i * 11})))
            .collect();
        assert_eq!(attach_aqi(&rows), attach_aqi_parallel(&rows));
    }
}
