//! Concentration level buckets and level timelines.
//!
//! Buckets are half-open `[min, max)` ranges over a raw concentration
//! (typically PM2.5), labelled with the AQI category names.

use crate::aqi::AqiLevel;
use crate::fields::{FieldConventions, RowExt};
use crate::{DayEntry, Granularity, Row};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelBucket {
    pub level: AqiLevel,
    pub min: f64,
    pub max: f64,
}

impl LevelBucket {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }
}

pub const CONCENTRATION_BUCKETS: [LevelBucket; 6] = [
    LevelBucket { level: AqiLevel::Excellent, min: 0.0, max: 35.0 },
    LevelBucket { level: AqiLevel::Good, min: 35.0, max: 75.0 },
    LevelBucket { level: AqiLevel::Light, min: 75.0, max: 115.0 },
    LevelBucket { level: AqiLevel::Moderate, min: 115.0, max: 150.0 },
    LevelBucket { level: AqiLevel::Heavy, min: 150.0, max: 250.0 },
    LevelBucket { level: AqiLevel::Severe, min: 250.0, max: f64::INFINITY },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelCount {
    pub level: AqiLevel,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSeries {
    pub name: AqiLevel,
    pub data: Vec<u32>,
}

/// Stacked per-date level counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelTimeline {
    pub dates: Vec<String>,
    /// One series per bucket, each `dates.len()` long
    pub series: Vec<LevelSeries>,
}

fn bucket_index(value: f64) -> Option<usize> {
    CONCENTRATION_BUCKETS.iter().position(|b| b.contains(value))
}

/// Count rows per bucket of `field`.
///
/// Every row is counted: missing values read as zero, and values matching
/// no bucket (negative or unparseable) fall into the lowest bucket.
///
/// ```
/// use air_quality_core::{classify_levels, AqiLevel, Row};
/// use serde_json::json;
///
/// let rows: Vec<Row> = serde_json::from_value(json!([
///     {"pm25": 10}, {"pm25": 35}, {"pm25": 300}
/// ])).unwrap();
///
/// let counts = classify_levels(&rows, "pm25");
/// assert_eq!(counts[0].value, 1);
/// assert_eq!(counts[1].value, 1);
/// assert_eq!(counts[5].level, AqiLevel::Severe);
/// assert_eq!(counts[5].value, 1);
/// ```
pub fn classify_levels(rows: &[Row], field: &str) -> Vec<LevelCount> {
    let mut counts = [0u32; 6];
    for row in rows {
        let idx = row.number_or_zero(field).and_then(bucket_index).unwrap_or(0);
        counts[idx] += 1;
    }
    CONCENTRATION_BUCKETS
        .iter()
        .zip(counts)
        .map(|(b, value)| LevelCount { level: b.level, value })
        .collect()
}

/// Per-date bucket counts of a daily field.
pub fn compute_level_timeline(entries: &[DayEntry], field: &str) -> LevelTimeline {
    compute_level_timeline_by_granularity(
        entries,
        field,
        Granularity::Day,
        &FieldConventions::default(),
    )
}

/// Per-entry bucket counts of `field`, resolving aggregate field names.
///
/// Missing values read as zero; unparseable or out-of-range values are
/// skipped.
pub fn compute_level_timeline_by_granularity(
    entries: &[DayEntry],
    field: &str,
    granularity: Granularity,
    conventions: &FieldConventions,
) -> LevelTimeline {
    let mut series: Vec<LevelSeries> = CONCENTRATION_BUCKETS
        .iter()
        .map(|b| LevelSeries {
            name: b.level,
            data: Vec::with_capacity(entries.len()),
        })
        .collect();

    for entry in entries {
        let mut counts = [0u32; 6];
        for row in &entry.data {
            if let Some(idx) = row
                .number_or_zero_at(field, granularity, conventions)
                .and_then(bucket_index)
            {
                counts[idx] += 1;
            }
        }
        for (s, count) in series.iter_mut().zip(counts) {
            s.data.push(count);
        }
    }

    LevelTimeline {
        dates: entries.iter().map(|e| e.date.clone()).collect(),
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn rows(v: Value) -> Vec<Row> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(bucket_index(0.0), Some(0));
        assert_eq!(bucket_index(34.99), Some(0));
        assert_eq!(bucket_index(35.0), Some(1));
        assert_eq!(bucket_index(249.9), Some(4));
        assert_eq!(bucket_index(1e6), Some(5));
        assert_eq!(bucket_index(-1.0), None);
    }

    #[test]
    fn test_classify_levels_defaults_to_lowest() {
        let data = rows(json!([{"pm25": -5}, {"pm25": "x"}, {}, {"pm25": 120}]));
        let counts = classify_levels(&data, "pm25");
        assert_eq!(counts[0].value, 3);
        assert_eq!(counts[3].value, 1);
        let total: u32 = counts.iter().map(|c| c.value).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_level_timeline_shape() {
        let entries = vec![
            DayEntry::new("2020-01-01", rows(json!([{"pm25": 10}, {"pm25": 80}, {"pm25": -1}]))),
            DayEntry::new("2020-01-02", rows(json!([{"pm25": "oops"}, {}]))),
        ];
        let timeline = compute_level_timeline(&entries, "pm25");
        assert_eq!(timeline.dates, vec!["2020-01-01", "2020-01-02"]);
        assert_eq!(timeline.series.len(), 6);
        assert!(timeline.series.iter().all(|s| s.data.len() == 2));
        assert_eq!(timeline.series[0].data, vec![1, 1]);
        assert_eq!(timeline.series[2].data, vec![1, 0]);
    }

    #[test]
    fn test_level_timeline_counts_blank_as_zero() {
        let entries = vec![DayEntry::new(
            "2020-01-03",
            rows(json!([{"pm25": ""}, {"pm25": " "}, {"pm25": "x"}, {"pm25": 40}])),
        )];
        let timeline = compute_level_timeline(&entries, "pm25");
        assert_eq!(timeline.series[0].data, vec![2]);
        assert_eq!(timeline.series[1].data, vec![1]);
    }

    #[test]
    fn test_level_timeline_month_fields() {
        let entries = vec![DayEntry::new("2020-01", rows(json!([{"pm25_mean": 160}])))];
        let timeline = compute_level_timeline_by_granularity(
            &entries,
            "pm25",
            Granularity::Month,
            &FieldConventions::default(),
        );
        assert_eq!(timeline.series[4].data, vec![1]);
    }

    #[test]
    fn test_level_serializes_as_label() {
        let json = serde_json::to_value(LevelCount { level: AqiLevel::Good, value: 2 }).unwrap();
        assert_eq!(json, json!({"level": "良", "value": 2}));
    }
}
