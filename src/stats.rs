//! Correlation, box-plot and per-city summary statistics.

use crate::fields::RowExt;
use crate::region::normalize_region_name;
use crate::timeline::parse_date_parts;
use crate::{round_to, DayEntry, Pollutant};
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// Core Types
// ============================================================================

/// One cell of a pollutant × meteorology correlation matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrCell {
    /// Upper-case pollutant name
    pub pollutant: String,
    /// Upper-case meteorological variable name
    pub meteor: String,
    pub value: f64,
}

/// Five-number summary, two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxStats {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBox {
    pub month: u32,
    /// Display label, e.g. `"3月"`
    pub name: String,
    pub count: usize,
    pub stats: BoxStats,
}

/// Mean/min/max of one pollutant for a city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub pollutant: Pollutant,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

// ============================================================================
// Correlation
// ============================================================================

/// Pearson correlation coefficient, two decimals.
///
/// Returns 0 for empty input, zero variance, or a non-finite result.
/// Extra elements of the longer slice are ignored.
///
/// ```
/// use air_quality_core::pearson;
///
/// assert_eq!(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), 1.0);
/// assert_eq!(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), -1.0);
/// assert_eq!(pearson(&[], &[]), 0.0);
/// ```
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    let (mut sx, mut sy, mut sxy, mut sx2, mut sy2) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        sx += x;
        sy += y;
        sxy += x * y;
        sx2 += x * x;
        sy2 += y * y;
    }
    let n = n as f64;
    let numerator = n * sxy - sx * sy;
    let denominator = ((n * sx2 - sx * sx) * (n * sy2 - sy * sy)).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let r = numerator / denominator;
    if r.is_finite() {
        round_to(r, 2)
    } else {
        0.0
    }
}

fn finite_pairs(entries: &[DayEntry], a: &str, b: &str) -> (Vec<f64>, Vec<f64>) {
    entries
        .iter()
        .flat_map(|e| &e.data)
        .filter_map(|row| Some((row.number(a)?, row.number(b)?)))
        .unzip()
}

fn corr_cell(entries: &[DayEntry], pollutant: &str, meteor: &str) -> CorrCell {
    let (xs, ys) = finite_pairs(entries, pollutant, meteor);
    CorrCell {
        pollutant: pollutant.to_uppercase(),
        meteor: meteor.to_uppercase(),
        value: pearson(&xs, &ys),
    }
}

/// Correlation of every pollutant with every meteorological variable over
/// all rows where both values are finite.
///
/// # Arguments
///
/// * `entries` - Dated row batches, flattened before pairing
/// * `pollutants` - Pollutant field names (matrix rows)
/// * `meteors` - Meteorological field names (matrix columns)
///
/// # Returns
///
/// One cell per pollutant and variable pair, pollutant-major, with field
/// names upper-cased and the coefficient rounded to two decimals. A pair
/// with no samples or zero variance reports 0.
pub fn compute_corr_matrix(
    entries: &[DayEntry],
    pollutants: &[&str],
    meteors: &[&str],
) -> Vec<CorrCell> {
    pollutants
        .iter()
        .flat_map(|p| meteors.iter().map(move |m| corr_cell(entries, p, m)))
        .collect()
}

/// Parallel [`compute_corr_matrix`]. Output order matches the sequential
/// version.
#[cfg(feature = "parallel")]
pub fn compute_corr_matrix_parallel(
    entries: &[DayEntry],
    pollutants: &[&str],
    meteors: &[&str],
) -> Vec<CorrCell> {
    use rayon::prelude::*;

    let pairs: Vec<(&str, &str)> = pollutants
        .iter()
        .flat_map(|p| meteors.iter().map(move |m| (*p, *m)))
        .collect();

    pairs
        .par_iter()
        .map(|(p, m)| corr_cell(entries, p, m))
        .collect()
}

// ============================================================================
// Distribution
// ============================================================================

/// Min, quartiles and max by index into the sorted values.
///
/// Quartiles are the elements at `n/4`, `n/2` and `3n/4` (floored), without
/// interpolation. Non-finite values are ignored; `None` if nothing remains.
pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let at = |i: usize| round_to(sorted[i.min(n - 1)], 2);
    Some(BoxStats {
        min: at(0),
        q1: at(n / 4),
        median: at(n / 2),
        q3: at(3 * n / 4),
        max: at(n - 1),
    })
}

/// Box statistics of positive `field` values per calendar month, months
/// ascending. Months with no values are omitted.
pub fn compute_monthly_box_plot(entries: &[DayEntry], field: &str) -> Vec<MonthlyBox> {
    let mut months: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for entry in entries {
        let Some(parts) = parse_date_parts(&entry.date) else {
            continue;
        };
        let bucket = months.entry(parts.month).or_default();
        bucket.extend(entry.data.iter().filter_map(|r| r.positive(field)));
    }

    months
        .into_iter()
        .filter_map(|(month, values)| {
            let stats = box_stats(&values)?;
            Some(MonthlyBox {
                month,
                name: format!("{}月", month),
                count: values.len(),
                stats,
            })
        })
        .collect()
}

// ============================================================================
// City Summary
// ============================================================================

/// Mean/min/max of each pollutant for one city, optionally restricted to a
/// calendar month.
///
/// Rows match when their normalized `city` (or `province` when `city` is
/// empty) equals the normalized `city_name`. An empty `city_name` matches
/// every row. Pollutants with no finite readings report zeros.
pub fn compute_city_month_stats(
    entries: &[DayEntry],
    city_name: &str,
    month_filter: Option<u32>,
) -> Vec<MetricStats> {
    let target = normalize_region_name(city_name);
    // (sum, count, min, max)
    let mut acc = [(0.0f64, 0usize, f64::INFINITY, f64::NEG_INFINITY); 6];

    for entry in entries {
        if let Some(month) = month_filter {
            match parse_date_parts(&entry.date) {
                Some(parts) if parts.month == month => {}
                _ => continue,
            }
        }
        for row in &entry.data {
            let name = row
                .text("city")
                .map(normalize_region_name)
                .filter(|n| !n.is_empty())
                .or_else(|| row.text("province").map(normalize_region_name))
                .unwrap_or("");
            if !target.is_empty() && name != target {
                continue;
            }
            for p in Pollutant::ALL {
                if let Some(v) = row.number(p.key()) {
                    let slot = &mut acc[p.index()];
                    slot.0 += v;
                    slot.1 += 1;
                    slot.2 = slot.2.min(v);
                    slot.3 = slot.3.max(v);
                }
            }
        }
    }

    Pollutant::ALL
        .iter()
        .map(|&p| {
            let (sum, count, min, max) = acc[p.index()];
            if count == 0 {
                MetricStats { pollutant: p, avg: 0.0, min: 0.0, max: 0.0 }
            } else {
                MetricStats {
                    pollutant: p,
                    avg: round_to(sum / count as f64, 2),
                    min: round_to(min, 2),
                    max: round_to(max, 2),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Row;
    use serde_json::{json, Value};

    fn rows(v: Value) -> Vec<Row> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_pearson_degenerate() {
        assert_eq!(pearson(&[5.0], &[3.0]), 0.0);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_pearson_rounds() {
        let r = pearson(&[1.0, 2.0, 3.0, 4.0], &[1.0, 3.0, 2.0, 4.0]);
        assert_eq!(r, 0.8);
    }

    #[test]
    fn test_corr_matrix_skips_incomplete_pairs() {
        let entries = vec![DayEntry::new(
            "2020-01-01",
            rows(json!([
                {"pm25": 10, "temp": 1},
                {"pm25": 20, "temp": 2},
                {"pm25": 30, "temp": 3},
                {"pm25": 99},
                {"pm25": "x", "temp": 4},
                {"o3": 1, "temp": 3},
                {"o3": 2, "temp": 2},
            ])),
        )];
        let matrix = compute_corr_matrix(&entries, &["pm25", "o3"], &["temp"]);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0].pollutant, "PM25");
        assert_eq!(matrix[0].meteor, "TEMP");
        assert_eq!(matrix[0].value, 1.0);
        assert_eq!(matrix[1].value, -1.0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_corr_matrix_parallel_matches() {
        let entries = vec![DayEntry::new(
            "2020-01-01",
            rows(json!([{"a": 1, "x": 2, "y": 9}, {"a": 2, "x": 5, "y": 1}, {"a": 4, "x": 6, "y": 3}])),
        )];
        assert_eq!(
            compute_corr_matrix(&entries, &["a"], &["x", "y"]),
            compute_corr_matrix_parallel(&entries, &["a"], &["x", "y"])
        );
    }

    #[test]
    fn test_box_stats_index_quartiles() {
        let stats = box_stats(&[8.0, 1.0, 3.0, 5.0, 7.0, 2.0, 6.0, 4.0]).unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.q1, 3.0);
        assert_eq!(stats.median, 5.0);
        assert_eq!(stats.q3, 7.0);
        assert_eq!(stats.max, 8.0);
        assert!(box_stats(&[f64::NAN]).is_none());
        assert_eq!(box_stats(&[2.5]).unwrap().q3, 2.5);
    }

    #[test]
    fn test_monthly_box_plot() {
        let entries = vec![
            DayEntry::new("2020-02-01", rows(json!([{"pm25": 10}, {"pm25": 0}]))),
            DayEntry::new("2020-01-05", rows(json!([{"pm25": 30}, {"pm25": 20}]))),
            DayEntry::new("2020-03-01", rows(json!([{"pm25": -1}]))),
            DayEntry::new("bad", rows(json!([{"pm25": 50}]))),
        ];
        let boxes = compute_monthly_box_plot(&entries, "pm25");
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].month, 1);
        assert_eq!(boxes[0].name, "1月");
        assert_eq!(boxes[0].count, 2);
        assert_eq!(boxes[1].stats.max, 10.0);
    }

    #[test]
    fn test_city_month_stats() {
        let entries = vec![
            DayEntry::new(
                "2020-01-01",
                rows(json!([
                    {"city": "北京市|北京市", "pm25": 10, "o3": 50},
                    {"city": "天津市", "pm25": 500},
                ])),
            ),
            DayEntry::new("2020-01-02", rows(json!([{"city": "北京市", "pm25": 30}]))),
            DayEntry::new("2020-02-01", rows(json!([{"city": "北京市", "pm25": 1000}]))),
        ];
        let stats = compute_city_month_stats(&entries, "北京市", Some(1));
        let pm25 = stats[0];
        assert_eq!(pm25.pollutant, Pollutant::Pm25);
        assert_eq!((pm25.avg, pm25.min, pm25.max), (20.0, 10.0, 30.0));
        assert_eq!(stats[5].avg, 50.0);
        assert_eq!((stats[1].avg, stats[1].min, stats[1].max), (0.0, 0.0, 0.0));

        let all = compute_city_month_stats(&entries, "北京市", None);
        assert_eq!(all[0].max, 1000.0);
    }

    #[test]
    fn test_city_month_stats_province_fallback() {
        let entries = vec![DayEntry::new(
            "2020-01-01",
            rows(json!([{"province": "上海市", "pm25": 40}])),
        )];
        let stats = compute_city_month_stats(&entries, "上海市", None);
        assert_eq!(stats[0].avg, 40.0);
    }
}
