//! Regional rankings, parallel-coordinate rows, radar vectors and trends.

use crate::aqi::compute_aqi;
use crate::fields::{FieldConventions, RowExt};
use crate::{
    modal_pollutant, record_vote, round_to, DayEntry, Granularity, OrderedGroups, Pollutant, Row,
};
use serde::Serialize;
use std::cmp::Ordering;

/// Default group field for rankings and parallel rows.
pub const DEFAULT_GROUP_FIELD: &str = "province";

/// Default number of regions kept by [`compute_aqi_ranking`].
pub const DEFAULT_RANKING_TOP_N: usize = 15;

/// Default number of regions kept by [`build_parallel_data`].
pub const DEFAULT_PARALLEL_TOP_N: usize = 30;

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingItem {
    pub name: String,
    /// Mean AQI over the group, one decimal
    pub aqi: f64,
    /// Most frequent primary pollutant
    pub primary_pollutant: Option<Pollutant>,
}

/// One polyline of a parallel-coordinates chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelRow {
    pub name: String,
    /// `[aqi, pm25, pm10, so2, no2, co, o3]` means, two decimals
    pub values: Vec<f64>,
    pub primary_pollutant: Option<Pollutant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadialIndicator {
    /// Upper-case pollutant label, e.g. `"PM25"`
    pub indicator: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Default)]
struct AqiAccumulator {
    sum: f64,
    count: usize,
    votes: Vec<(Pollutant, u32)>,
    pollutants: [(f64, usize); 6],
}

impl AqiAccumulator {
    fn add(&mut self, row: &Row) {
        let result = compute_aqi(row);
        self.sum += result.aqi;
        self.count += 1;
        record_vote(&mut self.votes, result.primary_pollutant);
    }

    fn add_pollutants(&mut self, row: &Row) {
        for p in Pollutant::ALL {
            if let Some(v) = row.number(p.key()) {
                let slot = &mut self.pollutants[p.index()];
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }

    fn mean_aqi(&self) -> f64 {
        mean(self.sum, self.count)
    }
}

// ============================================================================
// Core Functions
// ============================================================================

/// Mean AQI per region, highest first, truncated to `top_n`.
///
/// Rows group by `field`, falling back to `province` then `city`; rows with
/// no name are skipped. Groups with equal AQI keep first-seen order.
///
/// # Arguments
///
/// * `rows` - Daily observation rows
/// * `field` - Row field naming the region to group by
/// * `top_n` - Maximum number of regions returned
///
/// # Returns
///
/// Ranking items with the mean AQI rounded to one decimal and the most
/// frequent primary pollutant of the group.
///
/// ```
/// use air_quality_core::{compute_aqi_ranking, Pollutant, Row};
/// use serde_json::json;
///
/// let rows: Vec<Row> = serde_json::from_value(json!([
///     {"province": "A", "pm25": 40},
///     {"province": "B", "pm25": 80},
/// ])).unwrap();
///
/// let ranking = compute_aqi_ranking(&rows, "province", 15);
/// assert_eq!(ranking[0].name, "B");
/// assert_eq!(ranking[0].primary_pollutant, Some(Pollutant::Pm25));
/// ```
pub fn compute_aqi_ranking(rows: &[Row], field: &str, top_n: usize) -> Vec<RankingItem> {
    let mut groups: OrderedGroups<AqiAccumulator> = OrderedGroups::new();
    for row in rows {
        let Some(key) = row.first_text(&[field, "province", "city"]) else {
            continue;
        };
        groups.entry_or_insert_with(key, AqiAccumulator::default).add(row);
    }

    let mut items: Vec<RankingItem> = groups
        .into_vec()
        .into_iter()
        .map(|(name, acc)| RankingItem {
            name,
            aqi: round_to(acc.mean_aqi(), 1),
            primary_pollutant: modal_pollutant(&acc.votes),
        })
        .collect();

    items.sort_by(|a, b| b.aqi.partial_cmp(&a.aqi).unwrap_or(Ordering::Equal));
    items.truncate(top_n);
    items
}

/// Per-region `[aqi, pm25, pm10, so2, no2, co, o3]` means for a
/// parallel-coordinates chart, sorted by AQI descending.
///
/// With `province_filter`, only rows whose raw `province` equals it are
/// used. Pollutant means include every finite reading.
pub fn build_parallel_data(
    rows: &[Row],
    field: &str,
    top_n: usize,
    province_filter: Option<&str>,
) -> Vec<ParallelRow> {
    let mut groups: OrderedGroups<AqiAccumulator> = OrderedGroups::new();
    for row in rows {
        if let Some(filter) = province_filter {
            if row.text("province") != Some(filter) {
                continue;
            }
        }
        let Some(key) = row.first_text(&[field, "province", "city"]) else {
            continue;
        };
        let acc = groups.entry_or_insert_with(key, AqiAccumulator::default);
        acc.add(row);
        acc.add_pollutants(row);
    }

    let mut out: Vec<ParallelRow> = groups
        .into_vec()
        .into_iter()
        .map(|(name, acc)| {
            let mut values = Vec::with_capacity(7);
            values.push(round_to(acc.mean_aqi(), 2));
            values.extend(
                acc.pollutants
                    .iter()
                    .map(|&(sum, count)| round_to(mean(sum, count), 2)),
            );
            ParallelRow {
                name,
                values,
                primary_pollutant: modal_pollutant(&acc.votes),
            }
        })
        .collect();

    out.sort_by(|a, b| b.values[0].partial_cmp(&a.values[0]).unwrap_or(Ordering::Equal));
    out.truncate(top_n);
    out
}

/// Mean of each pollutant over all rows, for a radar chart. Missing values
/// count as zero; unparseable values are skipped.
pub fn compute_radial_vector(rows: &[Row]) -> Vec<RadialIndicator> {
    Pollutant::ALL
        .iter()
        .map(|p| RadialIndicator {
            indicator: p.label().to_string(),
            value: average_metric(rows, p.key(), Granularity::Day, &FieldConventions::default()),
        })
        .collect()
}

/// Mean of `field` over rows at a granularity. Missing values count as
/// zero, unparseable values are skipped, and an empty set averages to 0.
pub fn average_metric(
    rows: &[Row],
    field: &str,
    granularity: Granularity,
    conventions: &FieldConventions,
) -> f64 {
    let (sum, count) = rows
        .iter()
        .filter_map(|r| r.number_or_zero_at(field, granularity, conventions))
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    mean(sum, count)
}

/// Per-date mean of a daily field.
pub fn compute_trend_series(entries: &[DayEntry], field: &str) -> Vec<TrendPoint> {
    compute_trend_series_by_granularity(
        entries,
        field,
        Granularity::Day,
        &FieldConventions::default(),
    )
}

/// Per-entry mean of `field`, resolving aggregate field names.
pub fn compute_trend_series_by_granularity(
    entries: &[DayEntry],
    field: &str,
    granularity: Granularity,
    conventions: &FieldConventions,
) -> Vec<TrendPoint> {
    entries
        .iter()
        .map(|e| TrendPoint {
            date: e.date.clone(),
            value: average_metric(&e.data, field, granularity, conventions),
        })
        .collect()
}

// ============================================================================
// Helper Functions
// ============================================================================

pub(crate) fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
