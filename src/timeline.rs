//! Calendar rollups: yearly radar, monthly rings, AQI rain and daily
//! year-over-year comparison lines.

use crate::aqi::{aqi_to_level, compute_aqi, AqiLevel};
use crate::fields::RowExt;
use crate::ranking::{mean, RadialIndicator};
use crate::{round_to, DayEntry, OrderedGroups, Pollutant, Row};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default number of regions in a monthly ring grid.
pub const DEFAULT_RING_GRID_TOP_N: usize = 12;

const DAYS_IN_COMPARE: usize = 31;
const MIN_SEGMENTS: f64 = 3.0;
const MAX_SEGMENTS: f64 = 24.0;
const SEGMENT_SCALE: f64 = 20.0;

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyRadial {
    /// Year as a string, e.g. `"2015"`
    pub name: String,
    pub data: Vec<RadialIndicator>,
}

/// Level × year heat grid for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AqiRain {
    pub years: Vec<i32>,
    pub levels: Vec<AqiLevel>,
    /// `[level_index, year_index, count]` triples
    pub data: Vec<[usize; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareSeries {
    pub name: String,
    /// 31 slots; `None` where the year has no data for that day
    pub data: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareLines {
    pub days: Vec<String>,
    pub series: Vec<CompareSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRing {
    /// Display label, e.g. `"1月"`
    pub name: String,
    pub data: Vec<RadialIndicator>,
    pub aqi: f64,
    pub level: AqiLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RingCell {
    pub month: u32,
    pub value: f64,
    pub aqi: f64,
    pub segments: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RingGridRow {
    pub name: String,
    pub avg_aqi: f64,
    /// Always twelve cells, January first
    pub months: Vec<RingCell>,
}

/// Running sums of positive pollutant readings plus row AQI.
#[derive(Debug, Default, Clone)]
struct PollutantSums {
    sums: [(f64, usize); 6],
    aqi: (f64, usize),
}

impl PollutantSums {
    fn add_positive(&mut self, row: &Row) {
        for p in Pollutant::ALL {
            if let Some(v) = row.positive(p.key()) {
                let slot = &mut self.sums[p.index()];
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }

    fn add_aqi(&mut self, row: &Row) {
        self.aqi.0 += compute_aqi(row).aqi;
        self.aqi.1 += 1;
    }

    fn indicators(&self) -> Vec<RadialIndicator> {
        Pollutant::ALL
            .iter()
            .map(|p| {
                let (sum, count) = self.sums[p.index()];
                RadialIndicator {
                    indicator: p.label().to_string(),
                    value: round_to(mean(sum, count), 2),
                }
            })
            .collect()
    }
}

// ============================================================================
// Date Parsing
// ============================================================================

/// Split an ISO `YYYY-MM-DD` date into numeric parts.
///
/// Exactly three `-`-separated integer parts are required.
///
/// ```
/// use air_quality_core::parse_date_parts;
///
/// let parts = parse_date_parts("2015-03-07").unwrap();
/// assert_eq!((parts.year, parts.month, parts.day), (2015, 3, 7));
/// assert!(parse_date_parts("2015-03").is_none());
/// assert!(parse_date_parts("2015-xx-07").is_none());
/// ```
pub fn parse_date_parts(date: &str) -> Option<DateParts> {
    let mut parts = date.split('-');
    let year = parts.next()?.trim().parse().ok()?;
    let month = parts.next()?.trim().parse().ok()?;
    let day = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(DateParts { year, month, day })
}

fn entries_in_month(
    entries: &[DayEntry],
    month: u32,
) -> impl Iterator<Item = (DateParts, &DayEntry)> {
    entries.iter().filter_map(move |e| {
        let parts = parse_date_parts(&e.date)?;
        (parts.month == month).then_some((parts, e))
    })
}

// ============================================================================
// Yearly / Monthly Rollups
// ============================================================================

/// Mean of positive pollutant readings per year, years ascending.
pub fn compute_yearly_radial(entries: &[DayEntry]) -> Vec<YearlyRadial> {
    let mut years: BTreeMap<i32, PollutantSums> = BTreeMap::new();
    for entry in entries {
        let Some(parts) = parse_date_parts(&entry.date) else {
            continue;
        };
        let sums = years.entry(parts.year).or_default();
        for row in &entry.data {
            sums.add_positive(row);
        }
    }

    years
        .into_iter()
        .map(|(year, sums)| YearlyRadial {
            name: year.to_string(),
            data: sums.indicators(),
        })
        .collect()
}

/// Per calendar month: positive pollutant means, mean row AQI and its
/// level. Months ascending; months with no entries are omitted.
pub fn compute_monthly_ring(entries: &[DayEntry]) -> Vec<MonthlyRing> {
    let mut months: BTreeMap<u32, PollutantSums> = BTreeMap::new();
    for entry in entries {
        let Some(parts) = parse_date_parts(&entry.date) else {
            continue;
        };
        let sums = months.entry(parts.month).or_default();
        for row in &entry.data {
            sums.add_positive(row);
            sums.add_aqi(row);
        }
    }

    months
        .into_iter()
        .map(|(month, sums)| {
            let aqi = round_to(mean(sums.aqi.0, sums.aqi.1), 1);
            MonthlyRing {
                name: format!("{}月", month),
                data: sums.indicators(),
                aqi,
                level: aqi_to_level(aqi),
            }
        })
        .collect()
}

/// Twelve-month ring per region for one pollutant.
///
/// Regions group by `province`, falling back to `city`. Regions listed in
/// `order_names` come first in that order; the rest follow by mean monthly
/// AQI descending. Each cell's `segments` scales its value against the
/// largest cell in the output, clamped to 3..=24.
pub fn compute_monthly_ring_grid(
    entries: &[DayEntry],
    pollutant: &str,
    order_names: &[String],
    top_n: usize,
) -> Vec<RingGridRow> {
    // per month: (value sum, value count, aqi sum, aqi count)
    let mut groups: OrderedGroups<[(f64, usize, f64, usize); 12]> = OrderedGroups::new();

    for entry in entries {
        let Some(parts) = parse_date_parts(&entry.date) else {
            continue;
        };
        if !(1..=12).contains(&parts.month) {
            continue;
        }
        let m = (parts.month - 1) as usize;
        for row in &entry.data {
            let Some(name) = row.first_text(&["province", "city"]) else {
                continue;
            };
            let cells = groups.entry_or_insert_with(name, Default::default);
            if let Some(v) = row.number(pollutant) {
                cells[m].0 += v;
                cells[m].1 += 1;
            }
            cells[m].2 += compute_aqi(row).aqi;
            cells[m].3 += 1;
        }
    }

    let mut rows: Vec<(String, f64, [(f64, f64); 12])> = groups
        .into_vec()
        .into_iter()
        .map(|(name, cells)| {
            let means = cells.map(|(vs, vc, as_, ac)| (mean(vs, vc), mean(as_, ac)));
            let avg_aqi = means.iter().map(|(_, a)| a).sum::<f64>() / 12.0;
            (name, avg_aqi, means)
        })
        .collect();

    let order_of = |name: &str| order_names.iter().position(|n| n == name).unwrap_or(usize::MAX);
    rows.sort_by(|a, b| {
        order_of(&a.0)
            .cmp(&order_of(&b.0))
            .then_with(|| b.1.total_cmp(&a.1))
    });
    rows.truncate(top_n);

    let global_max = rows
        .iter()
        .flat_map(|(_, _, means)| means.iter().map(|(v, _)| *v))
        .fold(1.0f64, f64::max);

    rows.into_iter()
        .map(|(name, avg_aqi, means)| RingGridRow {
            name,
            avg_aqi: round_to(avg_aqi, 1),
            months: means
                .iter()
                .enumerate()
                .map(|(i, &(value, aqi))| RingCell {
                    month: i as u32 + 1,
                    value: round_to(value, 2),
                    aqi: round_to(aqi, 1),
                    segments: segments_for(value, global_max),
                })
                .collect(),
        })
        .collect()
}

fn segments_for(value: f64, global_max: f64) -> u32 {
    let scaled = (value / global_max * SEGMENT_SCALE + 0.5).floor();
    scaled.clamp(MIN_SEGMENTS, MAX_SEGMENTS) as u32
}

// ============================================================================
// Month Views Across Years
// ============================================================================

/// Level counts of row AQI per year for one calendar month.
///
/// Years ascending; `data` holds one triple per (level, year) pair, zero
/// counts included.
pub fn compute_aqi_rain(entries: &[DayEntry], month: u32) -> AqiRain {
    let mut per_year: BTreeMap<i32, [usize; 6]> = BTreeMap::new();
    for (parts, entry) in entries_in_month(entries, month) {
        let counts = per_year.entry(parts.year).or_default();
        for row in &entry.data {
            counts[aqi_to_level(compute_aqi(row).aqi).index()] += 1;
        }
    }

    let years: Vec<i32> = per_year.keys().copied().collect();
    let mut data = Vec::with_capacity(years.len() * 6);
    for (yi, counts) in per_year.values().enumerate() {
        for (li, &count) in counts.iter().enumerate() {
            data.push([li, yi, count]);
        }
    }

    AqiRain {
        years,
        levels: AqiLevel::ALL.to_vec(),
        data,
    }
}

/// Daily mean AQI per year for one calendar month, aligned on day of
/// month. Days outside 1..=31 clamp to the nearest slot.
pub fn compute_aqi_compare_lines(entries: &[DayEntry], month: u32) -> CompareLines {
    let mut per_year: BTreeMap<i32, [(f64, usize); DAYS_IN_COMPARE]> = BTreeMap::new();
    for (parts, entry) in entries_in_month(entries, month) {
        let slots = per_year
            .entry(parts.year)
            .or_insert([(0.0, 0); DAYS_IN_COMPARE]);
        let idx = parts.day.clamp(1, DAYS_IN_COMPARE as u32) as usize - 1;
        for row in &entry.data {
            slots[idx].0 += compute_aqi(row).aqi;
            slots[idx].1 += 1;
        }
    }

    CompareLines {
        days: (1..=DAYS_IN_COMPARE).map(|d| d.to_string()).collect(),
        series: per_year
            .into_iter()
            .map(|(year, slots)| CompareSeries {
                name: year.to_string(),
                data: slots
                    .iter()
                    .map(|&(sum, count)| (count > 0).then(|| round_to(sum / count as f64, 1)))
                    .collect(),
            })
            .collect(),
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
    fn test_parse_date_parts_strict() {
        assert_eq!(
            parse_date_parts("2013-1-5"),
            Some(DateParts { year: 2013, month: 1, day: 5 })
        );
        assert!(parse_date_parts("2013-01-05-01").is_none());
        assert!(parse_date_parts("").is_none());
        assert!(parse_date_parts("2013--05").is_none());
    }

    #[test]
    fn test_yearly_radial_positive_means() {
        let entries = vec![
            DayEntry::new("2016-01-01", rows(json!([{"pm25": 10, "o3": 0}, {"pm25": 30, "o3": -5}]))),
            DayEntry::new("2015-06-01", rows(json!([{"pm25": 7}]))),
            DayEntry::new("garbage", rows(json!([{"pm25": 999}]))),
        ];
        let radial = compute_yearly_radial(&entries);
        assert_eq!(radial.len(), 2);
        assert_eq!(radial[0].name, "2015");
        assert_eq!(radial[1].data[0].value, 20.0);
        assert_eq!(radial[1].data[5].value, 0.0);
        assert_eq!(radial[1].data[5].indicator, "O3");
    }

    #[test]
    fn test_monthly_ring() {
        let entries = vec![
            DayEntry::new("2015-02-01", rows(json!([{"pm25": 75}]))),
            DayEntry::new("2016-02-01", rows(json!([{"pm25": 35}]))),
            DayEntry::new("2015-01-01", rows(json!([{"pm25": 500}]))),
        ];
        let ring = compute_monthly_ring(&entries);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring[0].name, "1月");
        assert_eq!(ring[0].level, AqiLevel::Severe);
        assert_eq!(ring[1].aqi, 75.0);
        assert_eq!(ring[1].level, AqiLevel::Good);
        assert_eq!(ring[1].data[0].value, 55.0);
    }

    #[test]
    fn test_aqi_rain_counts() {
        let entries = vec![
            DayEntry::new("2014-01-01", rows(json!([{"pm25": 10}, {"pm25": 80}]))),
            DayEntry::new("2013-01-02", rows(json!([{"pm25": 10}]))),
            DayEntry::new("2013-02-02", rows(json!([{"pm25": 10}]))),
        ];
        let rain = compute_aqi_rain(&entries, 1);
        assert_eq!(rain.years, vec![2013, 2014]);
        assert_eq!(rain.levels.len(), 6);
        assert_eq!(rain.data.len(), 12);
        assert!(rain.data.contains(&[0, 0, 1]));
        assert!(rain.data.contains(&[0, 1, 1]));
        // pm25 80 → IAQI 106.3 → 轻度
        assert!(rain.data.contains(&[2, 1, 1]));
        assert!(rain.data.contains(&[1, 1, 0]));
    }

    #[test]
    fn test_compare_lines_alignment() {
        let entries = vec![
            DayEntry::new("2015-01-01", rows(json!([{"pm25": 35}, {"pm25": 75}]))),
            DayEntry::new("2015-01-31", rows(json!([{"pm25": 10}]))),
            DayEntry::new("2016-01-00", rows(json!([{"pm25": 35}]))),
            DayEntry::new("2016-01-02", vec![]),
        ];
        let lines = compute_aqi_compare_lines(&entries, 1);
        assert_eq!(lines.days.len(), 31);
        assert_eq!(lines.days[30], "31");
        assert_eq!(lines.series.len(), 2);
        let y2015 = &lines.series[0];
        assert_eq!(y2015.name, "2015");
        assert_eq!(y2015.data[0], Some(75.0));
        assert_eq!(y2015.data[1], None);
        assert_eq!(y2015.data[30], Some(14.3));
        // day 0 clamps to the first slot, empty day stays null
        assert_eq!(lines.series[1].data[0], Some(50.0));
        assert_eq!(lines.series[1].data[1], None);
    }

    #[test]
    fn test_ring_grid_order_and_segments() {
        let entries = vec![
            DayEntry::new(
                "2015-01-01",
                rows(json!([
                    {"province": "甲", "pm25": 100},
                    {"province": "乙", "pm25": 10},
                    {"city": "丙", "pm25": 50},
                ])),
            ),
            DayEntry::new("2015-13-01", rows(json!([{"province": "甲", "pm25": 1000}]))),
        ];
        let order = vec!["乙".to_string()];
        let grid = compute_monthly_ring_grid(&entries, "pm25", &order, 12);
        let names: Vec<&str> = grid.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["乙", "甲", "丙"]);
        assert!(grid.iter().all(|r| r.months.len() == 12));

        let jia = &grid[1];
        assert_eq!(jia.months[0].value, 100.0);
        assert_eq!(jia.months[0].segments, 20);
        assert_eq!(jia.months[1].segments, 3);
        // 50 / 100 * 20 = 10
        assert_eq!(grid[2].months[0].segments, 10);

        let top1 = compute_monthly_ring_grid(&entries, "pm25", &[], 1);
        assert_eq!(top1.len(), 1);
        assert_eq!(top1[0].name, "甲");
    }

    #[test]
    fn test_segments_clamp() {
        assert_eq!(segments_for(0.0, 1.0), 3);
        assert_eq!(segments_for(10.0, 1.0), 24);
        assert_eq!(segments_for(0.5, 1.0), 10);
    }
}
