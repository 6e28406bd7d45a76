//! Pollution-type classification.
//!
//! A region's type is decided by which pollutant dominates its mean
//! concentration mix. No pollutant holding at least 30% of the total
//! means a mixed, "standard" profile.

use crate::fields::RowExt;
use crate::region::normalize_region_name;
use crate::timeline::parse_date_parts;
use crate::{round_to, DayEntry, OrderedGroups, Pollutant, Row};
use serde::Serialize;

/// Minimum top share for a pollutant to define the type.
pub const DOMINANT_SHARE: f64 = 0.3;

/// Type order used by the city trajectory chart. Types not listed map to
/// index `TRAJECTORY_TYPE_ORDER.len()`.
pub const TRAJECTORY_TYPE_ORDER: [&str; 8] = [
    "偏燃烧型",
    "偏钢铁型",
    "偏机动车型",
    "其他型",
    "标准型",
    "偏氮氧化型",
    "偏二次型",
    "偏沙尘型",
];

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PollutionType {
    #[serde(rename = "未知")]
    Unknown,
    /// No single pollutant dominates
    #[serde(rename = "标准型")]
    Standard,
    /// Ozone-led, secondary photochemical pollution
    #[serde(rename = "偏二次型")]
    Secondary,
    #[serde(rename = "偏燃煤型")]
    Coal,
    #[serde(rename = "偏交通型")]
    Traffic,
    #[serde(rename = "偏燃烧型")]
    Combustion,
    #[serde(rename = "偏颗粒物型")]
    Particulate,
}

impl PollutionType {
    pub fn name(&self) -> &'static str {
        match self {
            PollutionType::Unknown => "未知",
            PollutionType::Standard => "标准型",
            PollutionType::Secondary => "偏二次型",
            PollutionType::Coal => "偏燃煤型",
            PollutionType::Traffic => "偏交通型",
            PollutionType::Combustion => "偏燃烧型",
            PollutionType::Particulate => "偏颗粒物型",
        }
    }

    fn for_dominant(pollutant: Pollutant) -> Self {
        match pollutant {
            Pollutant::O3 => PollutionType::Secondary,
            Pollutant::So2 => PollutionType::Coal,
            Pollutant::No2 => PollutionType::Traffic,
            Pollutant::Co => PollutionType::Combustion,
            Pollutant::Pm25 | Pollutant::Pm10 => PollutionType::Particulate,
        }
    }

    /// Position in [`TRAJECTORY_TYPE_ORDER`], or its length when absent.
    pub fn trajectory_index(&self) -> usize {
        TRAJECTORY_TYPE_ORDER
            .iter()
            .position(|t| *t == self.name())
            .unwrap_or(TRAJECTORY_TYPE_ORDER.len())
    }
}

/// Each pollutant's fraction of the summed mean concentrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PollutantShares {
    pub pm25: f64,
    pub pm10: f64,
    pub so2: f64,
    pub no2: f64,
    pub co: f64,
    pub o3: f64,
}

impl PollutantShares {
    pub fn get(&self, pollutant: Pollutant) -> f64 {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::So2 => self.so2,
            Pollutant::No2 => self.no2,
            Pollutant::Co => self.co,
            Pollutant::O3 => self.o3,
        }
    }

    /// `(pollutant, share)` pairs in scan order.
    pub fn pairs(&self) -> [(Pollutant, f64); 6] {
        Pollutant::ALL.map(|p| (p, self.get(p)))
    }

    /// Combined PM2.5 and PM10 share.
    pub fn particles(&self) -> f64 {
        self.pm25 + self.pm10
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionType {
    pub name: String,
    #[serde(rename = "type")]
    pub pollution_type: PollutionType,
    pub primary: Option<Pollutant>,
    pub shares: PollutantShares,
}

/// Share-space scatter point: particles vs ozone, sized by the combined
/// share of the type-defining pollutants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypePoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    #[serde(rename = "type")]
    pub pollution_type: PollutionType,
}

/// Two-feature projection used by the clustering view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeaturePoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub cluster: PollutionType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSeries {
    pub name: PollutionType,
    pub data: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeTimeline {
    pub dates: Vec<String>,
    /// A series starts at the first date its type appears
    pub series: Vec<TypeSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitySeries {
    pub name: String,
    /// Trajectory type index per date, from the first date the city appears
    pub data: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTrajectory {
    pub dates: Vec<String>,
    pub type_order: Vec<&'static str>,
    pub series: Vec<CitySeries>,
}

// ============================================================================
// Classification
// ============================================================================

/// Shares of each mean concentration in the total. Non-positive means
/// contribute nothing; a zero total gives all-zero shares.
pub fn compute_shares(means: &[f64; 6]) -> PollutantShares {
    let positive = means.map(|v| if v > 0.0 { v } else { 0.0 });
    let total: f64 = positive.iter().sum();
    let share = |p: Pollutant| {
        if total > 0.0 {
            positive[p.index()] / total
        } else {
            0.0
        }
    };
    PollutantShares {
        pm25: share(Pollutant::Pm25),
        pm10: share(Pollutant::Pm10),
        so2: share(Pollutant::So2),
        no2: share(Pollutant::No2),
        co: share(Pollutant::Co),
        o3: share(Pollutant::O3),
    }
}

/// Type and dominant pollutant from `(pollutant, share)` pairs.
///
/// Pairs are ranked by share, ties keeping input order. An empty slice is
/// [`PollutionType::Unknown`].
///
/// ```
/// use air_quality_core::{classify_pollution_type, compute_shares, Pollutant, PollutionType};
///
/// let shares = compute_shares(&[10.0, 10.0, 5.0, 5.0, 1.0, 69.0]);
/// let (kind, primary) = classify_pollution_type(&shares.pairs());
/// assert_eq!(kind, PollutionType::Secondary);
/// assert_eq!(primary, Some(Pollutant::O3));
/// ```
pub fn classify_pollution_type(shares: &[(Pollutant, f64)]) -> (PollutionType, Option<Pollutant>) {
    let mut ranked = shares.to_vec();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let Some(&(primary, ratio)) = ranked.first() else {
        return (PollutionType::Unknown, None);
    };
    if ratio < DOMINANT_SHARE {
        return (PollutionType::Standard, Some(primary));
    }
    (PollutionType::for_dominant(primary), Some(primary))
}

/// Classify `(region key, row)` pairs grouped by key.
fn classify_keyed<'a, I>(rows: I) -> Vec<RegionType>
where
    I: IntoIterator<Item = (&'a str, &'a Row)>,
{
    // positive sums per pollutant, plus row count
    let mut groups: OrderedGroups<([f64; 6], usize)> = OrderedGroups::new();
    for (key, row) in rows {
        let acc = groups.entry_or_insert_with(key, Default::default);
        for p in Pollutant::ALL {
            if let Some(v) = row.positive(p.key()) {
                acc.0[p.index()] += v;
            }
        }
        acc.1 += 1;
    }

    groups
        .into_vec()
        .into_iter()
        .map(|(name, (sums, count))| {
            let means = sums.map(|s| if count > 0 { s / count as f64 } else { 0.0 });
            let shares = compute_shares(&means);
            let (pollution_type, primary) = classify_pollution_type(&shares.pairs());
            RegionType {
                name,
                pollution_type,
                primary,
                shares,
            }
        })
        .collect()
}

fn keyed_by<'a>(
    rows: impl IntoIterator<Item = &'a Row>,
    field: &'a str,
) -> impl Iterator<Item = (&'a str, &'a Row)> {
    rows.into_iter()
        .filter_map(move |r| Some((r.first_text(&[field, "city", "province"])?, r)))
}

/// Pollution type per region, in first-seen order.
///
/// Rows group by `field`, falling back to `city` then `province`. Every row
/// counts toward the mean; only positive readings add to the sums.
pub fn compute_type_by_region(rows: &[Row], field: &str) -> Vec<RegionType> {
    classify_keyed(keyed_by(rows, field))
}

/// Share-space scatter of [`compute_type_by_region`], three decimals.
pub fn build_type_scatter(rows: &[Row], field: &str) -> Vec<TypePoint> {
    compute_type_by_region(rows, field)
        .into_iter()
        .map(|r| TypePoint {
            x: round_to(r.shares.particles(), 3),
            y: round_to(r.shares.o3, 3),
            size: round_to(r.shares.so2 + r.shares.o3 + r.shares.particles(), 3),
            pollution_type: r.pollution_type,
            name: r.name,
        })
        .collect()
}

/// Feature projection of [`compute_type_by_region`]:
/// `x = particles - o3`, `y = o3 - (co + so2)`, three decimals.
pub fn build_feature_scatter(rows: &[Row], field: &str) -> Vec<FeaturePoint> {
    compute_type_by_region(rows, field)
        .into_iter()
        .map(|r| {
            let s = r.shares;
            FeaturePoint {
                x: round_to(s.particles() - s.o3, 3),
                y: round_to(s.o3 - (s.co + s.so2), 3),
                cluster: r.pollution_type,
                name: r.name,
            }
        })
        .collect()
}

// ============================================================================
// Type Over Time
// ============================================================================

/// Normalized `city`, else normalized `province`.
fn in_province(row: &Row, province_filter: Option<&str>) -> bool {
    match province_filter {
        Some(filter) => row.first_text(&["province", "city"]) == Some(filter),
        None => true,
    }
}

/// Number of regions of each type per date.
///
/// Regions group by `field` (falling back to `city` then `province`),
/// optionally restricted to rows whose `province` (or `city`) equals
/// `province_filter`. Series are created in first-seen order.
pub fn compute_type_timeline(
    entries: &[DayEntry],
    field: &str,
    province_filter: Option<&str>,
) -> TypeTimeline {
    let mut series: Vec<TypeSeries> = Vec::new();

    for entry in entries {
        let rows = entry.data.iter().filter(|r| in_province(r, province_filter));
        let mut counts: Vec<(PollutionType, u32)> = Vec::new();
        for region in classify_keyed(keyed_by(rows, field)) {
            match counts.iter_mut().find(|(t, _)| *t == region.pollution_type) {
                Some((_, c)) => *c += 1,
                None => counts.push((region.pollution_type, 1)),
            }
        }

        for (t, _) in &counts {
            if !series.iter().any(|s| s.name == *t) {
                series.push(TypeSeries {
                    name: *t,
                    data: Vec::new(),
                });
            }
        }
        for s in series.iter_mut() {
            let count = counts
                .iter()
                .find(|(t, _)| *t == s.name)
                .map_or(0, |(_, c)| *c);
            s.data.push(count);
        }
    }

    TypeTimeline {
        dates: entries.iter().map(|e| e.date.clone()).collect(),
        series,
    }
}

/// Per-city trajectory of type indices over the days of a month.
///
/// Rows are classified per raw `city` value (falling back to `province`),
/// then keyed by normalized name; when two raw spellings normalize to the
/// same city on one date, the one classified later decides. Entries with
/// unparseable dates, or outside `month_filter` when given, are skipped. A
/// city absent on a date reports index 8.
pub fn compute_city_type_trajectory(
    entries: &[DayEntry],
    province_filter: Option<&str>,
    month_filter: Option<u32>,
) -> TypeTrajectory {
    let mut dates = Vec::new();
    let mut cities: OrderedGroups<Vec<usize>> = OrderedGroups::new();

    for entry in entries {
        let Some(parts) = parse_date_parts(&entry.date) else {
            continue;
        };
        if month_filter.map_or(false, |m| parts.month != m) {
            continue;
        }
        dates.push(entry.date.clone());

        let rows = entry.data.iter().filter(|r| in_province(r, province_filter));
        let classified = classify_keyed(keyed_by(rows, "city"));

        // Raw keys that normalize alike collapse; the later group's type wins
        let mut types: Vec<(&str, PollutionType)> = Vec::new();
        for region in &classified {
            let name = normalize_region_name(&region.name);
            match types.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = region.pollution_type,
                None => types.push((name, region.pollution_type)),
            }
        }

        for (name, _) in &types {
            cities.entry_or_insert_with(name, Vec::new);
        }
        for (name, data) in cities.iter_mut() {
            let idx = types
                .iter()
                .find(|(n, _)| *n == name)
                .map_or(TRAJECTORY_TYPE_ORDER.len(), |(_, t)| t.trajectory_index());
            data.push(idx);
        }
    }

    TypeTrajectory {
        dates,
        type_order: TRAJECTORY_TYPE_ORDER.to_vec(),
        series: cities
            .into_vec()
            .into_iter()
            .map(|(name, data)| CitySeries { name, data })
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

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_compute_shares() {
        let shares = compute_shares(&[50.0, 50.0, -3.0, 0.0, 0.0, 100.0]);
        assert_eq!(shares.pm25, 0.25);
        assert_eq!(shares.so2, 0.0);
        assert_eq!(shares.o3, 0.5);

        let zero = compute_shares(&[0.0; 6]);
        assert_eq!(zero, PollutantShares::default());
    }

    #[test]
    fn test_classify_archetypes() {
        let cases = [
            ([0.0, 0.0, 90.0, 5.0, 5.0, 0.0], PollutionType::Coal),
            ([0.0, 0.0, 5.0, 90.0, 5.0, 0.0], PollutionType::Traffic),
            ([0.0, 0.0, 5.0, 5.0, 90.0, 0.0], PollutionType::Combustion),
            ([10.0, 80.0, 5.0, 5.0, 0.0, 0.0], PollutionType::Particulate),
        ];
        for (means, expected) in cases {
            let (kind, _) = classify_pollution_type(&compute_shares(&means).pairs());
            assert_eq!(kind, expected);
        }
    }

    #[test]
    fn test_classify_standard_and_unknown() {
        let (kind, primary) =
            classify_pollution_type(&compute_shares(&[20.0, 20.0, 15.0, 15.0, 15.0, 15.0]).pairs());
        assert_eq!(kind, PollutionType::Standard);
        assert_eq!(primary, Some(Pollutant::Pm25));

        // all-zero shares rank pm25 first with ratio 0
        let (kind, _) = classify_pollution_type(&PollutantShares::default().pairs());
        assert_eq!(kind, PollutionType::Standard);

        assert_eq!(classify_pollution_type(&[]), (PollutionType::Unknown, None));
    }

    #[test]
    fn test_type_by_region_counts_every_row() {
        let data = rows(json!([
            {"city": "A", "o3": 100, "pm25": 0},
            {"city": "A", "o3": -1, "pm25": 20},
            {"province": "P", "so2": 30},
            {"pm25": 10},
        ]));
        let regions = compute_type_by_region(&data, "city");
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name, "A");
        // means: o3 50, pm25 10
        assert!(approx_eq(regions[0].shares.o3, 50.0 / 60.0, 1e-12));
        assert_eq!(regions[0].pollution_type, PollutionType::Secondary);
        assert_eq!(regions[1].name, "P");
        assert_eq!(regions[1].pollution_type, PollutionType::Coal);

        let json = serde_json::to_value(&regions[1]).unwrap();
        assert_eq!(json["type"], json!("偏燃煤型"));
        assert_eq!(json["primary"], json!("so2"));
    }

    #[test]
    fn test_type_and_feature_scatter() {
        let data = rows(json!([{"city": "A", "pm25": 30, "pm10": 30, "o3": 20, "so2": 10, "co": 10}]));
        let points = build_type_scatter(&data, "city");
        assert_eq!(points[0].x, 0.6);
        assert_eq!(points[0].y, 0.2);
        assert_eq!(points[0].size, 0.9);
        assert_eq!(points[0].pollution_type, PollutionType::Particulate);

        let features = build_feature_scatter(&data, "city");
        assert_eq!(features[0].x, 0.4);
        assert_eq!(features[0].y, 0.0);
    }

    #[test]
    fn test_type_timeline_series_start_late() {
        let entries = vec![
            DayEntry::new("d1", rows(json!([{"city": "A", "o3": 100}, {"city": "B", "o3": 80}]))),
            DayEntry::new("d2", rows(json!([{"city": "A", "so2": 100}, {"city": "B", "o3": 80}]))),
            DayEntry::new("d3", rows(json!([{"city": "C", "o3": 10, "province": "X"}]))),
        ];
        let timeline = compute_type_timeline(&entries, "city", None);
        assert_eq!(timeline.dates.len(), 3);
        assert_eq!(timeline.series[0].name, PollutionType::Secondary);
        assert_eq!(timeline.series[0].data, vec![2, 1, 1]);
        assert_eq!(timeline.series[1].name, PollutionType::Coal);
        assert_eq!(timeline.series[1].data, vec![1, 0]);

        let filtered = compute_type_timeline(&entries, "city", Some("X"));
        assert_eq!(filtered.series.len(), 1);
        assert_eq!(filtered.series[0].data, vec![1]);
    }

    #[test]
    fn test_city_type_trajectory() {
        let entries = vec![
            DayEntry::new("2015-01-01", rows(json!([{"city": "甲市|甲市", "co": 10}]))),
            DayEntry::new("2015-01-02", rows(json!([
                {"city": "甲市", "o3": 10},
                {"city": "乙市", "pm25": 10},
            ]))),
            DayEntry::new("2015-02-01", rows(json!([{"city": "甲市", "co": 10}]))),
            DayEntry::new("bad-date", rows(json!([{"city": "甲市", "co": 10}]))),
        ];
        let traj = compute_city_type_trajectory(&entries, None, Some(1));
        assert_eq!(traj.dates, vec!["2015-01-01", "2015-01-02"]);
        assert_eq!(traj.type_order.len(), 8);
        assert_eq!(traj.series[0].name, "甲市");
        // 偏燃烧型 then 偏二次型
        assert_eq!(traj.series[0].data, vec![0, 6]);
        // 偏颗粒物型 is not in the trajectory order
        assert_eq!(traj.series[1].data, vec![8]);

        let all = compute_city_type_trajectory(&entries, None, None);
        assert_eq!(all.dates.len(), 3);
    }

    #[test]
    fn test_city_trajectory_groups_raw_names_before_normalizing() {
        // Same city under two raw spellings on one day: each spelling is
        // classified alone and the later one sets the day's type.
        let entries = vec![DayEntry::new(
            "2015-03-01",
            rows(json!([
                {"city": "甲市|甲市", "co": 10},
                {"city": "甲市", "o3": 10},
                {"city": "甲市|甲市", "co": 10},
            ])),
        )];
        let traj = compute_city_type_trajectory(&entries, None, None);
        assert_eq!(traj.series.len(), 1);
        assert_eq!(traj.series[0].name, "甲市");
        assert_eq!(traj.series[0].data, vec![6]);
    }

    #[test]
    fn test_trajectory_index() {
        assert_eq!(PollutionType::Combustion.trajectory_index(), 0);
        assert_eq!(PollutionType::Standard.trajectory_index(), 4);
        assert_eq!(PollutionType::Traffic.trajectory_index(), 8);
    }
}
