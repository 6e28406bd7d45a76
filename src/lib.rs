//! # Air Quality Core
//!
//! AQI computation and chart-ready aggregation of air-quality observations.
//!
//! This library provides:
//! - Per-pollutant sub-indices (IAQI) and overall AQI from GB 3095-2012 breakpoints
//! - A name→coordinate Region Index tolerant of `简体|繁體` pairs and admin suffixes
//! - Granularity-aware field access for day, month and year aggregates
//! - Group-by reducers producing rankings, timelines, matrices and rollups
//! - Geocoded scatter and wind-vector layers for map rendering
//!
//! Rows come in as parsed JSON objects and every output is `Serialize`, so
//! results can be handed straight to a charting layer.
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel AQI attachment and correlation with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use air_quality_core::{compute_aqi, Pollutant, Row};
//! use serde_json::json;
//!
//! let row: Row = serde_json::from_value(json!({
//!     "province": "北京",
//!     "pm25": 40, "pm10": 60, "so2": 10, "no2": 20, "co": 1, "o3": 50
//! })).unwrap();
//!
//! let result = compute_aqi(&row);
//! assert_eq!(result.primary_pollutant, Pollutant::Pm25);
//! assert_eq!(result.aqi, 56.3);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub mod breakpoints;
pub use breakpoints::{breakpoints_for, BreakpointSegment};

pub mod aqi;
pub use aqi::{
    aqi_to_level, attach_aqi, compute_aqi, compute_aqi_for_granularity, compute_aqi_from_values,
    compute_iaqi, compute_iaqi_for_key, AqiLevel, AqiResult, IaqiEntry,
};

#[cfg(feature = "parallel")]
pub use aqi::attach_aqi_parallel;

pub mod fields;
pub use fields::{field_name_for_granularity, value_from_row, FieldConventions, RowExt, YearSuffix};

pub mod geo_utils;

pub mod region;
pub use region::{
    name_coverage_report, normalize_province, normalize_region_name, strip_suffix,
    CoverageReport, NearestRegion, RegionCoord, RegionIndex, RegionIndexCache, RegionMatch,
    RegionReference,
};

pub mod ranking;
pub use ranking::{
    average_metric, build_parallel_data, compute_aqi_ranking, compute_radial_vector,
    compute_trend_series, compute_trend_series_by_granularity, ParallelRow, RadialIndicator,
    RankingItem, TrendPoint,
};

pub mod levels;
pub use levels::{
    classify_levels, compute_level_timeline, compute_level_timeline_by_granularity, LevelBucket,
    LevelCount, LevelSeries, LevelTimeline, CONCENTRATION_BUCKETS,
};

pub mod stats;
pub use stats::{
    box_stats, compute_city_month_stats, compute_corr_matrix, compute_monthly_box_plot, pearson,
    BoxStats, CorrCell, MetricStats, MonthlyBox,
};

#[cfg(feature = "parallel")]
pub use stats::compute_corr_matrix_parallel;

pub mod pollution_type;
pub use pollution_type::{
    build_feature_scatter, build_type_scatter, classify_pollution_type,
    compute_city_type_trajectory, compute_shares, compute_type_by_region, compute_type_timeline,
    CitySeries, FeaturePoint, PollutantShares, PollutionType, RegionType, TypePoint, TypeSeries,
    TypeTimeline, TypeTrajectory,
};

pub mod timeline;
pub use timeline::{
    compute_aqi_compare_lines, compute_aqi_rain, compute_monthly_ring, compute_monthly_ring_grid,
    compute_yearly_radial, parse_date_parts, AqiRain, CompareLines, CompareSeries, DateParts,
    MonthlyRing, RingCell, RingGridRow, YearlyRadial,
};

pub mod wind;
pub use wind::{compute_wind_rose, wind_components, WindRoseBin};

pub mod layers;
pub use layers::{
    build_monthly_wind_vectors, build_wind_flow, build_wind_vectors, grid_to_scatter,
    rows_to_scatter, LayerResult, LayerStats, ScatterPoint, WindFlowConfig, WindSegment, WindVector,
    WindVectorConfig,
};

pub mod loader;
pub use loader::{
    available_dates, fetch_with_fallback, load_by_granularity, DataSource, DirSource, LoadError,
};

// ============================================================================
// Core Types
// ============================================================================

/// One observation record: a flat JSON object keyed by field name.
///
/// Name fields (`province`, `city`, `county`) may hold a `简体|繁體` pair.
/// Numeric fields may be numbers, numeric strings, `null`, or missing.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The six pollutants covered by the breakpoint table, in scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    So2,
    No2,
    Co,
    O3,
}

impl Pollutant {
    /// All pollutants in scan order. Ties in AQI selection resolve to the earliest.
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::So2,
        Pollutant::No2,
        Pollutant::Co,
        Pollutant::O3,
    ];

    /// Row field name, e.g. `"pm25"`.
    pub fn key(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::So2 => "so2",
            Pollutant::No2 => "no2",
            Pollutant::Co => "co",
            Pollutant::O3 => "o3",
        }
    }

    /// Upper-case indicator label used by radar/matrix charts, e.g. `"PM25"`.
    pub fn label(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM25",
            Pollutant::Pm10 => "PM10",
            Pollutant::So2 => "SO2",
            Pollutant::No2 => "NO2",
            Pollutant::Co => "CO",
            Pollutant::O3 => "O3",
        }
    }

    /// Position in [`Pollutant::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.key() == key)
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Time resolution of a data source. Affects field naming (see [`fields`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
    Year,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Granularity::Day),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            other => Err(LoadError::UnknownGranularity(other.to_string())),
        }
    }
}

/// All rows observed on one date (or one month/year for aggregate sources).
///
/// Reducers process entries in the order given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayEntry {
    /// ISO date, `YYYY-MM-DD`
    pub date: String,
    pub data: Vec<Row>,
}

impl DayEntry {
    pub fn new(date: impl Into<String>, data: Vec<Row>) -> Self {
        Self { date: date.into(), data }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Round to a fixed number of decimal places for display stability.
///
/// Rounding is decided on the exact binary value, not on `value * 10^places`,
/// so `50.05` (stored as `50.04999…`) rounds down. Exact halves round away
/// from zero. Non-finite values pass through unchanged.
///
/// ```
/// use air_quality_core::round_to;
/// assert_eq!(round_to(56.25, 1), 56.3);
/// assert_eq!(round_to(0.456, 2), 0.46);
/// assert_eq!(round_to(50.05, 1), 50.0);
/// ```
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let places = places.max(0);
    let scaled = value * 10f64.powi(places);
    // Only dyadic values can sit exactly on a half; for those the scaled
    // product is exact.
    let exact_half = (value * 2f64.powi(places + 1)).fract() == 0.0 && scaled.fract().abs() == 0.5;
    if exact_half {
        return scaled.round() / 10f64.powi(places);
    }
    format!("{:.*}", places as usize, value)
        .parse()
        .unwrap_or(value)
}

/// Group-by accumulator that keeps first-seen key order, the order every
/// reducer echoes into its output before any explicit sort.
#[derive(Debug)]
pub(crate) struct OrderedGroups<T> {
    index: HashMap<String, usize>,
    groups: Vec<(String, T)>,
}

impl<T> OrderedGroups<T> {
    pub(crate) fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    pub(crate) fn entry_or_insert_with(&mut self, key: &str, init: impl FnOnce() -> T) -> &mut T {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                let idx = self.groups.len();
                self.index.insert(key.to_string(), idx);
                self.groups.push((key.to_string(), init()));
                idx
            }
        };
        &mut self.groups[idx].1
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.groups.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn into_vec(self) -> Vec<(String, T)> {
        self.groups
    }
}

/// Modal vote over pollutants. Ties go to the pollutant counted first.
pub(crate) fn modal_pollutant(votes: &[(Pollutant, u32)]) -> Option<Pollutant> {
    let mut best: Option<(Pollutant, u32)> = None;
    for &(p, count) in votes {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((p, count));
        }
    }
    best.map(|(p, _)| p)
}

pub(crate) fn record_vote(votes: &mut Vec<(Pollutant, u32)>, pollutant: Pollutant) {
    match votes.iter_mut().find(|(p, _)| *p == pollutant) {
        Some((_, count)) => *count += 1,
        None => votes.push((pollutant, 1)),
    }
}

// ============================================================================
// Tests
// ============================================================================
