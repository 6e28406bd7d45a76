//! # Geocoded Layers
//!
//! Turns rows into map-ready scatter points and wind segments.
//!
//! A row is placed either directly, from its own `lat`/`lon` fields (grid
//! data), or through the [`RegionIndex`] by name (station and city data).
//! Rows without a usable value or coordinate are dropped; the builders
//! count matches and failures in [`LayerStats`] so callers can spot naming
//! drift between datasets.

use crate::fields::{FieldConventions, RowExt};
use crate::geo_utils::{segment_coords, wind_segment, wind_speed};
use crate::region::{normalize_region_name, RegionCoord, RegionIndex};
use crate::{Granularity, Row};
use log::{debug, warn};
use rand::Rng;
use serde::Serialize;

/// Metric name resolved to wind speed from `u`/`v`.
pub const WIND_METRIC: &str = "wind";

/// Failed-lookup samples kept per layer build.
const FAILED_SAMPLE_LIMIT: usize = 5;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for [`build_wind_vectors`].
#[derive(Debug, Clone)]
pub struct WindVectorConfig {
    /// Row count above which the dataset is thinned.
    /// Default: 2000
    pub large_dataset_threshold: usize,

    /// Keep every n-th row of a large dataset.
    /// Default: 8
    pub large_stride: usize,

    /// Degrees per unit of wind for large datasets.
    /// Default: 0.06
    pub large_scale: f64,

    /// Degrees per unit of wind otherwise.
    /// Default: 0.3
    pub small_scale: f64,

    /// Segments slower than this are dropped.
    /// Default: 0.5
    pub min_speed: f64,
}

impl Default for WindVectorConfig {
    fn default() -> Self {
        Self {
            large_dataset_threshold: 2000,
            large_stride: 8,
            large_scale: 0.06,
            small_scale: 0.3,
            min_speed: 0.5,
        }
    }
}

/// Configuration for [`build_wind_flow`].
#[derive(Debug, Clone)]
pub struct WindFlowConfig {
    /// Degrees per unit of wind.
    /// Default: 0.3
    pub scale: f64,

    /// Jittered segments emitted per row (at least one).
    /// Default: 3
    pub density: usize,

    /// Width of the uniform jitter box in degrees, centred on the base point.
    /// Default: 0.2
    pub jitter: f64,

    /// Segments slower than this are dropped.
    /// Default: 1e-3
    pub min_speed: f64,
}

impl Default for WindFlowConfig {
    fn default() -> Self {
        Self {
            scale: 0.3,
            density: 3,
            jitter: 0.2,
            min_speed: 1e-3,
        }
    }
}

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub name: String,
    pub value: f64,
    /// `[lon, lat]`
    pub coord: [f64; 2],
}

/// One wind arrow: base point to base + scaled `(u, v)`, valued by wind
/// speed for colour mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindVector {
    /// `[[lon, lat], [lon, lat]]`
    pub coords: [[f64; 2]; 2],
    /// Wind speed
    pub value: f64,
}

/// One jittered flow line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindSegment {
    /// Region name, or `"Grid"` for rows placed by their own coordinates
    pub name: String,
    pub speed: f64,
    /// `[[lon, lat], [lon, lat]]`
    pub coords: [[f64; 2]; 2],
}

/// Match diagnostics for one layer build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStats {
    pub matched: usize,
    pub failed: usize,
    /// Rows placed on the map but without a usable value or wind components
    pub skipped: usize,
    /// Up to five `city/county/province` strings that failed to resolve
    pub failed_samples: Vec<String>,
}

impl LayerStats {
    fn record_match(&mut self) {
        self.matched += 1;
    }

    fn record_failure(&mut self, sample: impl FnOnce() -> String) {
        self.failed += 1;
        if self.failed_samples.len() < FAILED_SAMPLE_LIMIT {
            self.failed_samples.push(sample());
        }
    }

    fn record_skip(&mut self) {
        self.skipped += 1;
    }

    fn log(&self, tag: &str) {
        debug!(
            "[{}] matched {}, failed {}, skipped {}",
            tag, self.matched, self.failed, self.skipped
        );
        if !self.failed_samples.is_empty() {
            warn!(
                "[{}] {} rows without coordinates, e.g. {:?}",
                tag, self.failed, self.failed_samples
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerResult<T> {
    pub items: Vec<T>,
    pub stats: LayerStats,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Value of `metric`: wind speed for [`WIND_METRIC`], else the finite field.
fn metric_value(row: &Row, metric: &str) -> Option<f64> {
    if metric == WIND_METRIC {
        Some(wind_speed(row.number("u")?, row.number("v")?))
    } else {
        row.number(metric)
    }
}

fn name_sample(row: &Row) -> String {
    ["city", "county", "province"]
        .iter()
        .map(|f| row.text(f).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("/")
}

/// Coordinate from the row's own `lat`/`latitude` and `lon`/`longitude`.
fn direct_coord(row: &Row) -> Option<RegionCoord> {
    let lat = row.first_truthy_number(&["lat", "latitude"])?;
    let lon = row.first_truthy_number(&["lon", "longitude"])?;
    Some(RegionCoord::new(lon, lat))
}

/// Direct coordinate when present, else a Region Index lookup.
fn placement(row: &Row, index: Option<&RegionIndex>) -> Option<(String, RegionCoord)> {
    if let Some(coord) = direct_coord(row) {
        return Some(("Grid".to_string(), coord));
    }
    let found = index?.lookup_row(row)?;
    Some((normalize_region_name(&found.name).to_string(), found.coord))
}

fn segment(name: String, base: RegionCoord, u: f64, v: f64, scale: f64) -> WindSegment {
    WindSegment {
        name,
        speed: wind_speed(u, v),
        coords: segment_coords(&wind_segment(base, u, v, scale)),
    }
}

fn vector(base: RegionCoord, u: f64, v: f64, scale: f64) -> WindVector {
    WindVector {
        coords: segment_coords(&wind_segment(base, u, v, scale)),
        value: wind_speed(u, v),
    }
}

// ============================================================================
// Scatter Layers
// ============================================================================

/// Scatter points for station/city rows placed by name.
///
/// Rows whose value is missing are skipped (counted in
/// [`LayerStats::skipped`]); rows whose name does not resolve count as
/// failures. The point name is the row's own `city` (else `county`, else
/// the matched name).
///
/// ```
/// use air_quality_core::{rows_to_scatter, RegionIndex, Row};
/// use serde_json::json;
///
/// let refs: Vec<Row> = serde_json::from_value(json!([
///     {"province": "北京市", "city": "北京市", "longitude": 116.4, "latitude": 39.9}
/// ])).unwrap();
/// let index = RegionIndex::from_rows(&refs);
///
/// let rows: Vec<Row> = serde_json::from_value(json!([
///     {"city": "北京", "pm25": 42},
///     {"city": "火星", "pm25": 10},
/// ])).unwrap();
///
/// let layer = rows_to_scatter(&rows, "pm25", Some(&index));
/// assert_eq!(layer.items[0].coord, [116.4, 39.9]);
/// assert_eq!(layer.stats.failed, 1);
/// ```
pub fn rows_to_scatter(
    rows: &[Row],
    metric: &str,
    index: Option<&RegionIndex>,
) -> LayerResult<ScatterPoint> {
    let mut items = Vec::new();
    let mut stats = LayerStats::default();
    let Some(index) = index else {
        warn!("[Scatter] No region index, {} rows dropped", rows.len());
        return LayerResult { items, stats };
    };

    for row in rows {
        let Some(value) = metric_value(row, metric) else {
            stats.record_skip();
            continue;
        };
        match index.lookup_row(row) {
            Some(found) => {
                stats.record_match();
                let name = row
                    .first_text(&["city", "county"])
                    .map(str::to_string)
                    .unwrap_or(found.name);
                items.push(ScatterPoint {
                    name,
                    value,
                    coord: found.coord.to_array(),
                });
            }
            None => stats.record_failure(|| name_sample(row)),
        }
    }

    stats.log("Scatter");
    LayerResult { items, stats }
}

/// Scatter points for gridded rows carrying `lon`/`lat`.
///
/// Rows with an invalid value or coordinate count as failures. Points are
/// named `grid_<lat>_<lon>` with four decimals.
pub fn grid_to_scatter(rows: &[Row], metric: &str) -> LayerResult<ScatterPoint> {
    let mut items = Vec::new();
    let mut stats = LayerStats::default();

    for row in rows {
        let placed = metric_value(row, metric)
            .and_then(|value| Some((value, row.number("lon")?, row.number("lat")?)));
        match placed {
            Some((value, lon, lat)) => {
                stats.record_match();
                items.push(ScatterPoint {
                    name: format!("grid_{:.4}_{:.4}", lat, lon),
                    value,
                    coord: [lon, lat],
                });
            }
            None => stats.record_failure(|| {
                format!(
                    "{}/{}",
                    row.get("lat").map(|v| v.to_string()).unwrap_or_default(),
                    row.get("lon").map(|v| v.to_string()).unwrap_or_default()
                )
            }),
        }
    }

    stats.log("GridScatter");
    LayerResult { items, stats }
}

// ============================================================================
// Wind Layers
// ============================================================================

fn wind_vectors_with<F>(
    rows: &[Row],
    index: Option<&RegionIndex>,
    config: &WindVectorConfig,
    components: F,
) -> LayerResult<WindVector>
where
    F: Fn(&Row) -> Option<(f64, f64)>,
{
    let large = rows.len() > config.large_dataset_threshold;
    let (stride, scale) = if large {
        (config.large_stride.max(1), config.large_scale)
    } else {
        (1, config.small_scale)
    };

    let mut items = Vec::new();
    let mut stats = LayerStats::default();
    for row in rows.iter().step_by(stride) {
        let Some((_, base)) = placement(row, index) else {
            stats.record_failure(|| name_sample(row));
            continue;
        };
        let Some((u, v)) = components(row) else {
            stats.record_skip();
            continue;
        };
        stats.record_match();
        if wind_speed(u, v) < config.min_speed {
            continue;
        }
        items.push(vector(base, u, v, scale));
    }

    debug!(
        "[WindVectors] {} segments from {} rows (stride {})",
        items.len(),
        rows.len(),
        stride
    );
    stats.log("WindVectors");
    LayerResult { items, stats }
}

/// Wind arrows for daily rows.
///
/// Datasets above the size threshold are thinned by a stride and drawn
/// with a shorter scale.
pub fn build_wind_vectors(
    rows: &[Row],
    index: Option<&RegionIndex>,
    config: &WindVectorConfig,
) -> LayerResult<WindVector> {
    wind_vectors_with(rows, index, config, |row| {
        Some((row.number("u")?, row.number("v")?))
    })
}

/// Wind arrows for monthly aggregate rows, reading `u`/`v` through the
/// month-granularity field names.
pub fn build_monthly_wind_vectors(
    rows: &[Row],
    index: Option<&RegionIndex>,
    config: &WindVectorConfig,
    conventions: &FieldConventions,
) -> LayerResult<WindVector> {
    wind_vectors_with(rows, index, config, |row| {
        Some((
            row.number_at("u", Granularity::Month, conventions)?,
            row.number_at("v", Granularity::Month, conventions)?,
        ))
    })
}

/// Denser flow lines: each row emits `density` segments, each offset by a
/// uniform jitter so overlapping arrows separate.
///
/// # Arguments
///
/// * `rows` - Rows carrying `u`/`v` and either coordinates or a region name
/// * `index` - Region Index for rows without their own coordinates
/// * `config` - Scale, density, jitter and speed floor
/// * `rng` - Jitter source; pass a seeded RNG for reproducible output
///
/// # Returns
///
/// Flow segments plus match diagnostics. Rows that cannot be placed count
/// as failed; placed rows without both components count as skipped.
pub fn build_wind_flow<R: Rng + ?Sized>(
    rows: &[Row],
    index: Option<&RegionIndex>,
    config: &WindFlowConfig,
    rng: &mut R,
) -> LayerResult<WindSegment> {
    let density = config.density.max(1);
    let mut items = Vec::new();
    let mut stats = LayerStats::default();

    for row in rows {
        let Some((name, base)) = placement(row, index) else {
            stats.record_failure(|| name_sample(row));
            continue;
        };
        let (Some(u), Some(v)) = (row.number("u"), row.number("v")) else {
            stats.record_skip();
            continue;
        };
        stats.record_match();
        if wind_speed(u, v) < config.min_speed {
            continue;
        }
        for _ in 0..density {
            let jittered = RegionCoord::new(
                base.lon + (rng.gen::<f64>() - 0.5) * config.jitter,
                base.lat + (rng.gen::<f64>() - 0.5) * config.jitter,
            );
            items.push(segment(name.clone(), jittered, u, v, config.scale));
        }
    }

    stats.log("WindFlow");
    LayerResult { items, stats }
}
