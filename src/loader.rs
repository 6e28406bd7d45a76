//! # Data Loading
//!
//! Path conventions for the day/month/year observation files and a small
//! [`DataSource`] abstraction to read them through.
//!
//! ```text
//! /data/index.json                               years
//! /data/<Y>/index.json                           days of a year
//! /data/<Y>/<MM>/<DD>/<YYYYMMDD>.json            one day of rows
//! /data/<Y>/monthly/index.json                   months of a year
//! /data/<Y>/monthly/<YYYYMM>_monthly.json        one month of aggregates
//! /data/<Y>/yearly/<Y>_yearly.json               one year of aggregates
//! /data/grid/<Y>/<MM>/<DD>/<YYYYMMDD>.json       one day of gridded rows
//! ```
//!
//! Files were published under slightly different month layouts over time
//! (`01` vs `1`, some days filed under January), so day loads try a list of
//! candidate paths in order and take the first that parses.

use crate::region::RegionIndex;
use crate::{Granularity, Row};
use log::{debug, info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Index of available years.
pub const YEARS_INDEX_PATH: &str = "/data/index.json";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown granularity: {0}")]
    UnknownGranularity(String),

    #[error("{0} granularity requires a date")]
    MissingDate(Granularity),

    #[error("all candidate paths failed: {}", .paths.join(", "))]
    AllPathsFailed { paths: Vec<String> },

    #[error("{path}: expected {expected}")]
    UnexpectedShape { path: String, expected: &'static str },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Data Sources
// ============================================================================

/// Anything that can resolve a data path to parsed JSON.
pub trait DataSource {
    fn fetch_json(&self, path: &str) -> Result<Value, LoadError>;
}

/// Reads `<root>/<path>` from the local filesystem.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DataSource for DirSource {
    fn fetch_json(&self, path: &str) -> Result<Value, LoadError> {
        let full = self.root.join(path.trim_start_matches('/'));
        let text = std::fs::read_to_string(&full).map_err(|source| LoadError::Io {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| LoadError::Json {
            path: path.to_string(),
            source,
        })
    }
}

/// Try each path in order; the first successful fetch wins.
pub fn fetch_with_fallback<S: DataSource + ?Sized>(
    source: &S,
    paths: &[String],
) -> Result<Value, LoadError> {
    let start = Instant::now();
    for path in paths {
        match source.fetch_json(path) {
            Ok(value) => {
                debug!("[Loader] {} loaded in {:?}", path, start.elapsed());
                return Ok(value);
            }
            Err(e) => debug!("[Loader] {} failed: {}", path, e),
        }
    }
    warn!("[Loader] All {} candidate paths failed", paths.len());
    Err(LoadError::AllPathsFailed {
        paths: paths.to_vec(),
    })
}

// ============================================================================
// Path Conventions
// ============================================================================

/// `(year, zero-padded month, unpadded month, day, YYYYMMDD)` of an ISO date.
fn date_segments(date: &str) -> Option<(String, String, String, String, String)> {
    let clean: String = date.chars().filter(|c| *c != '-').collect();
    if clean.len() < 8 || !clean.is_ascii() {
        return None;
    }
    let year = clean.get(0..4)?.to_string();
    let month = clean.get(4..6)?.to_string();
    let day = clean.get(6..8)?.to_string();
    let month_raw = month
        .parse::<u32>()
        .map(|m| m.to_string())
        .unwrap_or_else(|_| month.clone());
    let compact = clean.get(0..8)?.to_string();
    Some((year, month, month_raw, day, compact))
}

fn push_unique(paths: &mut Vec<String>, path: String) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}

/// Candidate paths for one day of rows, most likely first. Empty for a
/// malformed date.
///
/// ```
/// use air_quality_core::loader::day_paths;
///
/// let paths = day_paths("2015-03-07");
/// assert_eq!(paths[0], "/data/2015/03/07/20150307.json");
/// assert_eq!(paths[1], "/data/2015/3/07/20150307.json");
/// ```
pub fn day_paths(date: &str) -> Vec<String> {
    let Some((year, month, month_raw, day, compact)) = date_segments(date) else {
        return Vec::new();
    };
    let mut paths = Vec::with_capacity(4);
    for m in [month.as_str(), month_raw.as_str(), "01", "1"] {
        push_unique(&mut paths, format!("/data/{}/{}/{}/{}.json", year, m, day, compact));
    }
    paths
}

/// Path of one day of gridded rows.
pub fn grid_day_path(date: &str) -> Option<String> {
    let (year, month, _, day, compact) = date_segments(date)?;
    Some(format!("/data/grid/{}/{}/{}/{}.json", year, month, day, compact))
}

/// Candidate paths for a year's day index.
pub fn day_index_paths(year: i32) -> Vec<String> {
    vec![
        format!("/data/{}/index.json", year),
        format!("/data/{}/01/index.json", year),
        format!("/data/{}/1/index.json", year),
    ]
}

/// Path of one month of aggregates, from `YYYY-MM`.
pub fn month_path(year_month: &str) -> Option<String> {
    let year = year_month.get(0..4)?;
    let month = year_month.get(5..7)?;
    Some(format!("/data/{}/monthly/{}{}_monthly.json", year, year, month))
}

pub fn month_index_path(year: i32) -> String {
    format!("/data/{}/monthly/index.json", year)
}

pub fn year_path(year: i32) -> String {
    format!("/data/{}/yearly/{}_yearly.json", year, year)
}

// ============================================================================
// Loading
// ============================================================================

/// Rows of a JSON array; non-object elements are skipped. Anything other
/// than an array yields no rows.
pub fn rows_from_value(value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// String list under `key`, or the value itself when it is a bare array.
fn string_list(value: &Value, key: &str) -> Option<Vec<String>> {
    let list = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.get(key)?.as_array()?,
        _ => return None,
    };
    Some(
        list.iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
    )
}

/// Rows for one day. Unavailable days load as empty.
pub fn load_one_day<S: DataSource + ?Sized>(source: &S, date: &str) -> Vec<Row> {
    let paths = day_paths(date);
    match fetch_with_fallback(source, &paths) {
        Ok(value) => rows_from_value(value),
        Err(e) => {
            warn!("[Loader] Day {} unavailable: {}", date, e);
            Vec::new()
        }
    }
}

/// Gridded rows for one day. Unavailable days load as empty.
pub fn load_grid_day<S: DataSource + ?Sized>(source: &S, date: &str) -> Vec<Row> {
    let Some(path) = grid_day_path(date) else {
        warn!("[Loader] Malformed grid date {}", date);
        return Vec::new();
    };
    match source.fetch_json(&path) {
        Ok(value) => rows_from_value(value),
        Err(e) => {
            warn!("[Loader] Grid day {} unavailable: {}", date, e);
            Vec::new()
        }
    }
}

/// Aggregate rows for one `YYYY-MM` month. Unavailable months load as empty.
pub fn load_one_month<S: DataSource + ?Sized>(source: &S, year_month: &str) -> Vec<Row> {
    let Some(path) = month_path(year_month) else {
        warn!("[Loader] Malformed month {}", year_month);
        return Vec::new();
    };
    match source.fetch_json(&path) {
        Ok(value) => rows_from_value(value),
        Err(e) => {
            warn!("[Loader] Month {} unavailable: {}", year_month, e);
            Vec::new()
        }
    }
}

/// Aggregate rows for one year.
pub fn load_one_year<S: DataSource + ?Sized>(source: &S, year: i32) -> Result<Vec<Row>, LoadError> {
    let value = source.fetch_json(&year_path(year))?;
    Ok(rows_from_value(value))
}

/// Load rows at a granularity named by string (`"day"`, `"month"`, `"year"`).
///
/// Day and month loads require `date` (`YYYY-MM-DD` / `YYYY-MM`); year
/// loads ignore it.
pub fn load_by_granularity<S: DataSource + ?Sized>(
    source: &S,
    granularity: &str,
    year: i32,
    date: Option<&str>,
) -> Result<Vec<Row>, LoadError> {
    let granularity: Granularity = granularity.parse()?;
    match granularity {
        Granularity::Day => {
            let date = date.ok_or(LoadError::MissingDate(granularity))?;
            Ok(load_one_day(source, date))
        }
        Granularity::Month => {
            let date = date.ok_or(LoadError::MissingDate(granularity))?;
            Ok(load_one_month(source, date))
        }
        Granularity::Year => load_one_year(source, year),
    }
}

/// Dates available at a granularity for one year.
///
/// Missing indexes fall back to January 1st for days and all twelve months
/// for months.
pub fn available_dates<S: DataSource + ?Sized>(
    source: &S,
    granularity: Granularity,
    year: i32,
) -> Vec<String> {
    match granularity {
        Granularity::Day => fetch_with_fallback(source, &day_index_paths(year))
            .ok()
            .and_then(|v| string_list(&v, "days"))
            .unwrap_or_else(|| vec![format!("{}-01-01", year)]),
        Granularity::Month => source
            .fetch_json(&month_index_path(year))
            .ok()
            .and_then(|v| string_list(&v, "months"))
            .unwrap_or_else(|| (1..=12).map(|m| format!("{}-{:02}", year, m)).collect()),
        Granularity::Year => vec![year.to_string()],
    }
}

/// Years with data: the top-level index when present, else the
/// `candidates` whose day index loads.
pub fn load_available_years<S: DataSource + ?Sized>(source: &S, candidates: &[i32]) -> Vec<i32> {
    if let Some(years) = source
        .fetch_json(YEARS_INDEX_PATH)
        .ok()
        .and_then(|v| string_list(&v, "years"))
    {
        let mut years: Vec<i32> = years.iter().filter_map(|y| y.parse().ok()).collect();
        years.sort_unstable();
        years.dedup();
        return years;
    }

    candidates
        .iter()
        .copied()
        .filter(|&y| fetch_with_fallback(source, &day_index_paths(y)).is_ok())
        .collect()
}

/// Build a [`RegionIndex`] from a reference list stored as a JSON array.
pub fn load_region_index<S: DataSource + ?Sized>(
    source: &S,
    path: &str,
) -> Result<RegionIndex, LoadError> {
    let value = source.fetch_json(path)?;
    if !value.is_array() {
        return Err(LoadError::UnexpectedShape {
            path: path.to_string(),
            expected: "an array of region entries",
        });
    }
    let rows = rows_from_value(value);
    info!("[Loader] {} region reference entries from {}", rows.len(), path);
    Ok(RegionIndex::from_rows(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::fs;

    /// In-memory source keyed by path.
    struct MemorySource(HashMap<String, Value>);

    impl MemorySource {
        fn new(files: &[(&str, Value)]) -> Self {
            Self(
                files
                    .iter()
                    .map(|(p, v)| (p.to_string(), v.clone()))
                    .collect(),
            )
        }
    }

    impl DataSource for MemorySource {
        fn fetch_json(&self, path: &str) -> Result<Value, LoadError> {
            self.0.get(path).cloned().ok_or_else(|| LoadError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            })
        }
    }

    #[test]
    fn test_day_paths_dedupe() {
        let paths = day_paths("2014-01-05");
        assert_eq!(
            paths,
            vec![
                "/data/2014/01/05/20140105.json".to_string(),
                "/data/2014/1/05/20140105.json".to_string(),
            ]
        );
        assert_eq!(day_paths("2014-11-05").len(), 3);
        assert!(day_paths("2014-1").is_empty());
    }

    #[test]
    fn test_other_paths() {
        assert_eq!(
            month_path("2016-07").as_deref(),
            Some("/data/2016/monthly/201607_monthly.json")
        );
        assert_eq!(month_path("2016"), None);
        assert_eq!(year_path(2016), "/data/2016/yearly/2016_yearly.json");
        assert_eq!(month_index_path(2016), "/data/2016/monthly/index.json");
        assert_eq!(
            grid_day_path("2016-07-01").as_deref(),
            Some("/data/grid/2016/07/01/20160701.json")
        );
        assert_eq!(day_index_paths(2016)[0], "/data/2016/index.json");
    }

    #[test]
    fn test_fallback_takes_first_success() {
        let source = MemorySource::new(&[("/data/2015/3/07/20150307.json", json!([{"pm25": 1}]))]);
        let rows = load_one_day(&source, "2015-03-07");
        assert_eq!(rows.len(), 1);

        let err = fetch_with_fallback(&source, &day_paths("2015-03-08")).unwrap_err();
        match err {
            LoadError::AllPathsFailed { paths } => assert_eq!(paths.len(), 4),
            other => panic!("unexpected error: {other}"),
        }
        assert!(load_one_day(&source, "2015-03-08").is_empty());
    }

    #[test]
    fn test_rows_from_value_skips_non_objects() {
        let rows = rows_from_value(json!([{"a": 1}, 2, "x", {"b": 2}]));
        assert_eq!(rows.len(), 2);
        assert!(rows_from_value(json!({"a": 1})).is_empty());
    }

    #[test]
    fn test_load_by_granularity_dispatch() {
        let source = MemorySource::new(&[
            ("/data/2015/monthly/201502_monthly.json", json!([{"pm25_mean": 3}])),
            ("/data/2015/yearly/2015_yearly.json", json!([{"a": 1}, {"a": 2}])),
        ]);
        assert_eq!(load_by_granularity(&source, "month", 2015, Some("2015-02")).unwrap().len(), 1);
        assert_eq!(load_by_granularity(&source, "year", 2015, None).unwrap().len(), 2);
        assert!(load_by_granularity(&source, "day", 2015, Some("2015-02-01")).unwrap().is_empty());

        assert!(matches!(
            load_by_granularity(&source, "hour", 2015, None),
            Err(LoadError::UnknownGranularity(_))
        ));
        assert!(matches!(
            load_by_granularity(&source, "day", 2015, None),
            Err(LoadError::MissingDate(Granularity::Day))
        ));
        assert!(load_by_granularity(&source, "year", 2016, None).is_err());
    }

    #[test]
    fn test_available_dates_defaults() {
        let empty = MemorySource::new(&[]);
        assert_eq!(available_dates(&empty, Granularity::Day, 2015), vec!["2015-01-01"]);
        let months = available_dates(&empty, Granularity::Month, 2015);
        assert_eq!(months.len(), 12);
        assert_eq!(months[11], "2015-12");
        assert_eq!(available_dates(&empty, Granularity::Year, 2015), vec!["2015"]);

        let source = MemorySource::new(&[
            ("/data/2015/1/index.json", json!({"days": ["2015-01-02", "2015-01-03"]})),
            ("/data/2015/monthly/index.json", json!(["2015-01"])),
        ]);
        assert_eq!(available_dates(&source, Granularity::Day, 2015).len(), 2);
        assert_eq!(available_dates(&source, Granularity::Month, 2015), vec!["2015-01"]);
    }

    #[test]
    fn test_available_years() {
        let indexed = MemorySource::new(&[(YEARS_INDEX_PATH, json!({"years": [2016, 2014, "2015"]}))]);
        assert_eq!(load_available_years(&indexed, &[]), vec![2014, 2015, 2016]);

        let source = MemorySource::new(&[("/data/2014/index.json", json!({"days": []}))]);
        assert_eq!(load_available_years(&source, &[2013, 2014]), vec![2014]);
    }

    #[test]
    fn test_dir_source_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let day_dir = dir.path().join("data/2015/01/02");
        fs::create_dir_all(&day_dir).unwrap();
        fs::write(day_dir.join("20150102.json"), r#"[{"city": "北京", "pm25": 80}]"#).unwrap();
        fs::write(dir.path().join("regions.json"), r#"[{"city": "北京市", "lon": 116.4, "lat": 39.9}]"#)
            .unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let source = DirSource::new(dir.path());
        let rows = load_one_day(&source, "2015-01-02");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["city"], json!("北京"));

        let index = load_region_index(&source, "/regions.json").unwrap();
        assert!(index.contains("北京"));

        assert!(matches!(
            source.fetch_json("/broken.json"),
            Err(LoadError::Json { .. })
        ));
        assert!(matches!(
            source.fetch_json("/missing.json"),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn test_region_index_requires_array() {
        let source = MemorySource::new(&[("/regions.json", json!({"city": "x"}))]);
        assert!(matches!(
            load_region_index(&source, "/regions.json"),
            Err(LoadError::UnexpectedShape { .. })
        ));
    }
}
