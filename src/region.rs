//! # Region Index
//!
//! Name → coordinate lookup built from a reference list of administrative
//! regions. Region names in the data are messy: a field may hold a
//! `简体|繁體` pair, and the same place appears with or without its
//! administrative suffix (`北京市` vs `北京`). The index stores every pair
//! half plus its suffix-stripped short form, first entry wins.
//!
//! An R-tree over the same entries answers nearest-region queries for
//! gridded data that has coordinates but no names.

use crate::fields::RowExt;
use crate::geo_utils::haversine_km;
use crate::{OrderedGroups, Row};
use log::{debug, info, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Administrative suffixes removed when deriving short names.
/// Longest first, so `自治区` wins over `区` and `地区` over `区`.
const ADMIN_SUFFIXES: [&str; 9] = ["自治区", "自治州", "地区", "省", "市", "盟", "县", "区", "旗"];

/// Tokens removed anywhere in a province name before re-adding `省`.
const PROVINCE_TOKENS: [&str; 7] = [
    "省",
    "市",
    "自治区",
    "壮族自治区",
    "维吾尔自治区",
    "回族自治区",
    "特别行政区",
];

/// Maximum number of unmatched scatter names kept in a coverage report.
const COVERAGE_SAMPLE_LIMIT: usize = 200;

// ============================================================================
// Core Types
// ============================================================================

/// A longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionCoord {
    pub lon: f64,
    pub lat: f64,
}

impl RegionCoord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn is_valid(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }

    /// `[lon, lat]`, the order map layers expect.
    pub fn to_array(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

/// One entry of the reference region list.
///
/// Deserializes from records spelling coordinates either `lon`/`lat` or
/// `longitude`/`latitude`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionReference {
    pub province: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    #[serde(alias = "longitude")]
    pub lon: Option<f64>,
    #[serde(alias = "latitude")]
    pub lat: Option<f64>,
}

impl RegionReference {
    /// Read a reference entry from a raw JSON record.
    ///
    /// Coordinates come from `longitude`/`latitude` when present, else from
    /// `lon`/`lat`. Numeric strings are accepted.
    pub fn from_row(row: &Row) -> Self {
        let pick = |primary: &str, fallback: &str| match row.get(primary) {
            Some(v) if !v.is_null() => row.number(primary),
            _ => row.number(fallback),
        };
        Self {
            province: row.text("province").map(str::to_string),
            city: row.text("city").map(str::to_string),
            county: row.text("county").map(str::to_string),
            lon: pick("longitude", "lon"),
            lat: pick("latitude", "lat"),
        }
    }

    fn coord(&self) -> Option<RegionCoord> {
        let coord = RegionCoord::new(self.lon?, self.lat?);
        coord.is_valid().then_some(coord)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        [&self.county, &self.city, &self.province]
            .into_iter()
            .filter_map(|n| n.as_deref())
    }
}

/// Successful name resolution for a row.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMatch {
    /// The row name that resolved
    pub name: String,
    pub coord: RegionCoord,
}

/// Closest indexed region to a query coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestRegion {
    pub name: String,
    pub coord: RegionCoord,
    pub distance_km: f64,
}

/// Point in the nearest-region R-tree.
#[derive(Debug, Clone)]
struct RegionPoint {
    name: String,
    coord: RegionCoord,
}

impl RTreeObject for RegionPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.coord.lon, self.coord.lat])
    }
}

impl PointDistance for RegionPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlon = self.coord.lon - point[0];
        let dlat = self.coord.lat - point[1];
        dlon * dlon + dlat * dlat
    }
}

// ============================================================================
// Name Normalization
// ============================================================================

/// Remove one trailing administrative suffix.
///
/// ```
/// use air_quality_core::strip_suffix;
///
/// assert_eq!(strip_suffix("北京市"), "北京");
/// assert_eq!(strip_suffix("内蒙古自治区"), "内蒙古");
/// assert_eq!(strip_suffix("朝阳"), "朝阳");
/// ```
pub fn strip_suffix(name: &str) -> &str {
    ADMIN_SUFFIXES
        .iter()
        .find_map(|s| name.strip_suffix(s))
        .unwrap_or(name)
}

/// Last `|`-separated segment, trimmed.
///
/// ```
/// use air_quality_core::normalize_region_name;
///
/// assert_eq!(normalize_region_name("北京市|北京市"), "北京市");
/// assert_eq!(normalize_region_name(" 上海 "), "上海");
/// ```
pub fn normalize_region_name(name: &str) -> &str {
    name.rsplit('|').next().unwrap_or(name).trim()
}

/// Canonical full province name, matching boundary-file naming.
///
/// Municipalities, autonomous regions and SARs map to their full official
/// names in either script; other provinces get a single `省` suffix.
///
/// ```
/// use air_quality_core::normalize_province;
///
/// assert_eq!(normalize_province("内蒙古"), "内蒙古自治区");
/// assert_eq!(normalize_province("河北"), "河北省");
/// assert_eq!(normalize_province("河北省|河北省"), "河北省");
/// assert_eq!(normalize_province("北京"), "北京市");
/// ```
pub fn normalize_province(name: &str) -> String {
    let name = normalize_region_name(name);
    if let Some(alias) = province_alias(name) {
        return alias.to_string();
    }

    let mut stripped = String::with_capacity(name.len());
    let mut rest = name;
    'scan: while let Some(c) = rest.chars().next() {
        for token in PROVINCE_TOKENS {
            if let Some(after) = rest.strip_prefix(token) {
                rest = after;
                continue 'scan;
            }
        }
        stripped.push(c);
        rest = &rest[c.len_utf8()..];
    }

    let stripped = stripped.trim();
    if stripped.is_empty() {
        return String::new();
    }
    format!("{}省", stripped)
}

fn province_alias(name: &str) -> Option<&'static str> {
    let canonical = match name {
        "北京" | "北京市" => "北京市",
        "天津" | "天津市" => "天津市",
        "上海" | "上海市" => "上海市",
        "重庆" | "重庆市" | "重慶" | "重慶市" => "重庆市",
        "内蒙古" | "内蒙古自治区" | "內蒙古" | "內蒙古自治區" => "内蒙古自治区",
        "广西" | "广西壮族自治区" | "廣西" | "廣西壯族自治區" => "广西壮族自治区",
        "新疆" | "新疆维吾尔自治区" | "新疆維吾爾自治區" => "新疆维吾尔自治区",
        "宁夏" | "宁夏回族自治区" | "寧夏" | "寧夏回族自治區" => "宁夏回族自治区",
        "西藏" | "西藏自治区" | "西藏自治區" => "西藏自治区",
        "香港" | "香港特别行政区" | "香港特別行政區" | "中国香港" | "中國香港" => {
            "香港特别行政区"
        }
        "澳门" | "澳门特别行政区" | "澳門" | "澳門特別行政區" | "中国澳门" | "中國澳門" => {
            "澳门特别行政区"
        }
        "台湾" | "台湾省" | "台灣" | "臺灣" | "臺灣省" => "台湾省",
        "黑龙江" | "黑龙江省" | "黑龍江" | "黑龍江省" => "黑龙江省",
        _ => return None,
    };
    Some(canonical)
}

// ============================================================================
// Region Index
// ============================================================================

/// Name → coordinate index with nearest-region support.
#[derive(Debug, Default)]
pub struct RegionIndex {
    coords: HashMap<String, RegionCoord>,
    tree: RTree<RegionPoint>,
}

impl RegionIndex {
    /// Build from reference entries. Entries without finite coordinates
    /// are skipped.
    pub fn build(entries: &[RegionReference]) -> Self {
        let mut coords: HashMap<String, RegionCoord> = HashMap::new();
        let mut points = Vec::new();
        let mut skipped = 0usize;

        for entry in entries {
            let Some(coord) = entry.coord() else {
                skipped += 1;
                continue;
            };

            for name in entry.names() {
                for part in name.split('|').map(str::trim).filter(|p| !p.is_empty()) {
                    coords.entry(part.to_string()).or_insert(coord);
                    let short = strip_suffix(part);
                    if short != part && short.chars().count() > 1 {
                        coords.entry(short.to_string()).or_insert(coord);
                    }
                }
            }

            if let Some(name) = entry.names().next() {
                points.push(RegionPoint {
                    name: normalize_region_name(name).to_string(),
                    coord,
                });
            }
        }

        info!(
            "[RegionIndex] Built {} keys from {} entries ({} without coordinates)",
            coords.len(),
            entries.len(),
            skipped
        );

        Self {
            coords,
            tree: RTree::bulk_load(points),
        }
    }

    /// Build from raw JSON records (see [`RegionReference::from_row`]).
    pub fn from_rows(rows: &[Row]) -> Self {
        let entries: Vec<RegionReference> = rows.iter().map(RegionReference::from_row).collect();
        Self::build(&entries)
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.coords.contains_key(name)
    }

    /// Exact key lookup.
    pub fn get(&self, name: &str) -> Option<RegionCoord> {
        self.coords.get(name).copied()
    }

    /// Resolve a single name: exact, then suffix-stripped, then each half
    /// of a `简体|繁體` pair the same way.
    pub fn resolve(&self, name: &str) -> Option<RegionCoord> {
        let direct = |n: &str| self.get(n).or_else(|| self.get(strip_suffix(n)));
        direct(name).or_else(|| {
            if !name.contains('|') {
                return None;
            }
            name.split('|')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .find_map(direct)
        })
    }

    /// Resolve a row by trying `city`, `county`, then `province`.
    pub fn lookup_row(&self, row: &Row) -> Option<RegionMatch> {
        ["city", "county", "province"]
            .iter()
            .filter_map(|f| row.text(f))
            .find_map(|name| {
                self.resolve(name).map(|coord| RegionMatch {
                    name: name.to_string(),
                    coord,
                })
            })
    }

    /// Closest indexed region by planar degree distance.
    pub fn nearest(&self, coord: RegionCoord) -> Option<NearestRegion> {
        if !coord.is_valid() {
            return None;
        }
        let point = self.tree.nearest_neighbor(&coord.to_array())?;
        Some(NearestRegion {
            name: point.name.clone(),
            coord: point.coord,
            distance_km: haversine_km(&coord, &point.coord),
        })
    }
}

// ============================================================================
// Index Cache
// ============================================================================

/// Build-once holder for a shared [`RegionIndex`].
///
/// The index is built on first request and reused until [`invalidate`]
/// is called.
///
/// [`invalidate`]: RegionIndexCache::invalidate
#[derive(Debug, Default)]
pub struct RegionIndexCache {
    slot: RwLock<Option<Arc<RegionIndex>>>,
}

impl RegionIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Option<Arc<RegionIndex>>> {
        self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Option<Arc<RegionIndex>>> {
        self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The cached index, if one has been built.
    pub fn get(&self) -> Option<Arc<RegionIndex>> {
        self.read_slot().clone()
    }

    pub fn get_or_build<F>(&self, build: F) -> Arc<RegionIndex>
    where
        F: FnOnce() -> RegionIndex,
    {
        if let Some(index) = self.get() {
            return index;
        }
        let mut slot = self.write_slot();
        if let Some(index) = slot.as_ref() {
            return Arc::clone(index);
        }
        let index = Arc::new(build());
        *slot = Some(Arc::clone(&index));
        index
    }

    /// Like [`get_or_build`](Self::get_or_build) for fallible builders.
    /// A failed build leaves the cache empty.
    pub fn get_or_try_build<F, E>(&self, build: F) -> Result<Arc<RegionIndex>, E>
    where
        F: FnOnce() -> Result<RegionIndex, E>,
    {
        if let Some(index) = self.get() {
            return Ok(index);
        }
        let mut slot = self.write_slot();
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(build()?);
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    pub fn invalidate(&self) {
        debug!("[RegionIndex] Cache invalidated");
        *self.write_slot() = None;
    }
}

// ============================================================================
// Coverage Report
// ============================================================================

/// Name mismatches between data rows, boundary names and the Region Index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    /// Distinct normalized provinces seen in the rows
    pub provinces_seen: usize,
    /// Normalized provinces with no matching boundary name
    pub missing_provinces: Vec<String>,
    /// Distinct scatter names seen in the rows
    pub scatter_names: usize,
    /// Scatter names the index cannot resolve, capped for display
    pub missing_coords: Vec<String>,
    pub missing_coords_total: usize,
}

/// Cross-check row names against boundary names and the index.
pub fn name_coverage_report(
    rows: &[Row],
    boundary_names: &[String],
    index: &RegionIndex,
) -> CoverageReport {
    let boundaries: HashSet<String> = boundary_names
        .iter()
        .map(|n| normalize_province(n))
        .filter(|n| !n.is_empty())
        .collect();

    let mut provinces: OrderedGroups<()> = OrderedGroups::new();
    let mut scatter: OrderedGroups<()> = OrderedGroups::new();
    for row in rows {
        if let Some(p) = row.text("province") {
            let p = normalize_province(p);
            if !p.is_empty() {
                provinces.entry_or_insert_with(&p, || ());
            }
        }
        if let Some(name) = row.first_text(&["city", "county", "province"]) {
            let name = normalize_region_name(name);
            if !name.is_empty() {
                scatter.entry_or_insert_with(name, || ());
            }
        }
    }

    let provinces = provinces.into_vec();
    let scatter = scatter.into_vec();

    let missing_provinces: Vec<String> = provinces
        .iter()
        .filter(|(p, _)| !boundaries.contains(p))
        .map(|(p, _)| p.clone())
        .collect();
    let unresolved: Vec<&String> = scatter
        .iter()
        .filter(|(n, _)| index.resolve(n).is_none())
        .map(|(n, _)| n)
        .collect();

    if !missing_provinces.is_empty() || !unresolved.is_empty() {
        warn!(
            "[Coverage] {} provinces missing boundaries, {} names missing coordinates",
            missing_provinces.len(),
            unresolved.len()
        );
    }

    CoverageReport {
        provinces_seen: provinces.len(),
        missing_provinces,
        scatter_names: scatter.len(),
        missing_coords_total: unresolved.len(),
        missing_coords: unresolved
            .into_iter()
            .take(COVERAGE_SAMPLE_LIMIT)
            .cloned()
            .collect(),
    }
}
