//! Tolerant row access and granularity-aware field naming.
//!
//! Aggregated sources rename metric columns: monthly files write
//! `<field>_mean`, yearly files write `<field>_yearly_mean`. Reducers ask
//! for the bare field and let [`value_from_row`] resolve the stored name,
//! falling back to the bare field when the suffixed one is absent.

use crate::{Granularity, Row};
use serde_json::Value;

// ============================================================================
// Configuration
// ============================================================================

/// Field suffix used by yearly aggregate files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearSuffix {
    /// `<field>_yearly_mean` (what the yearly aggregation step writes)
    #[default]
    YearlyMean,
    /// `<field>_mean`
    Mean,
}

impl YearSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            YearSuffix::YearlyMean => "_yearly_mean",
            YearSuffix::Mean => "_mean",
        }
    }
}

/// Naming conventions for aggregated data sources.
#[derive(Debug, Clone)]
pub struct FieldConventions {
    /// Suffix for month-granularity fields.
    /// Default: `"_mean"`
    pub month_suffix: String,

    /// Suffix for year-granularity fields.
    /// Default: [`YearSuffix::YearlyMean`]
    pub year_suffix: YearSuffix,
}

impl Default for FieldConventions {
    fn default() -> Self {
        Self {
            month_suffix: "_mean".to_string(),
            year_suffix: YearSuffix::default(),
        }
    }
}

// ============================================================================
// Field Resolution
// ============================================================================

/// Preferred stored name of `field` at the given granularity.
///
/// ```
/// use air_quality_core::{field_name_for_granularity, FieldConventions, Granularity};
///
/// let conv = FieldConventions::default();
/// assert_eq!(field_name_for_granularity("pm25", Granularity::Day, &conv), "pm25");
/// assert_eq!(field_name_for_granularity("pm25", Granularity::Month, &conv), "pm25_mean");
/// assert_eq!(field_name_for_granularity("pm25", Granularity::Year, &conv), "pm25_yearly_mean");
/// ```
pub fn field_name_for_granularity(
    field: &str,
    granularity: Granularity,
    conventions: &FieldConventions,
) -> String {
    match granularity {
        Granularity::Day => field.to_string(),
        Granularity::Month => format!("{}{}", field, conventions.month_suffix),
        Granularity::Year => format!("{}{}", field, conventions.year_suffix.as_str()),
    }
}

/// Raw value of `field` at the given granularity.
///
/// A suffixed field that is missing or `null` falls back to the bare field.
pub fn value_from_row<'a>(
    row: &'a Row,
    field: &str,
    granularity: Granularity,
    conventions: &FieldConventions,
) -> Option<&'a Value> {
    if granularity != Granularity::Day {
        let resolved = field_name_for_granularity(field, granularity, conventions);
        if let Some(v) = row.get(&resolved).filter(|v| !v.is_null()) {
            return Some(v);
        }
    }
    row.get(field)
}

// ============================================================================
// Value Coercion
// ============================================================================

/// Coerce a JSON value to a finite number.
///
/// Numbers and numeric strings (surrounding whitespace allowed) are
/// accepted. `null`, booleans, empty strings and non-finite results are not.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Like [`coerce_number`], but a missing, `null` or blank-string value
/// reads as zero.
///
/// Used where averages and level buckets treat absent readings as zero
/// rather than skipping them. Unparseable values are still rejected.
pub fn coerce_number_or_zero(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0.0),
        Some(v) => coerce_number(v),
    }
}

/// JavaScript-style truthiness for name and coordinate fallbacks.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Tolerant accessors over a [`Row`].
pub trait RowExt {
    /// Finite numeric value of `field`.
    fn number(&self, field: &str) -> Option<f64>;

    /// Numeric value with missing, `null` or blank-string read as zero.
    fn number_or_zero(&self, field: &str) -> Option<f64>;

    /// Finite, strictly positive value of `field`.
    fn positive(&self, field: &str) -> Option<f64> {
        self.number(field).filter(|v| *v > 0.0)
    }

    /// Non-empty string value of `field`.
    fn text(&self, field: &str) -> Option<&str>;

    /// First non-empty string among `fields`.
    fn first_text(&self, fields: &[&str]) -> Option<&str> {
        fields.iter().find_map(|f| self.text(f))
    }

    /// Number from the first truthy field among `fields`.
    ///
    /// A present but zero or empty field is skipped, matching how
    /// `lat || latitude` style fallbacks read coordinates.
    fn first_truthy_number(&self, fields: &[&str]) -> Option<f64>;

    /// Granularity-resolved finite value.
    fn number_at(
        &self,
        field: &str,
        granularity: Granularity,
        conventions: &FieldConventions,
    ) -> Option<f64>;

    /// Granularity-resolved value with missing/`null` read as zero.
    fn number_or_zero_at(
        &self,
        field: &str,
        granularity: Granularity,
        conventions: &FieldConventions,
    ) -> Option<f64>;
}

impl RowExt for Row {
    fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(coerce_number)
    }

    fn number_or_zero(&self, field: &str) -> Option<f64> {
        coerce_number_or_zero(self.get(field))
    }

    fn text(&self, field: &str) -> Option<&str> {
        match self.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    fn first_truthy_number(&self, fields: &[&str]) -> Option<f64> {
        let value = fields
            .iter()
            .filter_map(|f| self.get(*f))
            .find(|v| is_truthy(v))?;
        coerce_number(value)
    }

    fn number_at(
        &self,
        field: &str,
        granularity: Granularity,
        conventions: &FieldConventions,
    ) -> Option<f64> {
        value_from_row(self, field, granularity, conventions).and_then(coerce_number)
    }

    fn number_or_zero_at(
        &self,
        field: &str,
        granularity: Granularity,
        conventions: &FieldConventions,
    ) -> Option<f64> {
        coerce_number_or_zero(value_from_row(self, field, granularity, conventions))
    }
}
