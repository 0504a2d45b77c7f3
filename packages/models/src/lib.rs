#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model for the neighbourhood aggregation pipeline.
//!
//! Every statistic that flows through the pipeline is wrapped in a
//! [`TimestampedValue`] carrying the dataset year (or crime period) it was
//! measured in. Values from all sources end up in a single
//! [`PropertyBag`] keyed by the source field identifier.

pub mod diagnostics;
pub mod fields;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use diagnostics::Diagnostics;

/// The administrative neighbourhood ("buurt") an address belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighbourhoodIdentity {
    /// Neighbourhood code, e.g. `"BU03630000"`.
    pub code: String,
    /// Display name of the neighbourhood.
    pub name: Option<String>,
    /// Display name of the municipality.
    pub municipality_name: Option<String>,
}

/// The period a value was measured in.
///
/// Statistics carry the dataset year; the crime score carries the label
/// of the monthly period it was computed from (e.g. `"2024-06"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YearTag {
    /// A dataset year.
    Year(i32),
    /// A period label or a year rendered as text.
    Period(String),
}

impl YearTag {
    /// Returns the calendar year this tag refers to, used to order
    /// competing values. Labels that don't start with a year sort first.
    #[must_use]
    pub fn sort_key(&self) -> i32 {
        match self {
            Self::Year(year) => *year,
            Self::Period(label) => label
                .get(..4)
                .and_then(|y| y.parse().ok())
                .unwrap_or_default(),
        }
    }
}

impl From<i32> for YearTag {
    fn from(year: i32) -> Self {
        Self::Year(year)
    }
}

impl fmt::Display for YearTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year}"),
            Self::Period(label) => f.write_str(label),
        }
    }
}

/// A value together with the year or period it was measured in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedValue<T = serde_json::Value> {
    /// The measured value, `None` when the source had no data.
    pub value: Option<T>,
    /// Dataset year or period label. Absent for values that are not tied
    /// to a dataset (names, amenity counts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<YearTag>,
}

impl<T> TimestampedValue<T> {
    /// Creates a value tagged with `year`.
    pub fn new(value: Option<T>, year: impl Into<YearTag>) -> Self {
        Self {
            value,
            year: Some(year.into()),
        }
    }

    /// Creates a value without a year tag.
    pub const fn untagged(value: Option<T>) -> Self {
        Self { value, year: None }
    }
}

impl TimestampedValue {
    /// Returns the value as a number, if it is one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_ref().and_then(serde_json::Value::as_f64)
    }

    /// Returns the value as trimmed text, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.value
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
    }
}

/// All properties gathered for one neighbourhood, keyed by source field
/// name (e.g. `"AantalInwoners_5"`) or by computed property name (e.g.
/// `"crimeScore"`).
pub type PropertyBag = BTreeMap<String, TimestampedValue>;

/// Merges bags in iteration order: a key present in a later bag replaces
/// the value from an earlier one.
#[must_use]
pub fn merge_bags(bags: impl IntoIterator<Item = PropertyBag>) -> PropertyBag {
    let mut merged = PropertyBag::new();
    for bag in bags {
        merged.extend(bag);
    }
    merged
}

/// A latitude/longitude pair in WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// Count and mean distance of one amenity category around a centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmenityStats {
    /// Number of features found within the search radius.
    pub count: u64,
    /// Rounded mean great-circle distance in metres, `None` when nothing
    /// was found.
    pub avg_distance_meters: Option<u64>,
}

impl AmenityStats {
    /// Stats for a category whose lookup failed or found nothing.
    pub const EMPTY: Self = Self {
        count: 0,
        avg_distance_meters: None,
    };
}

/// Registered crimes for one monthly period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCrimeTotal {
    /// Display label, e.g. `"2024-06"`.
    pub period: String,
    /// Raw period key, e.g. `"2024MM06"`.
    pub key: String,
    /// Total registered crimes.
    pub total: u64,
}

/// Registered crimes of one category summed over a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeTypeTotal {
    /// Category code, e.g. `"1.1.1"`.
    pub key: String,
    /// Human readable category name.
    pub label: String,
    /// Total registered crimes.
    pub total: u64,
}

/// Chart data for the most recently completed calendar year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeChartData {
    /// Monthly totals in chronological order.
    pub monthly: Vec<MonthlyCrimeTotal>,
    /// Category totals, highest first.
    pub by_type: Vec<CrimeTypeTotal>,
    /// The calendar year covered.
    pub year: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(entries: &[(&str, serde_json::Value, i32)]) -> PropertyBag {
        entries
            .iter()
            .map(|(k, v, y)| ((*k).to_string(), TimestampedValue::new(Some(v.clone()), *y)))
            .collect()
    }

    #[test]
    fn later_bag_wins() {
        let merged = merge_bags([
            bag(&[("AantalInwoners_5", json!(1800), 2020)]),
            bag(&[("AantalInwoners_5", json!(1900), 2021)]),
        ]);
        let v = &merged["AantalInwoners_5"];
        assert_eq!(v.as_f64(), Some(1900.0));
        assert_eq!(v.year, Some(YearTag::Year(2021)));
    }

    #[test]
    fn year_tag_serializes_untagged() {
        assert_eq!(serde_json::to_value(YearTag::Year(2021)).unwrap(), json!(2021));
        assert_eq!(
            serde_json::to_value(YearTag::Period("2024-06".into())).unwrap(),
            json!("2024-06")
        );
        let parsed: YearTag = serde_json::from_value(json!("2019")).unwrap();
        assert_eq!(parsed.sort_key(), 2019);
    }

    #[test]
    fn untagged_value_omits_year() {
        let value = TimestampedValue::untagged(Some(json!(4)));
        assert_eq!(serde_json::to_value(value).unwrap(), json!({ "value": 4 }));
    }
}
