//! Field alias table.
//!
//! CBS suffixes every column with its position in the dataset
//! (`AantalInwoners_5` in one year, `AantalInwoners_4` in another), so a
//! concept is identified by its base name. A bag key matches a base name
//! when it is equal to it or is the base name followed by `_` and digits.

use crate::{PropertyBag, TimestampedValue};

/// One canonical concept and the source field base names that carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAlias {
    bases: &'static [&'static str],
}

impl FieldAlias {
    /// Creates an alias over the given base names.
    #[must_use]
    pub const fn new(bases: &'static [&'static str]) -> Self {
        Self { bases }
    }

    /// Returns `true` if `key` is one of this alias's fields.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.bases.iter().any(|base| key_matches(key, base))
    }

    /// Returns the matching entry with a value, preferring the most recent
    /// year. Ties keep the first key in bag order.
    #[must_use]
    pub fn resolve<'a>(&self, bag: &'a PropertyBag) -> Option<(&'a str, &'a TimestampedValue)> {
        let mut best: Option<(&str, &TimestampedValue)> = None;
        for (key, value) in bag {
            if value.value.is_none() || !self.matches(key) {
                continue;
            }
            let year = year_of(value);
            if best.is_none_or(|(_, current)| year > year_of(current)) {
                best = Some((key.as_str(), value));
            }
        }
        best
    }

    /// Returns the most recent numeric value for this concept.
    #[must_use]
    pub fn number(&self, bag: &PropertyBag) -> Option<f64> {
        self.latest_number(bag).and_then(|(_, value)| value.as_f64())
    }

    /// Like [`Self::number`] but returns the whole entry.
    #[must_use]
    pub fn latest_number<'a>(&self, bag: &'a PropertyBag) -> Option<(&'a str, &'a TimestampedValue)> {
        let mut best: Option<(&str, &TimestampedValue)> = None;
        for (key, value) in bag {
            if !self.matches(key) || value.as_f64().is_none_or(|n| !n.is_finite()) {
                continue;
            }
            if best.is_none_or(|(_, current)| year_of(value) > year_of(current)) {
                best = Some((key.as_str(), value));
            }
        }
        best
    }
}

fn year_of(value: &TimestampedValue) -> i32 {
    value.year.as_ref().map_or(0, crate::YearTag::sort_key)
}

fn key_matches(key: &str, base: &str) -> bool {
    if key == base {
        return true;
    }
    key.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

/// Number of residents.
pub const RESIDENTS: FieldAlias = FieldAlias::new(&["AantalInwoners"]);
/// Historical violent and sexual crimes per 1000 residents.
pub const VIOLENT_AND_SEXUAL_CRIMES: FieldAlias =
    FieldAlias::new(&["GeweldsEnSeksueleMisdrijven"]);
/// Historical vandalism and public order crimes per 1000 residents.
pub const VANDALISM_AND_PUBLIC_ORDER: FieldAlias =
    FieldAlias::new(&["VernielingMisdrijfTegenOpenbareOrde"]);
/// Residents with a western migration background.
pub const WESTERN_BACKGROUND: FieldAlias = FieldAlias::new(&["WestersTotaal"]);
/// Residents with a non-western migration background.
pub const NON_WESTERN_BACKGROUND: FieldAlias = FieldAlias::new(&["NietWestersTotaal"]);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: serde_json::Value, year: i32) -> TimestampedValue {
        TimestampedValue::new(Some(value), year)
    }

    #[test]
    fn matches_base_and_numbered_suffix() {
        assert!(RESIDENTS.matches("AantalInwoners"));
        assert!(RESIDENTS.matches("AantalInwoners_5"));
        assert!(!RESIDENTS.matches("AantalInwonersPerKm2"));
        assert!(!RESIDENTS.matches("AantalInwoners_"));
        assert!(!WESTERN_BACKGROUND.matches("NietWestersTotaal_17"));
    }

    #[test]
    fn prefers_most_recent_year_across_suffixes() {
        let mut bag = PropertyBag::new();
        bag.insert("AantalInwoners_4".into(), entry(json!(1700), 2021));
        bag.insert("AantalInwoners_5".into(), entry(json!(1650), 2019));
        assert_eq!(RESIDENTS.number(&bag), Some(1700.0));
        assert_eq!(RESIDENTS.resolve(&bag).map(|(k, _)| k), Some("AantalInwoners_4"));
    }

    #[test]
    fn skips_non_numeric_values() {
        let mut bag = PropertyBag::new();
        bag.insert("AantalInwoners_5".into(), entry(json!("   "), 2021));
        assert_eq!(RESIDENTS.number(&bag), None);
    }
}
