#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Police crime dataset vocabulary.
//!
//! The "Geregistreerde misdrijven; wijk en buurt; maandcijfers" dataset
//! identifies periods by keys such as `"2024MM06"` and crime categories
//! by dotted codes such as `"1.1.1"`. The overall total is published
//! under one of several codes depending on the dataset revision.

pub mod score;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category codes that denote the all-categories total.
pub const TOTAL_CATEGORY_CODES: [&str; 4] = ["0.0.0", "0", "00", "000"];

/// Returns `true` if `code` (trimmed) is one of [`TOTAL_CATEGORY_CODES`].
#[must_use]
pub fn is_total_code(code: &str) -> bool {
    TOTAL_CATEGORY_CODES.contains(&code.trim())
}

/// Removes a leading `n.n.n` code from a category title
/// (`"1.1.1 Diefstal/inbraak woning"` → `"Diefstal/inbraak woning"`).
#[must_use]
pub fn strip_code_prefix(title: &str) -> &str {
    let title = title.trim();
    let mut rest = title;
    for group in 0..3 {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return title;
        }
        rest = &rest[digits..];
        if group < 2 {
            match rest.strip_prefix('.') {
                Some(after_dot) => rest = after_dot,
                None => return title,
            }
        }
    }
    rest.trim_start()
}

/// A period key of the police dataset, e.g. `"2024MM06"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    /// Wraps a raw key, trimming surrounding whitespace.
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self(key.trim().to_string())
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for monthly keys (ending in `MM` and two digits).
    #[must_use]
    pub fn is_monthly(&self) -> bool {
        self.0
            .rfind("MM")
            .map(|i| &self.0[i + 2..])
            .is_some_and(|m| m.len() == 2 && m.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Display label: `"2024MM06"` → `"2024-06"`.
    ///
    /// Keys without an `MM` marker fall back to the two characters after
    /// the year when those are digits; anything else is returned as is.
    #[must_use]
    pub fn label(&self) -> String {
        let key = self.0.as_str();
        let year = key.get(..4).unwrap_or(key);
        if let Some(i) = key.find("MM") {
            if let Some(month) = key.get(i + 2..i + 4) {
                if month.bytes().all(|b| b.is_ascii_digit()) {
                    return format!("{year}-{month}");
                }
            }
        }
        match key.get(4..6) {
            Some(month) if month.bytes().all(|b| b.is_ascii_digit()) => format!("{year}-{month}"),
            _ => key.to_string(),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_total_codes() {
        for code in TOTAL_CATEGORY_CODES {
            assert!(is_total_code(code));
        }
        assert!(is_total_code(" 0.0.0 "));
        assert!(!is_total_code("1.1.1"));
    }

    #[test]
    fn strips_category_prefix() {
        assert_eq!(strip_code_prefix("1.1.1 Diefstal/inbraak woning"), "Diefstal/inbraak woning");
        assert_eq!(strip_code_prefix("2.5.2Winkeldiefstal"), "Winkeldiefstal");
        assert_eq!(strip_code_prefix("Totaal misdrijven"), "Totaal misdrijven");
        assert_eq!(strip_code_prefix("1.4 Mishandeling"), "1.4 Mishandeling");
    }

    #[test]
    fn labels_periods() {
        assert_eq!(PeriodKey::new("2024MM06").label(), "2024-06");
        assert_eq!(PeriodKey::new(" 2023MM12 ").label(), "2023-12");
        assert_eq!(PeriodKey::new("202407").label(), "2024-07");
        assert_eq!(PeriodKey::new("2024JJ00").label(), "2024JJ00");
    }

    #[test]
    fn detects_monthly_keys() {
        assert!(PeriodKey::new("2024MM06").is_monthly());
        assert!(!PeriodKey::new("2024JJ00").is_monthly());
        assert!(!PeriodKey::new("2024MM6").is_monthly());
    }

    #[test]
    fn keys_order_lexically() {
        let mut keys = vec![PeriodKey::new("2024MM10"), PeriodKey::new("2024MM02")];
        keys.sort();
        assert_eq!(keys[0].as_str(), "2024MM02");
    }
}
