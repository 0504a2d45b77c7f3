//! Address query normalisation.
//!
//! Listing pages render addresses in several shapes: `"Damrak 1 - A"`,
//! `"Damrak 1-A 1012LG"`, `"Damrak 1A"`. The suggest endpoint matches some
//! of these better than others, so the resolver tries a short list of
//! variants in order.

use regex::Regex;
use std::sync::LazyLock;

/// Whitespace around a dash (`"1 - A"` → `"1-A"`).
static DASH_SPACING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*").expect("valid regex"));

/// Runs of whitespace.
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// House number followed by a dashed letter suffix (`"1-A"`).
static DASHED_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)-([A-Za-z])\b").expect("valid regex"));

/// Collapses dash spacing and repeated whitespace.
#[must_use]
pub fn normalize(address: &str) -> String {
    let dashed = DASH_SPACING_RE.replace_all(address.trim(), "-");
    WHITESPACE_RE.replace_all(&dashed, " ").into_owned()
}

/// Removes all whitespace from a postal code (`"1011 AB"` → `"1011AB"`).
#[must_use]
pub fn compact_zip(zip: &str) -> String {
    zip.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Builds the ordered, de-duplicated list of address variants to try:
///
/// 1. the normalised address,
/// 2. the first dashed suffix split into a separate token (`"1-A"` → `"1 A"`),
/// 3. the normalised address without a trailing postal code,
/// 4. the postal code followed by (3).
///
/// Empty variants are dropped.
#[must_use]
pub fn variants(address: &str, zip: &str) -> Vec<String> {
    let normalized = normalize(address);
    let removed_dash = DASHED_SUFFIX_RE.replace(&normalized, "$1 $2").into_owned();
    let without_zip = if zip.is_empty() {
        normalized.clone()
    } else {
        normalized
            .strip_suffix(zip)
            .unwrap_or(&normalized)
            .trim()
            .to_string()
    };
    let front_zip = format!("{zip} {without_zip}").trim().to_string();

    let mut out: Vec<String> = Vec::with_capacity(4);
    for variant in [normalized, removed_dash, without_zip, front_zip] {
        if !variant.is_empty() && !out.contains(&variant) {
            out.push(variant);
        }
    }
    out
}
