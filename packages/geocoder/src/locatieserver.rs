//! Response parsing for the PDOK Locatieserver.
//!
//! Every endpoint (`free`, `suggest`, `lookup`) answers
//! `{"response": {"docs": [...]}}`. Field names differ between endpoint
//! generations, so neighbourhood metadata is read through alias lists.

use buurt_insight_models::{LatLon, NeighbourhoodIdentity};
use regex::Regex;
use std::sync::LazyLock;

/// Document type of a full address.
pub const ADDRESS_TYPE: &str = "adres";

const CODE_FIELDS: &[&str] = &["buurtcode", "buurt_code", "BU_CODE"];
const NAME_FIELDS: &[&str] = &["buurtnaam", "buurt_naam", "BU_NAAM", "buurtnaam_nn"];
const MUNICIPALITY_FIELDS: &[&str] = &[
    "gemeentenaam",
    "GM_NAAM",
    "gemeente",
    "gemeente_naam",
    "woonplaatsnaam",
];

/// `POINT(lon lat)` in WKT.
static WKT_POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"POINT\s*\(([-0-9.]+)\s+([-0-9.]+)\)").expect("valid regex")
});

/// Returns `response.docs`, or an empty slice.
#[must_use]
pub fn docs(body: &serde_json::Value) -> &[serde_json::Value] {
    body.pointer("/response/docs")
        .and_then(serde_json::Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

/// Returns the document's `type`.
#[must_use]
pub fn doc_type(doc: &serde_json::Value) -> Option<&str> {
    doc.get("type").and_then(serde_json::Value::as_str)
}

/// Returns the document's `id`, if non-empty.
#[must_use]
pub fn doc_id(doc: &serde_json::Value) -> Option<&str> {
    doc.get("id")
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Returns the document's postal code, whitespace removed.
#[must_use]
pub fn doc_postcode(doc: &serde_json::Value) -> Option<String> {
    doc.get("postcode")
        .and_then(serde_json::Value::as_str)
        .map(crate::address::compact_zip)
        .filter(|p| !p.is_empty())
}

/// Picks the first full-address document, else the first document.
#[must_use]
pub fn select_doc(docs: &[serde_json::Value]) -> Option<&serde_json::Value> {
    docs.iter()
        .find(|d| doc_type(d) == Some(ADDRESS_TYPE))
        .or_else(|| docs.first())
}

/// Neighbourhood metadata read from one or more documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocMeta {
    /// Neighbourhood code.
    pub code: Option<String>,
    /// Neighbourhood name.
    pub name: Option<String>,
    /// Municipality name.
    pub municipality: Option<String>,
}

impl DocMeta {
    /// Reads the aliased fields of `doc`.
    #[must_use]
    pub fn from_doc(doc: &serde_json::Value) -> Self {
        Self {
            code: first_text(doc, CODE_FIELDS),
            name: first_text(doc, NAME_FIELDS),
            municipality: first_text(doc, MUNICIPALITY_FIELDS),
        }
    }

    /// Returns `true` when all three fields are present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.code.is_some() && self.name.is_some() && self.municipality.is_some()
    }

    /// Fills missing fields from `other`.
    pub fn fill_from(&mut self, other: Self) {
        self.code = self.code.take().or(other.code);
        self.name = self.name.take().or(other.name);
        self.municipality = self.municipality.take().or(other.municipality);
    }

    /// Converts into an identity when a code is present.
    #[must_use]
    pub fn into_identity(self) -> Option<NeighbourhoodIdentity> {
        Some(NeighbourhoodIdentity {
            code: self.code?,
            name: self.name,
            municipality_name: self.municipality,
        })
    }
}

fn first_text(doc: &serde_json::Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        doc.get(*field)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    })
}

/// Parses a WKT `POINT(lon lat)`.
#[must_use]
pub fn parse_wkt_point(wkt: &str) -> Option<LatLon> {
    let caps = WKT_POINT_RE.captures(wkt)?;
    let lon: f64 = caps.get(1)?.as_str().parse().ok()?;
    let lat: f64 = caps.get(2)?.as_str().parse().ok()?;
    (lat.is_finite() && lon.is_finite()).then_some(LatLon { lat, lon })
}

/// Reads the address point of a lookup document (`centroide_ll`, else
/// `geometrie_ll`).
#[must_use]
pub fn doc_point(doc: &serde_json::Value) -> Option<LatLon> {
    ["centroide_ll", "geometrie_ll"]
        .iter()
        .find_map(|field| doc.get(*field).and_then(serde_json::Value::as_str))
        .and_then(parse_wkt_point)
}
