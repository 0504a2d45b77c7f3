//! OData helpers for the CBS StatLine endpoints.
//!
//! Both the yearly neighbourhood tables and the police crime dataset are
//! served as OData v3: `{base}/{dataset}/{entity}?$filter=...&$format=json`
//! answering `{"value": [...]}`.

use reqwest::Url;

use crate::{SourceError, query};

/// Builds `{base}/{dataset}/{entity}` with the given query parameters.
///
/// # Errors
///
/// Returns [`SourceError::Url`] if the URL cannot be built.
pub fn entity_url(
    base: &str,
    dataset: &str,
    entity: &str,
    params: &[(&str, &str)],
) -> Result<Url, SourceError> {
    let path = format!("{}/{dataset}/{entity}", base.trim_end_matches('/'));
    query::build(&path, params)
}

/// Returns the `value` rows of an OData response, or an empty slice when
/// the body has none.
#[must_use]
pub fn rows(body: &serde_json::Value) -> &[serde_json::Value] {
    body.get("value")
        .and_then(serde_json::Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

/// Renders `field eq 'value'` with single quotes in `value` doubled.
#[must_use]
pub fn eq_filter(field: &str, value: &str) -> String {
    format!("{field} eq '{}'", value.replace('\'', "''"))
}

/// Reads a numeric cell. CBS pads some text cells with spaces and
/// occasionally serves numbers as strings.
#[must_use]
pub fn number(row: &serde_json::Value, field: &str) -> Option<f64> {
    match row.get(field)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a text cell, trimmed.
#[must_use]
pub fn text<'a>(row: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    row.get(field).and_then(serde_json::Value::as_str).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_entity_url() {
        let filter = eq_filter("WijkenEnBuurten", "BU03630000");
        let url = entity_url(
            "https://opendata.cbs.nl/ODataApi/odata/",
            "85039NED",
            "TypedDataSet",
            &[("$filter", filter.as_str()), ("$format", "json")],
        )
        .unwrap();
        assert_eq!(
            query::decoded(&url),
            "opendata.cbs.nl/ODataApi/odata/85039NED/TypedDataSet?$filter=WijkenEnBuurten eq 'BU03630000'&$format=json"
        );
    }

    #[test]
    fn rows_tolerate_missing_value() {
        assert!(rows(&json!({})).is_empty());
        assert_eq!(rows(&json!({ "value": [{ "Key": "2024MM01" }] })).len(), 1);
    }

    #[test]
    fn eq_filter_doubles_quotes() {
        assert_eq!(eq_filter("Naam", "'s-Hertogenbosch"), "Naam eq '''s-Hertogenbosch'");
    }

    #[test]
    fn reads_padded_cells() {
        let row = json!({ "GeregistreerdeMisdrijven_1": " 12 ", "Title": " Diefstal " });
        assert_eq!(number(&row, "GeregistreerdeMisdrijven_1"), Some(12.0));
        assert_eq!(text(&row, "Title"), Some("Diefstal"));
        assert_eq!(number(&row, "Missing"), None);
    }
}
