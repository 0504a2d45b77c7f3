//! Query string construction.
//!
//! OData and Locatieserver parameters contain characters that carry
//! meaning in a query string (`$filter=... eq '0.0.0'`, `type:adres AND
//! postcode:1011AB`). Keys and values are form-encoded by [`Url`];
//! [`decoded`] renders them back for diagnostics.

use reqwest::Url;

use crate::SourceError;

/// Builds `base?k1=v1&k2=v2...`, appending to any query already on `base`.
///
/// # Errors
///
/// Returns [`SourceError::Url`] if `base` is not a valid URL.
pub fn build(base: &str, params: &[(&str, &str)]) -> Result<Url, SourceError> {
    Url::parse_with_params(base, params).map_err(|e| SourceError::Url {
        message: format!("{base}: {e}"),
    })
}

/// Renders a URL with its query decoded, e.g.
/// `host/path?$filter=WijkenEnBuurten eq 'BU03630000'`.
///
/// Used for diagnostics and for matching requests in tests.
#[must_use]
pub fn decoded(url: &Url) -> String {
    let mut out = format!("{}{}", url.host_str().unwrap_or_default(), url.path());
    let pairs: Vec<String> = url
        .query_pairs()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    if !pairs.is_empty() {
        out.push('?');
        out.push_str(&pairs.join("&"));
    }
    out
}
