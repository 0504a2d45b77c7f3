//! Compile-time registry of endpoint configuration.
//!
//! The endpoints, dataset ids and timeouts are defined in
//! `endpoints.toml`, embedded at compile time. Setting
//! `BUURT_INSIGHT_ENDPOINTS` to the path of another file with the same
//! layout replaces the embedded copy at runtime.

use std::time::Duration;

use serde::Deserialize;

use crate::SourceError;

/// Environment variable pointing at a replacement endpoints file.
pub const ENDPOINTS_ENV: &str = "BUURT_INSIGHT_ENDPOINTS";

const EMBEDDED_ENDPOINTS: &str = include_str!("../endpoints.toml");

/// All endpoints consumed by the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    /// Address resolution service.
    pub locatieserver: LocatieserverConfig,
    /// Yearly neighbourhood statistics.
    pub statistics: StatisticsConfig,
    /// Monthly registered crime figures.
    pub crime: CrimeConfig,
    /// Neighbourhood boundary polygons.
    pub boundaries: BoundariesConfig,
    /// Map feature search mirrors.
    pub overpass: OverpassConfig,
    /// Orchestration timings.
    pub pipeline: PipelineConfig,
}

/// Locatieserver endpoint generations, newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct LocatieserverConfig {
    /// Base URLs (without `/free`, `/lookup`, `/suggest`).
    pub base_urls: Vec<String>,
    /// Field list requested from the `free` endpoint.
    pub fields: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LocatieserverConfig {
    /// The current-generation base URL, used for `suggest`.
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        self.base_urls.first().map(String::as_str)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One year of the neighbourhood statistics series.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatasetYear {
    /// Year the dataset describes.
    pub year: i32,
    /// OData dataset identifier (e.g. `"85039NED"`).
    pub id: String,
}

/// Yearly neighbourhood statistics service.
#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsConfig {
    /// OData root (without dataset id).
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Year → dataset table, ascending by year.
    pub datasets: Vec<DatasetYear>,
}

impl StatisticsConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Monthly registered crime dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct CrimeConfig {
    /// OData root (without dataset id).
    pub base_url: String,
    /// Dataset identifier.
    pub dataset_id: String,
    /// Timeout for period discovery requests in milliseconds.
    pub period_timeout_ms: u64,
    /// Timeout for data requests in milliseconds.
    pub data_timeout_ms: u64,
    /// How many years before the current one to scan for periods.
    pub lookback_years: i32,
}

impl CrimeConfig {
    /// Timeout for period discovery requests.
    #[must_use]
    pub const fn period_timeout(&self) -> Duration {
        Duration::from_millis(self.period_timeout_ms)
    }

    /// Timeout for data requests.
    #[must_use]
    pub const fn data_timeout(&self) -> Duration {
        Duration::from_millis(self.data_timeout_ms)
    }
}

/// Neighbourhood boundary WFS layer.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundariesConfig {
    /// WFS service URL.
    pub wfs_url: String,
    /// Feature type holding the neighbourhood polygons.
    pub type_name: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl BoundariesConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Map feature search mirrors.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassConfig {
    /// Interpreter URLs, tried in order.
    pub mirrors: Vec<String>,
    /// Search radius around the centroid in metres.
    pub radius_m: u32,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl OverpassConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Orchestration timings.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// How long the initial response waits for amenities and crime charts.
    pub soft_timeout_ms: u64,
}

impl PipelineConfig {
    /// Soft deadline for the slow branches.
    #[must_use]
    pub const fn soft_timeout(&self) -> Duration {
        Duration::from_millis(self.soft_timeout_ms)
    }
}

impl Endpoints {
    /// Returns the embedded endpoint configuration.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (it is fixed at compile
    /// time and covered by tests).
    #[must_use]
    pub fn embedded() -> Self {
        Self::parse(EMBEDDED_ENDPOINTS)
            .unwrap_or_else(|e| panic!("Failed to parse embedded endpoints.toml: {e}"))
    }

    /// Parses an endpoints file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the TOML is malformed or the
    /// configuration is unusable.
    pub fn parse(toml_str: &str) -> Result<Self, SourceError> {
        let mut endpoints: Self = toml::de::from_str(toml_str).map_err(|e| SourceError::Config {
            message: e.to_string(),
        })?;
        if endpoints.locatieserver.base_urls.is_empty() {
            return Err(SourceError::Config {
                message: "locatieserver.base_urls must not be empty".to_string(),
            });
        }
        endpoints.statistics.datasets.sort_by_key(|d| d.year);
        Ok(endpoints)
    }

    /// Loads the file named by [`ENDPOINTS_ENV`], falling back to the
    /// embedded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the override file cannot be read or
    /// parsed.
    pub fn load() -> Result<Self, SourceError> {
        match std::env::var(ENDPOINTS_ENV) {
            Ok(path) if !path.is_empty() => {
                log::info!("Loading endpoints from {path}");
                let contents = std::fs::read_to_string(&path).map_err(|e| SourceError::Config {
                    message: format!("failed to read {path}: {e}"),
                })?;
                Self::parse(&contents)
            }
            _ => Ok(Self::embedded()),
        }
    }

    /// Every base URL in the configuration, labelled, for connectivity
    /// checks.
    #[must_use]
    pub fn all_urls(&self) -> Vec<(String, String)> {
        let mut urls = Vec::new();
        for base in &self.locatieserver.base_urls {
            urls.push(("locatieserver".to_string(), base.clone()));
        }
        urls.push(("statistics".to_string(), self.statistics.base_url.clone()));
        urls.push(("crime".to_string(), self.crime.base_url.clone()));
        urls.push(("boundaries".to_string(), self.boundaries.wfs_url.clone()));
        for mirror in &self.overpass.mirrors {
            urls.push(("overpass".to_string(), mirror.clone()));
        }
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_endpoints_parse() {
        let endpoints = Endpoints::embedded();
        assert_eq!(endpoints.locatieserver.base_urls.len(), 2);
        assert!(endpoints.locatieserver.primary().unwrap().contains("api.pdok.nl"));
        assert_eq!(endpoints.overpass.mirrors.len(), 2);
        assert_eq!(endpoints.overpass.radius_m, 3000);
        assert_eq!(endpoints.pipeline.soft_timeout(), Duration::from_millis(3000));
        assert_eq!(endpoints.crime.dataset_id, "47022NED");
    }

    #[test]
    fn datasets_ascend_by_year() {
        let datasets = Endpoints::embedded().statistics.datasets;
        assert_eq!(datasets.len(), 7);
        assert_eq!(datasets.first().map(|d| d.year), Some(2015));
        assert_eq!(datasets.last().map(|d| d.id.as_str()), Some("85039NED"));
        for window in datasets.windows(2) {
            assert!(window[0].year < window[1].year);
        }
    }

    #[test]
    fn rejects_empty_locatieserver() {
        let toml_str = EMBEDDED_ENDPOINTS.replace(
            "base_urls = [\n  \"https://api.pdok.nl/bzk/locatieserver/search/v3_1\",\n  \"https://geodata.nationaalgeoregister.nl/locatieserver/v3\",\n]",
            "base_urls = []",
        );
        assert!(matches!(
            Endpoints::parse(&toml_str),
            Err(SourceError::Config { .. })
        ));
    }
}
