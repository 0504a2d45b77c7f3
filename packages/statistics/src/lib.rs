#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Multi-year neighbourhood statistics.
//!
//! CBS publishes one "Kerncijfers wijken en buurten" table per year. For a
//! neighbourhood code every configured year is requested concurrently;
//! each answering year contributes its non-null fields tagged with the
//! year, and years are merged in ascending order so the most recent
//! populated value of a field wins.

use std::sync::Arc;

use buurt_insight_models::{Diagnostics, PropertyBag, TimestampedValue, merge_bags};
use buurt_insight_source::config::{DatasetYear, StatisticsConfig};
use buurt_insight_source::{JsonFetcher, SourceError, odata};
use futures::future::join_all;

/// Fetches and merges the yearly statistics tables.
#[derive(Clone)]
pub struct StatisticsAggregator {
    fetcher: Arc<dyn JsonFetcher>,
    config: StatisticsConfig,
}

impl std::fmt::Debug for StatisticsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsAggregator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StatisticsAggregator {
    /// Creates an aggregator.
    #[must_use]
    pub fn new(fetcher: Arc<dyn JsonFetcher>, config: StatisticsConfig) -> Self {
        Self { fetcher, config }
    }

    /// Returns every populated field across all years for `code`, each
    /// tagged with the year it came from.
    ///
    /// A year whose request fails or that has no row for the code is
    /// skipped with a diagnostic line.
    pub async fn fetch_statistics(&self, code: &str, diag: &mut Diagnostics) -> PropertyBag {
        let mut datasets = self.config.datasets.clone();
        datasets.sort_by_key(|d| d.year);

        let results = join_all(datasets.iter().map(|dataset| self.fetch_year(dataset, code))).await;

        let mut bags = Vec::with_capacity(results.len());
        for (dataset, result) in datasets.iter().zip(results) {
            match result {
                Ok(Some(row)) => {
                    let bag = process_year(dataset.year, &row);
                    diag.push(format!(
                        "[Stats] {} ({}): {} fields",
                        dataset.year,
                        dataset.id,
                        bag.len()
                    ));
                    bags.push(bag);
                }
                Ok(None) => {
                    diag.push(format!("[Stats] {} ({}): no row for {code}", dataset.year, dataset.id));
                }
                Err(e) => {
                    log::warn!("Statistics {} ({}) failed for {code}: {e}", dataset.year, dataset.id);
                    diag.push(format!("[Stats] {} ({}): {e}", dataset.year, dataset.id));
                }
            }
        }

        merge_bags(bags)
    }

    async fn fetch_year(
        &self,
        dataset: &DatasetYear,
        code: &str,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, SourceError> {
        let filter = odata::eq_filter("WijkenEnBuurten", code);
        let url = odata::entity_url(
            &self.config.base_url,
            &dataset.id,
            "TypedDataSet",
            &[("$filter", filter.as_str())],
        )?;
        let body = self.fetcher.get_json(&url, self.config.timeout()).await?;
        Ok(odata::rows(&body)
            .first()
            .and_then(serde_json::Value::as_object)
            .cloned())
    }
}

/// Drops null fields from one year's row and tags the rest with `year`.
#[must_use]
pub fn process_year(year: i32, row: &serde_json::Map<String, serde_json::Value>) -> PropertyBag {
    row.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), TimestampedValue::new(Some(value.clone()), year)))
        .collect()
}
