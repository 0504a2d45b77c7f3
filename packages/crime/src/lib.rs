#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Neighbourhood safety from the monthly police figures.
//!
//! Two operations:
//!
//! - [`CrimeAnalyzer::compute_safety_score`] turns the registered crimes
//!   of the most recent published month into a 0–100 score, normalised
//!   by population when the statistics carry it. Without monthly figures
//!   it falls back to the historical per-1000 indicators of the yearly
//!   statistics.
//! - [`CrimeAnalyzer::fetch_crime_charts`] aggregates the previous
//!   calendar year into monthly totals and per-category totals.

mod charts;

use std::sync::Arc;

use buurt_insight_cache::TtlCache;
use buurt_insight_crime_models::score::{ScoreBasis, monthly_score};
use buurt_insight_crime_models::{PeriodKey, TOTAL_CATEGORY_CODES, is_total_code};
use buurt_insight_models::fields::{RESIDENTS, VANDALISM_AND_PUBLIC_ORDER, VIOLENT_AND_SEXUAL_CRIMES};
use buurt_insight_models::{Diagnostics, PropertyBag, TimestampedValue, YearTag};
use buurt_insight_source::config::CrimeConfig;
use buurt_insight_source::{JsonFetcher, SourceError, odata};
use chrono::Datelike as _;

/// Property bag key of the safety score.
pub const CRIME_SCORE_KEY: &str = "crimeScore";

/// Column holding the number of registered crimes.
const CRIMES_FIELD: &str = "GeregistreerdeMisdrijven_1";

/// Column holding the crime category code.
const CATEGORY_FIELD: &str = "SoortMisdrijf";

/// Column holding the crime category description.
const CATEGORY_DESCRIPTION_FIELD: &str = "SoortMisdrijfOmschrijving";

/// Reads the police dataset.
#[derive(Clone)]
pub struct CrimeAnalyzer {
    fetcher: Arc<dyn JsonFetcher>,
    cache: TtlCache,
    config: CrimeConfig,
}

impl std::fmt::Debug for CrimeAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrimeAnalyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The current calendar year (UTC).
#[must_use]
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

impl CrimeAnalyzer {
    /// Creates an analyzer.
    #[must_use]
    pub fn new(fetcher: Arc<dyn JsonFetcher>, cache: TtlCache, config: CrimeConfig) -> Self {
        Self {
            fetcher,
            cache,
            config,
        }
    }

    /// Computes the safety score for `code`, using `statistics` for the
    /// population and the historical fallback.
    ///
    /// Returns `None` only when neither monthly nor historical figures are
    /// available. When a period was found but no total could be read, the
    /// result carries the period label with a null value.
    pub async fn compute_safety_score(
        &self,
        code: &str,
        statistics: &PropertyBag,
        diag: &mut Diagnostics,
    ) -> Option<TimestampedValue> {
        self.compute_safety_score_at(code, statistics, current_year(), diag)
            .await
    }

    /// Like [`Self::compute_safety_score`] with an explicit current year.
    pub async fn compute_safety_score_at(
        &self,
        code: &str,
        statistics: &PropertyBag,
        current_year: i32,
        diag: &mut Diagnostics,
    ) -> Option<TimestampedValue> {
        let period = self.latest_period_key(current_year, diag).await;
        diag.push(format!(
            "[Crime] latest period {}",
            period.as_ref().map_or("unknown", PeriodKey::as_str)
        ));

        let mut monthly = None;
        if let Some(period) = period {
            let label = YearTag::Period(period.label());
            match self.total_for_period(code, &period, diag).await {
                Some(total) if total >= 0.0 => {
                    let residents = RESIDENTS.number(statistics);
                    let (basis, score) = monthly_score(total, residents);
                    diag.push(format!(
                        "[Crime] crimes={total} residents={} basis={basis} score={score}",
                        residents.map_or_else(|| "unknown".to_string(), |r| r.to_string())
                    ));
                    return Some(TimestampedValue::new(Some(score.into()), label));
                }
                _ => {
                    log::warn!("No monthly crime total for {code} in {period}");
                    monthly = Some(TimestampedValue::new(None, label));
                }
            }
        }

        historical_score(statistics, diag).or(monthly)
    }

    /// Finds the lexicographically greatest period key of the most recent
    /// year (from `current_year` back through the configured look-back)
    /// that has any.
    pub async fn latest_period_key(
        &self,
        current_year: i32,
        diag: &mut Diagnostics,
    ) -> Option<PeriodKey> {
        for year in (current_year - self.config.lookback_years..=current_year).rev() {
            match self
                .period_keys(year, None, self.config.period_timeout())
                .await
            {
                Ok(keys) => {
                    if let Some(latest) = keys.into_iter().max() {
                        return Some(latest);
                    }
                }
                Err(e) => diag.push(format!("[Crime] period {year} failed: {e}")),
            }
        }
        None
    }

    /// Total registered crimes for `code` in `period`.
    ///
    /// Tries each total category code first; otherwise sums every
    /// non-total category of the period.
    pub async fn total_for_period(
        &self,
        code: &str,
        period: &PeriodKey,
        diag: &mut Diagnostics,
    ) -> Option<f64> {
        for total_code in TOTAL_CATEGORY_CODES {
            let filter = format!(
                "{} and {} and {}",
                odata::eq_filter("WijkenEnBuurten", code),
                odata::eq_filter(CATEGORY_FIELD, total_code),
                odata::eq_filter("Perioden", period.as_str()),
            );
            let rows = self
                .typed_rows(&filter, CRIMES_FIELD, "1", self.config.period_timeout())
                .await;
            if let Some(n) = rows
                .ok()
                .and_then(|rows| rows.first().and_then(|row| odata::number(row, CRIMES_FIELD)))
            {
                diag.push(format!("[Crime] total({total_code}) {n}"));
                return Some(n);
            }
        }

        let filter = period_filter(code, period);
        let select = format!("{CATEGORY_FIELD},{CATEGORY_DESCRIPTION_FIELD},{CRIMES_FIELD}");
        match self
            .typed_rows(&filter, &select, "500", self.config.data_timeout())
            .await
        {
            Ok(rows) => {
                let total: f64 = rows
                    .iter()
                    .filter(|row| !is_total_row(row))
                    .filter_map(|row| odata::number(row, CRIMES_FIELD))
                    .sum();
                diag.push(format!("[Crime] total(sum) {total}"));
                Some(total)
            }
            Err(e) => {
                diag.push(format!("[Crime] data error sum: {e}"));
                None
            }
        }
    }

    /// Period keys published for `year`, trimmed and sorted.
    async fn period_keys(
        &self,
        year: i32,
        top: Option<&str>,
        timeout: std::time::Duration,
    ) -> Result<Vec<PeriodKey>, SourceError> {
        let filter = format!("substring(Key,0,4) eq '{year}'");
        let mut params = vec![("$select", "Key"), ("$filter", filter.as_str())];
        if let Some(top) = top {
            params.push(("$top", top));
        }
        params.push(("$format", "json"));

        let url = odata::entity_url(
            &self.config.base_url,
            &self.config.dataset_id,
            "Perioden",
            &params,
        )?;
        let body = self.fetcher.get_json(&url, timeout).await?;
        let mut keys: Vec<PeriodKey> = odata::rows(&body)
            .iter()
            .filter_map(|row| odata::text(row, "Key"))
            .filter(|key| !key.is_empty())
            .map(PeriodKey::new)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// `TypedDataSet` rows matching `filter`.
    async fn typed_rows(
        &self,
        filter: &str,
        select: &str,
        top: &str,
        timeout: std::time::Duration,
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        let url = odata::entity_url(
            &self.config.base_url,
            &self.config.dataset_id,
            "TypedDataSet",
            &[
                ("$filter", filter),
                ("$select", select),
                ("$top", top),
                ("$format", "json"),
            ],
        )?;
        let body = self.fetcher.get_json(&url, timeout).await?;
        Ok(odata::rows(&body).to_vec())
    }
}

/// Score from the historical per-1000 indicators of the yearly
/// statistics: the latest violent/sexual crime value plus the latest
/// vandalism/public order value.
///
/// Tagged with the year of the first available indicator.
#[must_use]
pub fn historical_score(statistics: &PropertyBag, diag: &mut Diagnostics) -> Option<TimestampedValue> {
    let picks: Vec<(&str, &TimestampedValue)> = [VIOLENT_AND_SEXUAL_CRIMES, VANDALISM_AND_PUBLIC_ORDER]
        .iter()
        .filter_map(|alias| alias.latest_number(statistics))
        .collect();

    let described: Vec<String> = picks
        .iter()
        .map(|(key, value)| {
            let year = value.year.as_ref().map(ToString::to_string).unwrap_or_default();
            format!("{key}:{}@{year}", value.as_f64().unwrap_or_default())
        })
        .collect();
    diag.push(format!(
        "[Crime] hist indicators {}",
        if described.is_empty() {
            "none".to_string()
        } else {
            described.join(", ")
        }
    ));

    let (_, first) = picks.first()?;
    let sum: f64 = picks.iter().filter_map(|(_, v)| v.as_f64()).sum();
    let score = ScoreBasis::HistoricalIndicators.score(sum);
    let year = first
        .year
        .as_ref()
        .map(|y| YearTag::Period(y.to_string()));
    diag.push(format!("[Crime] fallback historical score {score}"));
    Some(TimestampedValue {
        value: Some(score.into()),
        year,
    })
}

fn period_filter(code: &str, period: &PeriodKey) -> String {
    format!(
        "{} and {}",
        odata::eq_filter("WijkenEnBuurten", code),
        odata::eq_filter("Perioden", period.as_str()),
    )
}

/// A row is a total when its code is a total code or its description
/// mentions "totaal".
fn is_total_row(row: &serde_json::Value) -> bool {
    odata::text(row, CATEGORY_FIELD).is_some_and(is_total_code)
        || odata::text(row, CATEGORY_DESCRIPTION_FIELD)
            .is_some_and(|d| d.to_lowercase().contains("totaal"))
}
