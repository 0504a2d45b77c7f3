//! Year-long crime chart aggregation.

use std::collections::BTreeMap;

use buurt_insight_cache::{CRIME_TYPE_TITLES_KEY, CRIME_TYPE_TITLES_TTL};
use buurt_insight_crime_models::{PeriodKey, is_total_code, strip_code_prefix};
use buurt_insight_models::{CrimeChartData, CrimeTypeTotal, Diagnostics, MonthlyCrimeTotal};
use buurt_insight_source::odata;
use futures::future::join_all;

use crate::{CATEGORY_FIELD, CRIMES_FIELD, CrimeAnalyzer, current_year, period_filter};

/// Category code → display title.
type CrimeTypeTitles = BTreeMap<String, String>;

impl CrimeAnalyzer {
    /// Chart data for the previous calendar year, or `None` when the
    /// dataset has no monthly periods for it.
    pub async fn fetch_crime_charts(&self, code: &str, diag: &mut Diagnostics) -> Option<CrimeChartData> {
        self.fetch_crime_charts_for_year(code, current_year() - 1, diag)
            .await
    }

    /// Chart data for `year`.
    pub async fn fetch_crime_charts_for_year(
        &self,
        code: &str,
        year: i32,
        diag: &mut Diagnostics,
    ) -> Option<CrimeChartData> {
        let keys = match self
            .period_keys(year, Some("100"), self.config.data_timeout())
            .await
        {
            Ok(keys) => keys.into_iter().filter(PeriodKey::is_monthly).collect::<Vec<_>>(),
            Err(e) => {
                diag.push(format!("[Crime] year periods {year} failed: {e}"));
                return None;
            }
        };
        let (first, last) = (keys.first()?, keys.last()?);
        diag.push(format!(
            "[Crime] periods for {year}: {first}..{last} ({})",
            keys.len()
        ));

        let monthly = self.monthly_totals(code, &keys, diag).await;
        let by_type = self.category_totals(code, &keys, diag).await;

        Some(CrimeChartData {
            monthly,
            by_type,
            year,
        })
    }

    /// Total per period, fetched concurrently, in key order. A failed
    /// period counts as zero.
    async fn monthly_totals(
        &self,
        code: &str,
        keys: &[PeriodKey],
        diag: &mut Diagnostics,
    ) -> Vec<MonthlyCrimeTotal> {
        let results = join_all(keys.iter().map(|key| self.period_rows(code, key))).await;

        keys.iter()
            .zip(results)
            .map(|(key, rows)| {
                let total = match rows {
                    Ok(rows) => period_total(&rows),
                    Err(e) => {
                        diag.push(format!("[Crime] monthly error {key}: {e}"));
                        0
                    }
                };
                MonthlyCrimeTotal {
                    period: key.label(),
                    key: key.as_str().to_string(),
                    total,
                }
            })
            .collect()
    }

    /// Totals per category across all `keys`, highest first, labelled
    /// from the category dictionary.
    async fn category_totals(
        &self,
        code: &str,
        keys: &[PeriodKey],
        diag: &mut Diagnostics,
    ) -> Vec<CrimeTypeTotal> {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for key in keys {
            let rows = match self.period_rows(code, key).await {
                Ok(rows) => rows,
                Err(e) => {
                    diag.push(format!("[Crime] byType error {key}: {e}"));
                    continue;
                }
            };
            for row in &rows {
                let Some(category) = odata::text(row, CATEGORY_FIELD) else {
                    continue;
                };
                if category.is_empty() || is_total_code(category) {
                    continue;
                }
                *totals.entry(category.to_string()).or_default() += crime_count(row);
            }
        }

        let titles = self.crime_type_titles(diag).await;
        let mut by_type: Vec<CrimeTypeTotal> = totals
            .into_iter()
            .map(|(key, total)| {
                let title = titles.get(&key).map_or(key.as_str(), String::as_str);
                let stripped = strip_code_prefix(title);
                CrimeTypeTotal {
                    label: if stripped.is_empty() { title } else { stripped }.to_string(),
                    key,
                    total,
                }
            })
            .collect();
        by_type.sort_by(|a, b| b.total.cmp(&a.total));
        by_type
    }

    async fn period_rows(
        &self,
        code: &str,
        key: &PeriodKey,
    ) -> Result<Vec<serde_json::Value>, buurt_insight_source::SourceError> {
        let select = format!("{CATEGORY_FIELD},{CRIMES_FIELD}");
        self.typed_rows(
            &period_filter(code, key),
            &select,
            "500",
            self.config.data_timeout(),
        )
        .await
    }

    /// The category dictionary, cached for 30 days. A failed fetch yields
    /// an empty dictionary and is not cached.
    async fn crime_type_titles(&self, diag: &mut Diagnostics) -> CrimeTypeTitles {
        if let Some(titles) = self
            .cache
            .get::<CrimeTypeTitles>(CRIME_TYPE_TITLES_KEY, CRIME_TYPE_TITLES_TTL)
        {
            return titles;
        }

        let url = match odata::entity_url(
            &self.config.base_url,
            &self.config.dataset_id,
            "SoortMisdrijf",
            &[("$select", "Key,Title"), ("$top", "1000"), ("$format", "json")],
        ) {
            Ok(url) => url,
            Err(e) => {
                diag.push(format!("[Crime] dict error {e}"));
                return CrimeTypeTitles::new();
            }
        };

        match self.fetcher.get_json(&url, self.config.data_timeout()).await {
            Ok(body) => {
                let titles: CrimeTypeTitles = odata::rows(&body)
                    .iter()
                    .filter_map(|row| {
                        let key = odata::text(row, "Key").filter(|k| !k.is_empty())?;
                        let title = odata::text(row, "Title")
                            .filter(|t| !t.is_empty())
                            .unwrap_or(key);
                        Some((key.to_string(), title.to_string()))
                    })
                    .collect();
                self.cache.put(CRIME_TYPE_TITLES_KEY, &titles);
                titles
            }
            Err(e) => {
                diag.push(format!("[Crime] dict error {e}"));
                CrimeTypeTitles::new()
            }
        }
    }
}

/// The explicit total row of a period, else the sum of its categories.
fn period_total(rows: &[serde_json::Value]) -> u64 {
    let total_row = rows.iter().find(|row| {
        odata::text(row, CATEGORY_FIELD).is_some_and(is_total_code)
            && odata::number(row, CRIMES_FIELD).is_some()
    });
    if let Some(row) = total_row {
        return crime_count(row);
    }
    rows.iter()
        .filter(|row| !odata::text(row, CATEGORY_FIELD).is_some_and(is_total_code))
        .map(crime_count)
        .sum()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn crime_count(row: &serde_json::Value) -> u64 {
    odata::number(row, CRIMES_FIELD).map_or(0, |n| n.max(0.0).round() as u64)
}
