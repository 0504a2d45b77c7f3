#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Postal address → neighbourhood resolution.
//!
//! Resolves a Dutch postal code (and optionally a street address) to the
//! CBS neighbourhood ("buurt") it lies in, using the PDOK Locatieserver:
//!
//! 1. **Suggest + lookup** (only with an address) — every address variant
//!    is sent to `suggest`; address candidates whose postal code matches
//!    are expanded through `lookup` until one carries a neighbourhood code.
//! 2. **Free query chain** — an ordered list of `(query template, endpoint
//!    generation)` candidates evaluated with
//!    [`first_success`](buurt_insight_source::fallback::first_success).
//!    Unreachable endpoints are skipped; an unparseable body aborts.
//!
//! Also geocodes a single address to a point, used by the amenity locator
//! when no neighbourhood boundary is available.

pub mod address;
pub mod locatieserver;

use std::sync::{Arc, Mutex, PoisonError};

use buurt_insight_models::{Diagnostics, LatLon, NeighbourhoodIdentity};
use buurt_insight_source::config::LocatieserverConfig;
use buurt_insight_source::fallback::first_success;
use buurt_insight_source::{JsonFetcher, SourceError, query};
use thiserror::Error;

use crate::locatieserver::{ADDRESS_TYPE, DocMeta};

/// Errors from neighbourhood resolution.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Every candidate was tried without finding a neighbourhood code.
    #[error("No buurtcode found for zipCode {zip_code} in Locatieserver response")]
    NotFound {
        /// The postal code that was resolved.
        zip_code: String,
    },

    /// A free-query response could not be parsed.
    #[error("Failed to fetch neighbourhood meta for zipCode {zip_code}. Additional info: {source}")]
    Malformed {
        /// The postal code that was resolved.
        zip_code: String,
        /// The underlying parse error.
        source: SourceError,
    },
}

/// One `free` query shape.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FreeTemplate {
    q: String,
    fq: String,
    rows: u32,
    note: &'static str,
}

/// A free query template paired with an endpoint generation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FreeCandidate<'a> {
    template: FreeTemplate,
    base: &'a str,
}

/// Resolves addresses through the Locatieserver.
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn JsonFetcher>,
    config: LocatieserverConfig,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(fetcher: Arc<dyn JsonFetcher>, config: LocatieserverConfig) -> Self {
        Self { fetcher, config }
    }

    /// Resolves `zip_code` (and `address_query`, when given) to a
    /// neighbourhood.
    ///
    /// # Errors
    ///
    /// * [`ResolutionError::Malformed`] if a free-query response is not
    ///   JSON.
    /// * [`ResolutionError::NotFound`] if no candidate yields a code.
    pub async fn resolve_neighbourhood(
        &self,
        zip_code: &str,
        address_query: Option<&str>,
        diag: &mut Diagnostics,
    ) -> Result<NeighbourhoodIdentity, ResolutionError> {
        let zip = address::compact_zip(zip_code).to_uppercase();
        let address_query = address_query.map(str::trim).filter(|a| !a.is_empty());

        if let Some(address_query) = address_query {
            if let Some(identity) = self.resolve_via_suggest(&zip, address_query, diag).await {
                return Ok(identity);
            }
        }

        let candidates = self.free_candidates(&zip, address_query);
        let trail = Mutex::new(Diagnostics::new());
        let found = first_success(candidates, |candidate| {
            let trail = &trail;
            async move {
                let mut lines = Diagnostics::new();
                let result = self.try_free_candidate(&candidate, &mut lines).await;
                trail
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .append(lines);
                result
            }
        })
        .await;
        diag.append(trail.into_inner().unwrap_or_else(PoisonError::into_inner));

        match found {
            Ok(Some(identity)) => {
                log::info!("Resolved {zip} to {}", identity.code);
                Ok(identity)
            }
            Ok(None) => {
                let err = ResolutionError::NotFound { zip_code: zip };
                diag.push(format!("[Resolve] {err}"));
                Err(err)
            }
            Err(source) => {
                let err = ResolutionError::Malformed {
                    zip_code: zip,
                    source,
                };
                log::warn!("{err}");
                diag.push(format!("[Resolve] {err}"));
                Err(err)
            }
        }
    }

    /// Geocodes an address to its point via `suggest` and `lookup`.
    ///
    /// Returns `None` (with a diagnostic line) on any failure.
    pub async fn geocode_address_point(
        &self,
        address_query: &str,
        diag: &mut Diagnostics,
    ) -> Option<LatLon> {
        let base = self.config.primary()?;
        let docs = self.suggest(base, address_query, diag).await?;
        let Some(id) = docs
            .iter()
            .find(|d| locatieserver::doc_type(d) == Some(ADDRESS_TYPE))
            .and_then(locatieserver::doc_id)
        else {
            diag.push("[Geo] suggest no adres doc");
            return None;
        };

        let doc = self.lookup(base, id, diag).await?;
        let Some(point) = locatieserver::doc_point(&doc) else {
            diag.push("[Geo] no usable centroide_ll");
            return None;
        };
        diag.push(format!("[Geo] centroid from address {:.6},{:.6}", point.lat, point.lon));
        Some(point)
    }

    async fn resolve_via_suggest(
        &self,
        zip: &str,
        address_query: &str,
        diag: &mut Diagnostics,
    ) -> Option<NeighbourhoodIdentity> {
        let base = self.config.primary()?;
        for variant in address::variants(address_query, zip) {
            let Some(docs) = self.suggest(base, &variant, diag).await else {
                continue;
            };
            let candidates: Vec<&str> = docs
                .iter()
                .filter(|d| locatieserver::doc_type(d) == Some(ADDRESS_TYPE))
                .filter(|d| locatieserver::doc_postcode(d).is_none_or(|p| p == zip))
                .filter_map(locatieserver::doc_id)
                .collect();
            diag.push(format!(
                "[Resolve] suggest '{variant}' → {} candidates",
                candidates.len()
            ));

            for id in candidates {
                let Some(doc) = self.lookup(base, id, diag).await else {
                    continue;
                };
                if let Some(identity) = DocMeta::from_doc(&doc).into_identity() {
                    diag.push(format!("[Resolve] lookup {id} → {}", identity.code));
                    return Some(identity);
                }
            }
        }
        None
    }

    /// Builds the ordered `free` candidate list: template-major,
    /// endpoint-minor.
    fn free_candidates(&self, zip: &str, address_query: Option<&str>) -> Vec<FreeCandidate<'_>> {
        let mut templates = Vec::with_capacity(4);
        if let Some(address_query) = address_query {
            templates.push(FreeTemplate {
                q: address_query.to_string(),
                fq: "type:adres".to_string(),
                rows: 10,
                note: "address",
            });
        }
        templates.push(FreeTemplate {
            q: zip.to_string(),
            fq: format!("type:adres AND postcode:{zip}"),
            rows: 5,
            note: "adres+postcode",
        });
        templates.push(FreeTemplate {
            q: zip.to_string(),
            fq: format!("postcode:{zip}"),
            rows: 5,
            note: "postcode-only",
        });
        templates.push(FreeTemplate {
            q: zip.to_string(),
            fq: "type:adres".to_string(),
            rows: 5,
            note: "adres-generic",
        });

        templates
            .into_iter()
            .flat_map(|template| {
                self.config.base_urls.iter().map(move |base| FreeCandidate {
                    template: template.clone(),
                    base: base.as_str(),
                })
            })
            .collect()
    }

    async fn try_free_candidate(
        &self,
        candidate: &FreeCandidate<'_>,
        diag: &mut Diagnostics,
    ) -> Result<Option<NeighbourhoodIdentity>, SourceError> {
        let template = &candidate.template;
        let rows = template.rows.to_string();
        let url = query::build(
            &format!("{}/free", candidate.base),
            &[
                ("q", template.q.as_str()),
                ("fq", template.fq.as_str()),
                ("rows", rows.as_str()),
                ("fl", self.config.fields.as_str()),
            ],
        )?;

        let body = match self.fetcher.get_json(&url, self.config.timeout()).await {
            Ok(body) => body,
            Err(e) if e.is_malformed() => return Err(e),
            Err(e) => {
                diag.push(format!("[Resolve] free {} skipped: {e}", template.note));
                return Ok(None);
            }
        };

        let docs = locatieserver::docs(&body);
        let Some(selected) = locatieserver::select_doc(docs) else {
            diag.push(format!(
                "[Resolve] free {} on {}: no docs",
                template.note, candidate.base
            ));
            return Ok(None);
        };

        let mut meta = DocMeta::from_doc(selected);
        if !meta.is_complete() {
            if let Some(id) = locatieserver::doc_id(selected) {
                if let Some(full) = self.lookup(candidate.base, id, diag).await {
                    meta.fill_from(DocMeta::from_doc(&full));
                }
            }
        }

        let identity = meta.into_identity();
        if identity.is_none() {
            diag.push(format!(
                "[Resolve] free {} on {}: selected doc has no buurtcode",
                template.note, candidate.base
            ));
        }
        Ok(identity)
    }

    /// Calls `suggest`; failures of any kind yield `None`.
    async fn suggest(
        &self,
        base: &str,
        q: &str,
        diag: &mut Diagnostics,
    ) -> Option<Vec<serde_json::Value>> {
        let url = query::build(&format!("{base}/suggest"), &[("q", q)]).ok()?;
        match self.fetcher.get_json(&url, self.config.timeout()).await {
            Ok(body) => Some(locatieserver::docs(&body).to_vec()),
            Err(e) => {
                diag.push(format!("[Geo] suggest failed: {e}"));
                None
            }
        }
    }

    /// Calls `lookup?id=` and returns the first doc; failures yield `None`.
    async fn lookup(&self, base: &str, id: &str, diag: &mut Diagnostics) -> Option<serde_json::Value> {
        let url = query::build(&format!("{base}/lookup"), &[("id", id)]).ok()?;
        match self.fetcher.get_json(&url, self.config.timeout()).await {
            Ok(body) => locatieserver::docs(&body).first().cloned(),
            Err(e) => {
                diag.push(format!("[Geo] lookup failed: {e}"));
                None
            }
        }
    }
}
