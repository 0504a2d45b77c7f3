#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Amenity counts and distances around a neighbourhood.
//!
//! The neighbourhood centroid comes from the PDOK WFS boundary layer (or,
//! failing that, from geocoding the listing address). Each
//! [`AmenityCategory`] is then looked up on the Overpass mirrors
//! concurrently and reduced to a count and a rounded mean distance.
//! Centroids and finished bags are cached for a week.

pub mod category;
pub mod overpass;

use std::sync::Arc;

use buurt_insight_cache::{AMENITIES_TTL, CENTROID_TTL, TtlCache, amenities_key, centroid_key};
use buurt_insight_geocoder::Resolver;
use buurt_insight_models::{AmenityStats, Diagnostics, LatLon, PropertyBag, TimestampedValue};
use buurt_insight_source::config::{BoundariesConfig, OverpassConfig};
use buurt_insight_source::{JsonFetcher, SourceError, query};
use buurt_insight_spatial::boundary_centroid;
use futures::future::join_all;
use strum::IntoEnumIterator;

pub use category::AmenityCategory;

/// Looks up amenities around neighbourhoods.
#[derive(Clone)]
pub struct AmenityLocator {
    fetcher: Arc<dyn JsonFetcher>,
    cache: TtlCache,
    resolver: Resolver,
    boundaries: BoundariesConfig,
    overpass: OverpassConfig,
}

impl std::fmt::Debug for AmenityLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmenityLocator")
            .field("boundaries", &self.boundaries)
            .field("overpass", &self.overpass)
            .finish_non_exhaustive()
    }
}

impl AmenityLocator {
    /// Creates a locator. `resolver` is used for the address fallback.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        cache: TtlCache,
        resolver: Resolver,
        boundaries: BoundariesConfig,
        overpass: OverpassConfig,
    ) -> Self {
        Self {
            fetcher,
            cache,
            resolver,
            boundaries,
            overpass,
        }
    }

    /// Amenity count/distance pairs for every category.
    ///
    /// Returns an empty bag (not cached) when no centroid can be found.
    pub async fn fetch_amenities(
        &self,
        code: &str,
        address_query: Option<&str>,
        diag: &mut Diagnostics,
    ) -> PropertyBag {
        let key = amenities_key(code);
        if let Some(bag) = self.cache.get::<PropertyBag>(&key, AMENITIES_TTL) {
            diag.push("[Amenities] cache hit");
            return bag;
        }

        let mut centre = self.neighbourhood_centroid(code, diag).await;
        if let (None, Some(address_query)) = (centre, address_query) {
            diag.push("[Amenities] fallback: geocoding address centroid");
            centre = self.resolver.geocode_address_point(address_query, diag).await;
        }
        let Some(centre) = centre else {
            diag.push("[Amenities] no centroid");
            return PropertyBag::new();
        };

        let lookups = AmenityCategory::iter().map(|category| async move {
            let mut lines = Diagnostics::new();
            let stats = self.category_stats(centre, category, &mut lines).await;
            (category, stats, lines)
        });

        let mut bag = PropertyBag::new();
        for (category, stats, lines) in join_all(lookups).await {
            diag.append(lines);
            bag.insert(
                category.count_key().to_string(),
                TimestampedValue::untagged(Some(stats.count.into())),
            );
            bag.insert(
                category.distance_key().to_string(),
                TimestampedValue::untagged(stats.avg_distance_meters.map(Into::into)),
            );
        }

        self.cache.put(&key, &bag);
        bag
    }

    /// The neighbourhood centroid from its WFS boundary, cached for a week.
    pub async fn neighbourhood_centroid(&self, code: &str, diag: &mut Diagnostics) -> Option<LatLon> {
        let key = centroid_key(code);
        if let Some(centre) = self.cache.get::<LatLon>(&key, CENTROID_TTL) {
            diag.push(format!("[WFS] centroid cache hit for {code}"));
            return Some(centre);
        }

        let body = match self.boundary(code, diag).await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Boundary lookup for {code} failed: {e}");
                diag.push(format!("[WFS] error {e}"));
                return None;
            }
        };
        let Some(geometry) = body
            .get("features")
            .and_then(|f| f.get(0))
            .and_then(|f| f.get("geometry"))
            .filter(|g| !g.is_null())
        else {
            diag.push("[WFS] no features");
            return None;
        };

        let centroid = match boundary_centroid(geometry) {
            Ok(Some(centroid)) => centroid,
            Ok(None) => {
                diag.push("[WFS] boundary has no vertices");
                return None;
            }
            Err(e) => {
                diag.push(format!("[WFS] error {e}"));
                return None;
            }
        };
        if centroid.converted_from_rd {
            diag.push("[WFS] centroid looked like RD; converted to WGS84");
        }
        let centre = centroid.point;
        diag.push(format!("[WFS] centroid {:.6},{:.6}", centre.lat, centre.lon));
        self.cache.put(&key, &centre);
        Some(centre)
    }

    async fn boundary(
        &self,
        code: &str,
        diag: &mut Diagnostics,
    ) -> Result<serde_json::Value, SourceError> {
        let filter = format!("buurtcode='{}'", code.replace('\'', "''"));
        let url = query::build(
            &self.boundaries.wfs_url,
            &[
                ("service", "WFS"),
                ("version", "2.0.0"),
                ("request", "GetFeature"),
                ("typeName", self.boundaries.type_name.as_str()),
                ("srsName", "EPSG:4326"),
                ("outputFormat", "application/json"),
                ("cql_filter", filter.as_str()),
            ],
        )?;
        diag.push(format!("[WFS] request {}", query::decoded(&url)));
        self.fetcher
            .get_json(&url, self.boundaries.timeout())
            .await
    }

    /// Stats for one category from the first mirror that answers.
    /// Every mirror failing yields [`AmenityStats::EMPTY`].
    pub async fn category_stats(
        &self,
        centre: LatLon,
        category: AmenityCategory,
        diag: &mut Diagnostics,
    ) -> AmenityStats {
        let ql = overpass::query(category, centre, self.overpass.radius_m);
        for mirror in &self.overpass.mirrors {
            diag.push(format!("[Overpass] {category} try {mirror}"));
            let result = match query::build(mirror, &[("data", ql.as_str())]) {
                Ok(url) => self.fetcher.get_json(&url, self.overpass.timeout()).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(body) => {
                    let stats = overpass::stats(centre, &body);
                    diag.push(format!(
                        "[Overpass] ok {mirror} {category} count {} avg {:?}",
                        stats.count, stats.avg_distance_meters
                    ));
                    return stats;
                }
                Err(e) => {
                    diag.push(format!("[Overpass] error {mirror} {category} {e}"));
                }
            }
        }
        log::warn!("No Overpass mirror answered for {category}");
        AmenityStats::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buurt_insight_source::config::Endpoints;
    use buurt_insight_source::testing::{Reply, ScriptedFetcher};
    use serde_json::json;

    const CENTRE: LatLon = LatLon {
        lat: 52.0,
        lon: 5.0,
    };

    fn locator(fetcher: ScriptedFetcher) -> (AmenityLocator, Arc<ScriptedFetcher>, TtlCache) {
        let endpoints = Endpoints::embedded();
        let fetcher = Arc::new(fetcher);
        let cache = TtlCache::in_memory();
        let resolver = Resolver::new(fetcher.clone(), endpoints.locatieserver);
        let locator = AmenityLocator::new(
            fetcher.clone(),
            cache.clone(),
            resolver,
            endpoints.boundaries,
            endpoints.overpass,
        );
        (locator, fetcher, cache)
    }

    /// Elements due north of `CENTRE` at whole-metre distances.
    fn elements(distances: &[f64]) -> Reply {
        let metres_per_degree = buurt_insight_spatial::EARTH_RADIUS_M.to_radians();
        let elements: Vec<_> = distances
            .iter()
            .map(|d| json!({ "lat": CENTRE.lat + d / metres_per_degree, "lon": CENTRE.lon }))
            .collect();
        Reply::Json(json!({ "elements": elements }))
    }

    fn boundary() -> Reply {
        Reply::Json(json!({
            "features": [{
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[5.0, 52.0], [5.0, 52.0], [5.0, 52.0], [5.0, 52.0]]]
                }
            }]
        }))
    }

    #[tokio::test]
    async fn school_distances_are_averaged() {
        let (locator, _, _) = locator(
            ScriptedFetcher::new().route(&["\"amenity\"=\"school\""], elements(&[200.0, 450.0, 900.0, 1500.0])),
        );
        let mut diag = Diagnostics::new();

        let stats = locator
            .category_stats(CENTRE, AmenityCategory::School, &mut diag)
            .await;

        assert_eq!(stats.count, 4);
        assert_eq!(stats.avg_distance_meters, Some(763));
    }

    #[tokio::test]
    async fn secondary_mirror_after_primary_fails() {
        let (locator, fetcher, _) = locator(
            ScriptedFetcher::new()
                .route(&["overpass.kumi.systems"], Reply::Status(504))
                .route(&["overpass-api.de"], elements(&[100.0])),
        );
        let mut diag = Diagnostics::new();

        let stats = locator
            .category_stats(CENTRE, AmenityCategory::Cafe, &mut diag)
            .await;

        assert_eq!(stats.count, 1);
        assert_eq!(stats.avg_distance_meters, Some(100));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn failed_category_is_empty() {
        let (locator, _, _) = locator(ScriptedFetcher::new());
        let mut diag = Diagnostics::new();

        let stats = locator
            .category_stats(CENTRE, AmenityCategory::Doctors, &mut diag)
            .await;

        assert_eq!(stats, AmenityStats::EMPTY);
    }

    #[tokio::test]
    async fn builds_and_caches_bag() {
        let (locator, fetcher, cache) = locator(
            ScriptedFetcher::new()
                .route(&["wfs", "cql_filter=buurtcode='BU03630000'"], boundary())
                .route(&["\"amenity\"=\"supermarket\""], elements(&[300.0, 500.0]))
                .route(&["interpreter"], Reply::Json(json!({ "elements": [] }))),
        );
        let mut diag = Diagnostics::new();

        let bag = locator.fetch_amenities("BU03630000", None, &mut diag).await;

        assert_eq!(bag.len(), 14);
        assert_eq!(bag["supermarketsInNeighbourhood"].as_f64(), Some(2.0));
        assert_eq!(bag["avgDistanceToSupermarkets"].as_f64(), Some(400.0));
        assert_eq!(bag["cafesInNeighbourhood"].as_f64(), Some(0.0));
        assert_eq!(bag["avgDistanceToCafes"].value, None);
        assert!(bag.values().all(|v| v.year.is_none()));
        assert_eq!(
            cache.get::<LatLon>(&centroid_key("BU03630000"), CENTROID_TTL),
            Some(CENTRE)
        );

        let before = fetcher.calls().len();
        let again = locator.fetch_amenities("BU03630000", None, &mut diag).await;
        assert_eq!(again, bag);
        assert_eq!(fetcher.calls().len(), before);
    }

    #[tokio::test]
    async fn falls_back_to_address_point() {
        let (locator, fetcher, cache) = locator(
            ScriptedFetcher::new()
                .route(&["wfs"], Reply::Status(503))
                .route(
                    &["/suggest"],
                    Reply::Json(json!({
                        "response": { "docs": [{ "type": "adres", "id": "adr-1" }] }
                    })),
                )
                .route(
                    &["/lookup", "adr-1"],
                    Reply::Json(json!({
                        "response": { "docs": [{ "centroide_ll": "POINT(5 52)" }] }
                    })),
                )
                .route(&["interpreter"], elements(&[250.0])),
        );
        let mut diag = Diagnostics::new();

        let bag = locator
            .fetch_amenities("BU03630000", Some("Damrak 1"), &mut diag)
            .await;

        assert_eq!(bag["schoolsInNeighbourhood"].as_f64(), Some(1.0));
        assert_eq!(bag["avgDistanceToSchools"].as_f64(), Some(250.0));
        assert_eq!(fetcher.calls_matching("/lookup"), 1);
        assert!(
            cache
                .get::<LatLon>(&centroid_key("BU03630000"), CENTROID_TTL)
                .is_none()
        );
    }

    #[tokio::test]
    async fn no_centroid_is_not_cached() {
        let (locator, fetcher, _) = locator(ScriptedFetcher::new());
        let mut diag = Diagnostics::new();

        assert!(locator.fetch_amenities("BU03630000", None, &mut diag).await.is_empty());
        assert!(locator.fetch_amenities("BU03630000", None, &mut diag).await.is_empty());
        assert_eq!(fetcher.calls_matching("wfs"), 2);
        assert_eq!(fetcher.calls_matching("interpreter"), 0);
        assert!(diag.lines().iter().any(|l| l == "[Amenities] no centroid"));
    }
}
