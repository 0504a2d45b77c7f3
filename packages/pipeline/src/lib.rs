#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Neighbourhood lookup orchestration.
//!
//! A lookup resolves the postal code, awaits the yearly statistics and the
//! safety score, then runs the amenity search and the crime charts as
//! spawned tasks raced against a soft deadline. Whatever is ready by the
//! deadline goes into the initial response. Branches that miss it keep
//! running and feed a single [`LateUpdate`] delivered through
//! [`Lookup::late_update`].

pub mod properties;

use std::sync::Arc;
use std::time::Duration;

use buurt_insight_amenities::AmenityLocator;
use buurt_insight_cache::TtlCache;
use buurt_insight_crime::{CRIME_SCORE_KEY, CrimeAnalyzer};
use buurt_insight_geocoder::Resolver;
use buurt_insight_models::{
    CrimeChartData, Diagnostics, NeighbourhoodIdentity, PropertyBag, TimestampedValue, merge_bags,
};
use buurt_insight_server_models::{LateUpdate, NeighbourhoodRequest, NeighbourhoodResponse};
use buurt_insight_source::JsonFetcher;
use buurt_insight_source::config::Endpoints;
use buurt_insight_statistics::StatisticsAggregator;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::properties::build_views;

/// Result of [`Pipeline::lookup`].
#[derive(Debug)]
pub struct Lookup {
    /// The initial response.
    pub response: NeighbourhoodResponse,
    /// Receives the late update when a branch missed the soft deadline.
    pub late_update: Option<oneshot::Receiver<LateUpdate>>,
}

/// Wires the resolver, the statistics, crime and amenity components.
#[derive(Clone)]
pub struct Pipeline {
    resolver: Resolver,
    statistics: StatisticsAggregator,
    crime: Arc<CrimeAnalyzer>,
    amenities: Arc<AmenityLocator>,
    soft_timeout: Duration,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("soft_timeout", &self.soft_timeout)
            .finish_non_exhaustive()
    }
}

type Task<T> = JoinHandle<(T, Diagnostics)>;

/// A spawned branch after the soft deadline.
enum Branch<T> {
    Ready(T),
    Late(Task<T>),
}

impl<T: Default> Branch<T> {
    /// Waits for `task` until `deadline`.
    async fn settle(mut task: Task<T>, deadline: Instant, name: &str, diag: &mut Diagnostics) -> Self {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(joined) => Self::Ready(finish(joined, name, diag)),
            Err(_) => {
                diag.push(format!("[Pipeline] {name} not ready at soft deadline"));
                Self::Late(task)
            }
        }
    }

    const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Late(_) => None,
        }
    }

    const fn is_late(&self) -> bool {
        matches!(self, Self::Late(_))
    }

    async fn resolve(self, name: &str, diag: &mut Diagnostics) -> T {
        match self {
            Self::Ready(value) => value,
            Self::Late(task) => finish(task.await, name, diag),
        }
    }
}

/// A panicked or cancelled branch contributes its default value.
fn finish<T: Default>(joined: Result<(T, Diagnostics), JoinError>, name: &str, diag: &mut Diagnostics) -> T {
    match joined {
        Ok((value, lines)) => {
            diag.append(lines);
            value
        }
        Err(e) => {
            log::error!("{name} task failed: {e}");
            diag.push(format!("[Pipeline] {name} failed: {e}"));
            T::default()
        }
    }
}

impl Pipeline {
    /// Creates a pipeline from its components.
    #[must_use]
    pub fn new(
        resolver: Resolver,
        statistics: StatisticsAggregator,
        crime: CrimeAnalyzer,
        amenities: AmenityLocator,
        soft_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            statistics,
            crime: Arc::new(crime),
            amenities: Arc::new(amenities),
            soft_timeout,
        }
    }

    /// Creates a pipeline whose components share `fetcher` and `cache`.
    #[must_use]
    pub fn from_endpoints(fetcher: Arc<dyn JsonFetcher>, cache: TtlCache, endpoints: &Endpoints) -> Self {
        let resolver = Resolver::new(fetcher.clone(), endpoints.locatieserver.clone());
        Self::new(
            resolver.clone(),
            StatisticsAggregator::new(fetcher.clone(), endpoints.statistics.clone()),
            CrimeAnalyzer::new(fetcher.clone(), cache.clone(), endpoints.crime.clone()),
            AmenityLocator::new(
                fetcher,
                cache,
                resolver,
                endpoints.boundaries.clone(),
                endpoints.overpass.clone(),
            ),
            endpoints.pipeline.soft_timeout(),
        )
    }

    /// Runs a lookup.
    ///
    /// Never fails: a resolution failure is reported in
    /// [`NeighbourhoodResponse::error`] with empty views, and every other
    /// gap leaves its properties out of the bag.
    pub async fn lookup(&self, request: &NeighbourhoodRequest) -> Lookup {
        let mut diag = Diagnostics::new();
        let debug_info = |diag: Diagnostics| request.debug.then(|| diag.into_lines());

        let identity = match self
            .resolver
            .resolve_neighbourhood(&request.zip_code, request.address_query.as_deref(), &mut diag)
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                log::warn!("Lookup for {} failed: {e}", request.zip_code);
                return Lookup {
                    response: NeighbourhoodResponse::failed(e.to_string(), debug_info(diag)),
                    late_update: None,
                };
            }
        };
        let code = identity.code.clone();

        let statistics = self.statistics.fetch_statistics(&code, &mut diag).await;
        let crime_score = self
            .crime
            .compute_safety_score(&code, &statistics, &mut diag)
            .await;
        let base = base_bag(&identity, statistics, crime_score);

        let deadline = Instant::now() + self.soft_timeout;
        let amenities = self.spawn_amenities(&code, request.address_query.clone());
        let charts = self.spawn_charts(&code);
        let amenities = Branch::settle(amenities, deadline, "amenities", &mut diag).await;
        let charts = Branch::settle(charts, deadline, "crime charts", &mut diag).await;

        let bag = merge_bags([base.clone(), amenities.ready().cloned().unwrap_or_default()]);
        let views = build_views(&bag, request.selected_properties.as_deref());
        log::debug!(
            "Lookup for {code}: {} table properties, amenities late={}, charts late={}",
            views.table_properties.len(),
            amenities.is_late(),
            charts.is_late()
        );

        let response = NeighbourhoodResponse {
            views,
            crime_data: charts.ready().cloned().flatten(),
            debug_info: debug_info(diag),
            error: None,
        };

        let late_update = (amenities.is_late() || charts.is_late()).then(|| {
            let (tx, rx) = oneshot::channel();
            let selection = request.selected_properties.clone();
            let debug = request.debug;
            tokio::spawn(async move {
                let mut lines = Diagnostics::new();
                let amenities = amenities.resolve("amenities", &mut lines).await;
                let crime_data = charts.resolve("crime charts", &mut lines).await;
                let bag = merge_bags([base, amenities]);
                let views = build_views(&bag, selection.as_deref());
                let update = LateUpdate {
                    card_properties: views.card_properties,
                    crime_data,
                    debug_info: debug.then(|| lines.into_lines()),
                };
                if tx.send(update).is_err() {
                    log::debug!("Late update for {code} dropped: receiver gone");
                }
            });
            rx
        });

        Lookup {
            response,
            late_update,
        }
    }

    fn spawn_amenities(&self, code: &str, address_query: Option<String>) -> Task<PropertyBag> {
        let amenities = Arc::clone(&self.amenities);
        let code = code.to_string();
        tokio::spawn(async move {
            let mut lines = Diagnostics::new();
            let bag = amenities
                .fetch_amenities(&code, address_query.as_deref(), &mut lines)
                .await;
            (bag, lines)
        })
    }

    fn spawn_charts(&self, code: &str) -> Task<Option<CrimeChartData>> {
        let crime = Arc::clone(&self.crime);
        let code = code.to_string();
        tokio::spawn(async move {
            let mut lines = Diagnostics::new();
            let charts = crime.fetch_crime_charts(&code, &mut lines).await;
            (charts, lines)
        })
    }
}

/// Identity names, statistics and the safety score.
fn base_bag(
    identity: &NeighbourhoodIdentity,
    statistics: PropertyBag,
    crime_score: Option<TimestampedValue>,
) -> PropertyBag {
    let mut names = PropertyBag::new();
    names.insert(
        "neighbourhoodName".to_string(),
        TimestampedValue::untagged(identity.name.clone().map(Into::into)),
    );
    names.insert(
        "municipalityName".to_string(),
        TimestampedValue::untagged(identity.municipality_name.clone().map(Into::into)),
    );

    let mut bag = merge_bags([names, statistics]);
    if let Some(score) = crime_score {
        bag.insert(CRIME_SCORE_KEY.to_string(), score);
    }
    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use buurt_insight_server_models::NeighbourhoodProperty;
    use buurt_insight_source::testing::{Reply, ScriptedFetcher};
    use serde_json::json;

    const SLOW: Duration = Duration::from_millis(400);

    fn value(rows: serde_json::Value) -> Reply {
        Reply::Json(json!({ "value": rows }))
    }

    fn pipeline(fetcher: ScriptedFetcher, soft_timeout: Duration) -> (Pipeline, Arc<ScriptedFetcher>) {
        let mut endpoints = Endpoints::embedded();
        endpoints.pipeline.soft_timeout_ms = u64::try_from(soft_timeout.as_millis()).unwrap();
        let fetcher = Arc::new(fetcher);
        let pipeline = Pipeline::from_endpoints(fetcher.clone(), TtlCache::in_memory(), &endpoints);
        (pipeline, fetcher)
    }

    /// Resolver, statistics and crime routes answering immediately.
    fn core_routes() -> ScriptedFetcher {
        core_routes_after(ScriptedFetcher::new())
    }

    /// [`core_routes`] behind the routes already on `fetcher`.
    fn core_routes_after(fetcher: ScriptedFetcher) -> ScriptedFetcher {
        fetcher
            .route(
                &["v3_1/free", "fq=type:adres AND postcode:1011AB"],
                Reply::Json(json!({ "response": { "docs": [{
                    "id": "adr-1",
                    "type": "adres",
                    "buurtcode": "BU03630000",
                    "buurtnaam": "Nieuwmarkt",
                    "gemeentenaam": "Amsterdam",
                }] } })),
            )
            .route(
                &["85039NED/TypedDataSet"],
                value(json!([{
                    "AantalInwoners_5": 1000,
                    "GemiddeldInkomenPerInwoner_66": 32.4,
                }])),
            )
            .route(&["47022NED/Perioden"], value(json!([{ "Key": "2025MM03" }])))
            .route(
                &["47022NED/TypedDataSet", "SoortMisdrijf eq '0.0.0'"],
                value(json!([{ "GeregistreerdeMisdrijven_1": 6 }])),
            )
            .route(
                &["47022NED/TypedDataSet"],
                value(json!([{ "SoortMisdrijf": "1.1.1", "GeregistreerdeMisdrijven_1": 4 }])),
            )
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

    fn request() -> NeighbourhoodRequest {
        NeighbourhoodRequest {
            zip_code: "1011 AB".into(),
            selected_properties: Some(vec![
                "neighbourhoodName".into(),
                "crimeScore".into(),
                "meanIncomePerResident".into(),
                "schoolsInNeighbourhood".into(),
            ]),
            ..NeighbourhoodRequest::default()
        }
    }

    fn card_value<'a>(cards: &'a [NeighbourhoodProperty], name: &str) -> Option<&'a serde_json::Value> {
        cards.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    #[tokio::test]
    async fn resolution_failure_is_reported() {
        let (pipeline, fetcher) = pipeline(
            ScriptedFetcher::new().route(&["/free"], Reply::Json(json!({ "response": { "docs": [] } }))),
            Duration::from_secs(3),
        );

        let lookup = pipeline
            .lookup(&NeighbourhoodRequest {
                debug: true,
                ..request()
            })
            .await;

        assert_eq!(
            lookup.response.error.as_deref(),
            Some("No buurtcode found for zipCode 1011AB in Locatieserver response")
        );
        assert!(lookup.response.views.table_properties.is_empty());
        assert!(lookup.response.debug_info.is_some_and(|lines| !lines.is_empty()));
        assert!(lookup.late_update.is_none());
        assert_eq!(fetcher.calls_matching("TypedDataSet"), 0);
    }

    #[tokio::test]
    async fn merges_every_branch_when_in_time() {
        let (pipeline, _) = pipeline(
            core_routes()
                .route(&["wfs"], boundary())
                .route(&["\"amenity\"=\"school\""], Reply::Json(json!({ "elements": [{ "lat": 52.0, "lon": 5.0 }] })))
                .route(&["interpreter"], Reply::Json(json!({ "elements": [] }))),
            Duration::from_secs(3),
        );

        let lookup = pipeline.lookup(&request()).await;
        let response = lookup.response;

        assert_eq!(response.error, None);
        assert_eq!(response.debug_info, None);
        assert!(lookup.late_update.is_none());

        let cards = &response.views.card_properties;
        assert_eq!(card_value(cards, "crimeScore"), Some(&json!("40/100")));
        assert_eq!(card_value(cards, "meanIncomePerResident"), Some(&json!("€ 32.400")));
        assert_eq!(card_value(cards, "schoolsInNeighbourhood"), Some(&json!("1")));
        assert_eq!(card_value(cards, "neighbourhoodName"), None);

        let badge = &response.views.badge_properties;
        assert_eq!(card_value(badge, "neighbourhoodName"), Some(&json!("Nieuwmarkt")));

        let charts = response.crime_data.unwrap();
        assert_eq!(charts.monthly.len(), 1);
        assert_eq!(charts.by_type[0].total, 4);
    }

    #[tokio::test]
    async fn slow_amenities_arrive_as_late_update() {
        let (pipeline, _) = pipeline(
            core_routes()
                .route(&["wfs"], boundary())
                .route_delayed(
                    &["\"amenity\"=\"school\""],
                    Reply::Json(json!({ "elements": [{ "lat": 52.0, "lon": 5.0 }] })),
                    SLOW,
                )
                .route(&["interpreter"], Reply::Json(json!({ "elements": [] }))),
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let lookup = pipeline.lookup(&request()).await;

        assert!(started.elapsed() < SLOW);
        let cards = &lookup.response.views.card_properties;
        assert_eq!(card_value(cards, "crimeScore"), Some(&json!("40/100")));
        assert_eq!(card_value(cards, "schoolsInNeighbourhood"), None);
        assert!(
            !lookup
                .response
                .views
                .table_properties
                .iter()
                .any(|p| p.name == "avgDistanceToSchools")
        );

        let update = lookup.late_update.unwrap().await.unwrap();
        assert!(started.elapsed() >= SLOW);
        assert_eq!(card_value(&update.card_properties, "schoolsInNeighbourhood"), Some(&json!("1")));
        assert_eq!(card_value(&update.card_properties, "crimeScore"), Some(&json!("40/100")));
        assert!(update.crime_data.is_some());
    }

    /// Only the chart branch asks for periods with `$top=100`.
    fn slow_chart_periods(fetcher: ScriptedFetcher) -> ScriptedFetcher {
        fetcher.route_delayed(
            &["47022NED/Perioden", "$top=100"],
            value(json!([{ "Key": "2025MM03" }])),
            SLOW,
        )
    }

    #[tokio::test]
    async fn slow_crime_charts_arrive_as_late_update() {
        let (pipeline, _) = pipeline(
            core_routes_after(slow_chart_periods(ScriptedFetcher::new()))
                .route(&["wfs"], boundary())
                .route(&["\"amenity\"=\"school\""], Reply::Json(json!({ "elements": [{ "lat": 52.0, "lon": 5.0 }] })))
                .route(&["interpreter"], Reply::Json(json!({ "elements": [] }))),
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let lookup = pipeline
            .lookup(&NeighbourhoodRequest {
                debug: true,
                ..request()
            })
            .await;

        assert!(started.elapsed() < SLOW);
        let response = lookup.response;
        assert_eq!(response.crime_data, None);
        assert_eq!(card_value(&response.views.card_properties, "schoolsInNeighbourhood"), Some(&json!("1")));
        assert!(
            response
                .debug_info
                .unwrap()
                .iter()
                .any(|line| line == "[Pipeline] crime charts not ready at soft deadline")
        );

        let update = lookup.late_update.unwrap().await.unwrap();
        assert!(started.elapsed() >= SLOW);
        let charts = update.crime_data.unwrap();
        assert_eq!(charts.monthly.len(), 1);
        assert_eq!(charts.by_type[0].total, 4);
        assert_eq!(card_value(&update.card_properties, "schoolsInNeighbourhood"), Some(&json!("1")));
        assert!(
            update
                .debug_info
                .unwrap()
                .iter()
                .any(|line| line.starts_with("[Crime] periods for "))
        );
    }

    #[tokio::test]
    async fn both_slow_branches_share_one_late_update() {
        let (pipeline, _) = pipeline(
            core_routes_after(slow_chart_periods(ScriptedFetcher::new()))
                .route(&["wfs"], boundary())
                .route_delayed(
                    &["\"amenity\"=\"school\""],
                    Reply::Json(json!({ "elements": [{ "lat": 52.0, "lon": 5.0 }] })),
                    SLOW,
                )
                .route(&["interpreter"], Reply::Json(json!({ "elements": [] }))),
            Duration::from_millis(50),
        );

        let lookup = pipeline.lookup(&request()).await;

        let response = lookup.response;
        assert_eq!(response.crime_data, None);
        assert_eq!(card_value(&response.views.card_properties, "schoolsInNeighbourhood"), None);
        assert_eq!(card_value(&response.views.card_properties, "crimeScore"), Some(&json!("40/100")));

        let update = lookup.late_update.unwrap().await.unwrap();
        assert!(update.crime_data.is_some());
        assert_eq!(card_value(&update.card_properties, "schoolsInNeighbourhood"), Some(&json!("1")));
        assert_eq!(update.debug_info, None);
    }

    #[tokio::test]
    async fn missing_centroid_leaves_amenities_out() {
        let (pipeline, fetcher) = pipeline(core_routes(), Duration::from_secs(3));

        let lookup = pipeline.lookup(&request()).await;

        assert!(lookup.late_update.is_none());
        assert_eq!(card_value(&lookup.response.views.card_properties, "schoolsInNeighbourhood"), None);
        assert_eq!(fetcher.calls_matching("interpreter"), 0);
    }
}
