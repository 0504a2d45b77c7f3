#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request and response types of the neighbourhood API.
//!
//! These types are serialized to JSON for the HTTP API and the CLI. They
//! are separate from the pipeline's internal property bag so the caller
//! contract can evolve independently.

use buurt_insight_models::{CrimeChartData, YearTag};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// A neighbourhood lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighbourhoodRequest {
    /// Dutch postal code, with or without the space (`"1011 AB"`).
    pub zip_code: String,
    /// Street address of the listing, used for precise resolution and the
    /// amenity centroid fallback.
    #[serde(default)]
    pub address_query: Option<String>,
    /// Attach the diagnostic trail to the response.
    #[serde(default)]
    pub debug: bool,
    /// Names of the properties shown on the badge and card. The default
    /// selection applies when absent.
    #[serde(default)]
    pub selected_properties: Option<Vec<String>>,
}

/// Display group of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PropertyGroup {
    /// Identity values shown on the badge but not in the table.
    DoNotShowInTable,
    Safety,
    Amenities,
    YearBuilt,
    Income,
    ResidentsAge,
    ResidentsMaritalStatus,
    HouseholdType,
    PropertyOwnership,
    BuildingType,
    ImmigrationBackground,
}

/// One rendered property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighbourhoodProperty {
    /// Catalog name, e.g. `"meanIncomePerResident"`.
    pub name: String,
    /// Display group.
    pub group: PropertyGroup,
    /// Formatted value (`"45%"`, `"€ 32.400"`, `"No info"`) or the raw
    /// value for identity properties.
    pub value: serde_json::Value,
    /// Dataset year or period the value was measured in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<YearTag>,
}

/// The three views of a neighbourhood.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyViews {
    /// Selected properties.
    pub badge_properties: Vec<NeighbourhoodProperty>,
    /// Every available property.
    pub table_properties: Vec<NeighbourhoodProperty>,
    /// Selected properties without the identity-only group.
    pub card_properties: Vec<NeighbourhoodProperty>,
}

/// The initial answer to a [`NeighbourhoodRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighbourhoodResponse {
    /// Badge, table and card views.
    #[serde(flatten)]
    pub views: PropertyViews,
    /// Crime charts, when they were ready in time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crime_data: Option<CrimeChartData>,
    /// Diagnostic trail, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Vec<String>>,
    /// Resolution failure message. All views are empty when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NeighbourhoodResponse {
    /// A response carrying only an error.
    #[must_use]
    pub fn failed(error: impl Into<String>, debug_info: Option<Vec<String>>) -> Self {
        Self {
            error: Some(error.into()),
            debug_info,
            ..Self::default()
        }
    }
}

/// Sent once after the initial response when a slow branch finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LateUpdate {
    /// Card view recomputed with the late values.
    pub card_properties: Vec<NeighbourhoodProperty>,
    /// Crime charts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crime_data: Option<CrimeChartData>,
    /// Diagnostic lines of the late branches, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Vec<String>>,
}

/// Events of the streaming endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum StreamEvent {
    /// The initial response.
    Response(NeighbourhoodResponse),
    /// The late update.
    LateUpdate(LateUpdate),
}

impl StreamEvent {
    /// The SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Response(_) => "response",
            Self::LateUpdate(_) => "lateUpdate",
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}
