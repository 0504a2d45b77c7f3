#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry helpers for the amenity locator.
//!
//! Turns a neighbourhood boundary served by the PDOK WFS into a single
//! WGS84 point, and measures great-circle distances from that point.
//!
//! The centroid is the unweighted average of the exterior ring vertices of
//! every polygon, not the area centroid. Boundaries that come back in RD
//! New (EPSG:28992) despite requesting EPSG:4326 are detected by their
//! magnitude and converted with the approximate Amersfoort-referenced
//! formula.

use buurt_insight_models::LatLon;
use geo::{Coord, Distance, Haversine, MultiPolygon, Point};
use thiserror::Error;

/// Mean earth radius used for bounding boxes, in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// RD New origin (Amersfoort) in projected metres.
const RD_X0: f64 = 155_000.0;
const RD_Y0: f64 = 463_000.0;

/// Errors from boundary parsing.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The geometry object could not be deserialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The geometry is not valid `GeoJSON`.
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    /// The geometry is valid but not an area.
    #[error("Unsupported boundary geometry type '{kind}'")]
    Unsupported {
        /// The `GeoJSON` `type` member.
        kind: String,
    },
}

/// Where a boundary centroid came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryCentroid {
    /// The centroid in WGS84.
    pub point: LatLon,
    /// Whether the vertices were RD New and had to be converted.
    pub converted_from_rd: bool,
}

/// Parses a `GeoJSON` `Polygon` or `MultiPolygon` geometry object.
///
/// # Errors
///
/// * [`SpatialError::Json`] or [`SpatialError::GeoJson`] if `geometry` is
///   not a `GeoJSON` geometry.
/// * [`SpatialError::Unsupported`] for any other geometry type.
pub fn parse_area(geometry: &serde_json::Value) -> Result<MultiPolygon<f64>, SpatialError> {
    let kind = geometry
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let geom: geojson::Geometry = serde_json::from_value(geometry.clone())?;
    let geom: geo::Geometry<f64> = geom.try_into()?;

    match geom {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        _ => Err(SpatialError::Unsupported { kind }),
    }
}

/// Unweighted mean of the exterior ring vertices of every polygon.
///
/// The closing vertex of each ring is counted like any other. Returns
/// `None` when there are no vertices.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn vertex_centroid(area: &MultiPolygon<f64>) -> Option<Coord<f64>> {
    let (sum, n) = area
        .iter()
        .flat_map(|polygon| polygon.exterior().coords())
        .fold((Coord { x: 0.0, y: 0.0 }, 0_usize), |(sum, n), c| {
            (sum + *c, n + 1)
        });
    (n > 0).then(|| sum / n as f64)
}

/// Whether `c` (x = longitude, y = latitude) lies outside the WGS84
/// range and must be projected metres.
#[must_use]
pub fn looks_projected(c: Coord<f64>) -> bool {
    c.x.abs() > 180.0 || c.y.abs() > 90.0
}

/// Approximate RD New → WGS84 conversion.
///
/// Accurate enough to position a centroid, not for surveying.
#[must_use]
pub fn rd_to_wgs84(x: f64, y: f64) -> LatLon {
    let dx = (x - RD_X0) * 1e-5;
    let dy = (y - RD_Y0) * 1e-5;

    let lat = 52.155_174_40
        + (3235.653_89 * dy
            - 32.582_97 * dx * dx
            - 0.247_50 * dy * dy
            - 0.849_78 * dx * dx * dy
            - 0.065_50 * dy * dy * dy)
            / 3600.0;
    // Longitude terms are scaled by 1000.
    let lon = 5.387_206_21
        + (0.011_99 * dx + 0.093_64 * dx * dy - 0.118_77 * dx * dy * dy + 0.000_26 * dx * dx * dx)
            / 3600.0
            * 1000.0;

    LatLon { lat, lon }
}

/// Centroid of a boundary geometry in WGS84.
///
/// # Errors
///
/// Propagates [`parse_area`] errors.
pub fn boundary_centroid(
    geometry: &serde_json::Value,
) -> Result<Option<BoundaryCentroid>, SpatialError> {
    let area = parse_area(geometry)?;
    Ok(vertex_centroid(&area).map(|c| {
        if looks_projected(c) {
            BoundaryCentroid {
                point: rd_to_wgs84(c.x, c.y),
                converted_from_rd: true,
            }
        } else {
            BoundaryCentroid {
                point: LatLon { lat: c.y, lon: c.x },
                converted_from_rd: false,
            }
        }
    }))
}

/// Great-circle distance between two points, rounded to whole metres.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn haversine_meters(from: LatLon, to: LatLon) -> u64 {
    Haversine
        .distance(Point::new(from.lon, from.lat), Point::new(to.lon, to.lat))
        .round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn vertex_centroid_counts_closing_vertex() {
        let square = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]]
        });
        let c = vertex_centroid(&parse_area(&square).unwrap()).unwrap();
        assert!(close(c.x, 0.8));
        assert!(close(c.y, 0.8));
    }

    #[test]
    fn multipolygon_ignores_holes() {
        let area = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [
                    [[4.0, 52.0], [4.0, 52.0], [4.0, 52.0], [4.0, 52.0]],
                    [[9.0, 9.0], [9.0, 9.0], [9.0, 9.0], [9.0, 9.0]]
                ],
                [[[6.0, 54.0], [6.0, 54.0], [6.0, 54.0], [6.0, 54.0]]]
            ]
        });
        let centroid = boundary_centroid(&area).unwrap().unwrap();
        assert!(!centroid.converted_from_rd);
        assert!(close(centroid.point.lon, 5.0));
        assert!(close(centroid.point.lat, 53.0));
    }

    #[test]
    fn projected_boundary_is_converted() {
        let amersfoort = json!({
            "type": "Polygon",
            "coordinates": [[
                [155_000.0, 463_000.0],
                [155_000.0, 463_000.0],
                [155_000.0, 463_000.0],
                [155_000.0, 463_000.0]
            ]]
        });
        let centroid = boundary_centroid(&amersfoort).unwrap().unwrap();
        assert!(centroid.converted_from_rd);
        assert!(close(centroid.point.lat, 52.155_174_40));
        assert!(close(centroid.point.lon, 5.387_206_21));
    }

    #[test]
    fn rejects_points() {
        let point = json!({ "type": "Point", "coordinates": [4.9, 52.37] });
        assert!(matches!(
            parse_area(&point),
            Err(SpatialError::Unsupported { kind }) if kind == "Point"
        ));
    }

    #[test]
    fn one_degree_of_latitude() {
        let equator = LatLon { lat: 0.0, lon: 0.0 };
        assert_eq!(haversine_meters(equator, equator), 0);
        assert_eq!(haversine_meters(equator, LatLon { lat: 1.0, lon: 0.0 }), 111_195);
    }
}
