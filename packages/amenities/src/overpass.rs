//! Overpass QL queries and result reduction.

use buurt_insight_models::{AmenityStats, LatLon};
use buurt_insight_spatial::haversine_meters;

use crate::AmenityCategory;

/// Overpass QL selecting `category` features within `radius_m` of
/// `centre`, answered with a `center` for ways and relations.
///
/// Schools also match kindergarten and college nodes and school ways and
/// relations.
#[must_use]
pub fn query(category: AmenityCategory, centre: LatLon, radius_m: u32) -> String {
    let around = format!("(around:{radius_m},{},{})", centre.lat, centre.lon);
    let mut selectors = vec![format!("node[\"amenity\"=\"{}\"]{around};", category.tag())];
    if category == AmenityCategory::School {
        selectors.push(format!("node[\"amenity\"=\"kindergarten\"]{around};"));
        selectors.push(format!("node[\"amenity\"=\"college\"]{around};"));
        selectors.push(format!("way[\"amenity\"=\"school\"]{around};"));
        selectors.push(format!("relation[\"amenity\"=\"school\"]{around};"));
    }
    format!("[out:json][timeout:25];({});out center;", selectors.join(""))
}

/// Point of an Overpass element: its own `lat`/`lon`, else its `center`.
#[must_use]
pub fn element_point(element: &serde_json::Value) -> Option<LatLon> {
    let coords = |v: &serde_json::Value| {
        Some(LatLon {
            lat: v.get("lat")?.as_f64()?,
            lon: v.get("lon")?.as_f64()?,
        })
    };
    coords(element).or_else(|| coords(element.get("center")?))
}

/// Count and rounded mean distance of the elements in an Overpass body.
/// Elements without a usable point are not counted.
#[must_use]
pub fn stats(centre: LatLon, body: &serde_json::Value) -> AmenityStats {
    let distances: Vec<u64> = body
        .get("elements")
        .and_then(serde_json::Value::as_array)
        .map(|elements| {
            elements
                .iter()
                .filter_map(element_point)
                .map(|point| haversine_meters(centre, point))
                .collect()
        })
        .unwrap_or_default();
    from_distances(&distances)
}

/// Count and rounded mean of already rounded distances.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn from_distances(distances: &[u64]) -> AmenityStats {
    let count = distances.len() as u64;
    let avg_distance_meters = (count > 0).then(|| {
        let sum: u64 = distances.iter().sum();
        (sum as f64 / count as f64).round() as u64
    });
    AmenityStats {
        count,
        avg_distance_meters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CENTRE: LatLon = LatLon {
        lat: 52.3731,
        lon: 4.8926,
    };

    #[test]
    fn school_query_includes_related_features() {
        let q = query(AmenityCategory::School, CENTRE, 3000);
        assert!(q.starts_with("[out:json][timeout:25];("));
        assert!(q.ends_with(");out center;"));
        assert!(q.contains("node[\"amenity\"=\"school\"](around:3000,52.3731,4.8926);"));
        assert!(q.contains("node[\"amenity\"=\"college\"]"));
        assert!(q.contains("relation[\"amenity\"=\"school\"]"));

        let cafe = query(AmenityCategory::Cafe, CENTRE, 3000);
        assert_eq!(
            cafe,
            "[out:json][timeout:25];(node[\"amenity\"=\"cafe\"](around:3000,52.3731,4.8926););out center;"
        );
    }

    #[test]
    fn rounded_mean() {
        assert_eq!(
            from_distances(&[200, 450, 900, 1500]),
            AmenityStats {
                count: 4,
                avg_distance_meters: Some(763),
            }
        );
        assert_eq!(from_distances(&[]), AmenityStats::EMPTY);
    }

    #[test]
    fn uses_center_for_ways() {
        let body = json!({
            "elements": [
                { "type": "node", "lat": 52.3731, "lon": 4.8926 },
                { "type": "way", "center": { "lat": 52.3731, "lon": 4.8926 } },
                { "type": "relation" }
            ]
        });
        assert_eq!(
            stats(CENTRE, &body),
            AmenityStats {
                count: 2,
                avg_distance_meters: Some(0),
            }
        );
        assert_eq!(stats(CENTRE, &json!({})), AmenityStats::EMPTY);
    }
}
