//! The amenity categories reported per neighbourhood.

use strum::{Display, EnumIter, IntoStaticStr};

/// An amenity category, named by its `OpenStreetMap` `amenity=*` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AmenityCategory {
    School,
    Doctors,
    Childcare,
    Kindergarten,
    Restaurant,
    Supermarket,
    Cafe,
}

impl AmenityCategory {
    /// The `amenity=*` tag value.
    #[must_use]
    pub fn tag(self) -> &'static str {
        self.into()
    }

    /// Property bag key holding the feature count.
    #[must_use]
    pub const fn count_key(self) -> &'static str {
        match self {
            Self::School => "schoolsInNeighbourhood",
            Self::Doctors => "gpsInNeighbourhood",
            Self::Childcare => "afterSchoolCareInNeighbourhood",
            Self::Kindergarten => "daycareInNeighbourhood",
            Self::Restaurant => "restaurantsInNeighbourhood",
            Self::Supermarket => "supermarketsInNeighbourhood",
            Self::Cafe => "cafesInNeighbourhood",
        }
    }

    /// Property bag key holding the mean distance in metres.
    #[must_use]
    pub const fn distance_key(self) -> &'static str {
        match self {
            Self::School => "avgDistanceToSchools",
            Self::Doctors => "avgDistanceToGps",
            Self::Childcare => "avgDistanceToAfterSchoolCare",
            Self::Kindergarten => "avgDistanceToDaycare",
            Self::Restaurant => "avgDistanceToRestaurants",
            Self::Supermarket => "avgDistanceToSupermarkets",
            Self::Cafe => "avgDistanceToCafes",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn osm_tags() {
        let tags: Vec<&str> = AmenityCategory::iter().map(AmenityCategory::tag).collect();
        assert_eq!(
            tags,
            ["school", "doctors", "childcare", "kindergarten", "restaurant", "supermarket", "cafe"]
        );
        assert_eq!(AmenityCategory::Cafe.to_string(), "cafe");
    }
}
