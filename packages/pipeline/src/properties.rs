//! Viewable properties.
//!
//! The catalog lists every property a caller can show, in display order,
//! with the source field it reads (if any) and how its value is
//! formatted. [`build_views`] renders a merged bag into the table (all
//! available properties), badge (selected) and card (selected, without
//! identity-only properties) views.

use buurt_insight_models::fields::{FieldAlias, NON_WESTERN_BACKGROUND, RESIDENTS, WESTERN_BACKGROUND};
use buurt_insight_models::{PropertyBag, TimestampedValue};
use buurt_insight_server_models::{NeighbourhoodProperty, PropertyGroup, PropertyViews};

/// Rendered when a value cannot be computed.
pub const NO_INFO: &str = "No info";

/// Selection used when the caller sends none.
pub const DEFAULT_SELECTION: &[&str] = &["neighbourhoodName", "meanIncomePerResident"];

/// How a property value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// The stored value as is.
    Raw,
    /// A percentage stored as a number: `45%`.
    Percentage,
    /// A resident count rendered as a share of all residents.
    ShareOfResidents,
    /// Thousands of euros rendered as euros: `€ 32.400`.
    Income,
    /// The safety score: `37/100`.
    CrimeScore,
    /// A plain count.
    Count,
    /// Metres: `763 m`, `1.5 km`.
    Distance,
    /// Residents without a migration background, as a share.
    NonImmigrantShare,
}

/// One catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct ViewableProperty {
    /// Property name, also the bag key of computed properties.
    pub name: &'static str,
    /// Display group.
    pub group: PropertyGroup,
    /// Source statistics field, `None` for computed properties.
    pub field: Option<FieldAlias>,
    /// Value rendering.
    pub format: ValueFormat,
}

const fn sourced(
    name: &'static str,
    group: PropertyGroup,
    bases: &'static [&'static str],
    format: ValueFormat,
) -> ViewableProperty {
    ViewableProperty {
        name,
        group,
        field: Some(FieldAlias::new(bases)),
        format,
    }
}

const fn computed(name: &'static str, group: PropertyGroup, format: ValueFormat) -> ViewableProperty {
    ViewableProperty {
        name,
        group,
        field: None,
        format,
    }
}

use PropertyGroup as G;
use ValueFormat as F;

/// Every viewable property in display order.
pub static CATALOG: &[ViewableProperty] = &[
    computed("neighbourhoodName", G::DoNotShowInTable, F::Raw),
    computed("crimeScore", G::Safety, F::CrimeScore),
    computed("schoolsInNeighbourhood", G::Amenities, F::Count),
    computed("avgDistanceToSchools", G::Amenities, F::Distance),
    computed("gpsInNeighbourhood", G::Amenities, F::Count),
    computed("avgDistanceToGps", G::Amenities, F::Distance),
    computed("afterSchoolCareInNeighbourhood", G::Amenities, F::Count),
    computed("avgDistanceToAfterSchoolCare", G::Amenities, F::Distance),
    computed("daycareInNeighbourhood", G::Amenities, F::Count),
    computed("avgDistanceToDaycare", G::Amenities, F::Distance),
    computed("restaurantsInNeighbourhood", G::Amenities, F::Count),
    computed("avgDistanceToRestaurants", G::Amenities, F::Distance),
    computed("supermarketsInNeighbourhood", G::Amenities, F::Count),
    computed("avgDistanceToSupermarkets", G::Amenities, F::Distance),
    computed("cafesInNeighbourhood", G::Amenities, F::Count),
    computed("avgDistanceToCafes", G::Amenities, F::Distance),
    computed("municipalityName", G::DoNotShowInTable, F::Raw),
    sourced("builtBefore2000", G::YearBuilt, &["BouwjaarVoor2000"], F::Percentage),
    sourced("builtAfter2000", G::YearBuilt, &["BouwjaarVanaf2000"], F::Percentage),
    sourced("meanIncomePerResident", G::Income, &["GemiddeldInkomenPerInwoner"], F::Income),
    sourced(
        "meanIncomePerIncomeRecipient",
        G::Income,
        &["GemiddeldInkomenPerInkomensontvanger"],
        F::Income,
    ),
    sourced(
        "veryHighIncomeHouseholds",
        G::Income,
        &["k_20HuishoudensMetHoogsteInkomen"],
        F::Percentage,
    ),
    sourced("lowIncomeHouseholds", G::Income, &["HuishoudensMetEenLaagInkomen"], F::Percentage),
    sourced(
        "veryLowIncomeHouseholds",
        G::Income,
        &["k_40HuishoudensMetLaagsteInkomen"],
        F::Percentage,
    ),
    sourced(
        "belowSocialMinimumHouseholds",
        G::Income,
        &["HuishOnderOfRondSociaalMinimum"],
        F::Percentage,
    ),
    sourced("residentsAge0to14Percentage", G::ResidentsAge, &["k_0Tot15Jaar"], F::ShareOfResidents),
    sourced("residentsAge15to24Percentage", G::ResidentsAge, &["k_15Tot25Jaar"], F::ShareOfResidents),
    sourced("residentsAge25to44Percentage", G::ResidentsAge, &["k_25Tot45Jaar"], F::ShareOfResidents),
    sourced("residentsAge45to64Percentage", G::ResidentsAge, &["k_45Tot65Jaar"], F::ShareOfResidents),
    sourced("residentsAge65AndOlder", G::ResidentsAge, &["k_65JaarOfOuder"], F::ShareOfResidents),
    sourced("nonMarried", G::ResidentsMaritalStatus, &["Ongehuwd"], F::ShareOfResidents),
    sourced("married", G::ResidentsMaritalStatus, &["Gehuwd"], F::ShareOfResidents),
    sourced("divorced", G::ResidentsMaritalStatus, &["Gescheiden"], F::ShareOfResidents),
    sourced("widowed", G::ResidentsMaritalStatus, &["Verweduwd"], F::ShareOfResidents),
    sourced("singlePersonHouseholds", G::HouseholdType, &["Eenpersoonshuishoudens"], F::ShareOfResidents),
    sourced("householdsWithChildren", G::HouseholdType, &["HuishoudensMetKinderen"], F::ShareOfResidents),
    sourced(
        "householdsWithoutChildren",
        G::HouseholdType,
        &["HuishoudensZonderKinderen"],
        F::ShareOfResidents,
    ),
    sourced("rentalProperties", G::PropertyOwnership, &["HuurwoningenTotaal"], F::Percentage),
    sourced("ownedProperties", G::PropertyOwnership, &["Koopwoningen"], F::Percentage),
    sourced("singleFamilyResidential", G::BuildingType, &["PercentageEengezinswoning"], F::Percentage),
    sourced("multiFamilyResidential", G::BuildingType, &["PercentageMeergezinswoning"], F::Percentage),
    sourced("westernImmigrants", G::ImmigrationBackground, &["WestersTotaal"], F::ShareOfResidents),
    sourced("nonWesternImmigrants", G::ImmigrationBackground, &["NietWestersTotaal"], F::ShareOfResidents),
    sourced("residentsFromMorocco", G::ImmigrationBackground, &["Marokko"], F::ShareOfResidents),
    sourced(
        "residentsFromAntillesOrAruba",
        G::ImmigrationBackground,
        &["NederlandseAntillenEnAruba"],
        F::ShareOfResidents,
    ),
    sourced("residentsFromSuriname", G::ImmigrationBackground, &["Suriname"], F::ShareOfResidents),
    sourced("residentsFromTurkey", G::ImmigrationBackground, &["Turkije"], F::ShareOfResidents),
    sourced(
        "residentsOfOtherNonWesternBackground",
        G::ImmigrationBackground,
        &["OverigNietWesters"],
        F::ShareOfResidents,
    ),
    computed("nonImmigrants", G::ImmigrationBackground, F::NonImmigrantShare),
];

impl ViewableProperty {
    fn source<'a>(&self, bag: &'a PropertyBag) -> Option<&'a TimestampedValue> {
        self.field.and_then(|f| f.resolve(bag)).map(|(_, value)| value)
    }

    /// Renders this property from `bag`.
    #[must_use]
    pub fn render(&self, bag: &PropertyBag) -> NeighbourhoodProperty {
        let source = self.source(bag);
        let own = bag.get(self.name);
        let year = source
            .and_then(|v| v.year.clone())
            .or_else(|| own.and_then(|v| v.year.clone()));
        let value = self
            .format
            .render(source.or(own), bag)
            .unwrap_or_else(|| NO_INFO.into());

        NeighbourhoodProperty {
            name: self.name.to_string(),
            group: self.group,
            value,
            year,
        }
    }
}

impl ValueFormat {
    #[allow(clippy::cast_possible_truncation)]
    fn render(self, entry: Option<&TimestampedValue>, bag: &PropertyBag) -> Option<serde_json::Value> {
        let number = || entry.and_then(TimestampedValue::as_f64).filter(|n| n.is_finite());
        let text = match self {
            Self::Raw => return entry?.value.clone().filter(|v| !v.is_null()),
            Self::Percentage => format!("{}%", number()?),
            Self::ShareOfResidents => {
                let residents = residents(bag)?;
                format!("{}%", (number()? / residents * 100.0).round() as i64)
            }
            Self::Income => format_euros((number()? * 1000.0).round() as i64),
            Self::CrimeScore => format!("{}/100", number()?.round().clamp(0.0, 100.0) as i64),
            Self::Count => format!("{}", number()?),
            Self::Distance => {
                let metres = number()?;
                if metres >= 1000.0 {
                    format!("{:.1} km", metres / 1000.0)
                } else {
                    format!("{metres} m")
                }
            }
            Self::NonImmigrantShare => {
                let residents = residents(bag)?;
                let western = WESTERN_BACKGROUND.number(bag)?;
                let non_western = NON_WESTERN_BACKGROUND.number(bag)?;
                let share = 1.0 - (western + non_western) / residents;
                format!("{}%", (share * 100.0).round() as i64)
            }
        };
        Some(text.into())
    }
}

fn residents(bag: &PropertyBag) -> Option<f64> {
    RESIDENTS.number(bag).filter(|n| *n > 0.0)
}

/// Renders whole euros with `.` as thousands separator: `€ 32.400`.
#[must_use]
pub fn format_euros(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("€ -{grouped}")
    } else {
        format!("€ {grouped}")
    }
}

/// Every property available in `bag`: identity properties, sourced
/// properties whose field is present, computed properties present in the
/// bag, then the non-immigrant share.
#[must_use]
pub fn table_properties(bag: &PropertyBag) -> Vec<NeighbourhoodProperty> {
    let identity = CATALOG.iter().filter(|p| p.group == G::DoNotShowInTable);
    let sourced = CATALOG
        .iter()
        .filter(|p| p.field.is_some_and(|f| f.resolve(bag).is_some()));
    let computed = CATALOG.iter().filter(|p| {
        p.field.is_none()
            && p.group != G::DoNotShowInTable
            && p.format != F::NonImmigrantShare
            && bag.contains_key(p.name)
    });
    let non_immigrants = CATALOG.iter().filter(|p| p.format == F::NonImmigrantShare);

    identity
        .chain(sourced)
        .chain(computed)
        .chain(non_immigrants)
        .map(|p| p.render(bag))
        .collect()
}

/// Table, badge and card views of `bag` for the given selection
/// ([`DEFAULT_SELECTION`] when `None`).
#[must_use]
pub fn build_views(bag: &PropertyBag, selection: Option<&[String]>) -> PropertyViews {
    let is_selected = |name: &str| {
        selection.map_or_else(
            || DEFAULT_SELECTION.contains(&name),
            |selected| selected.iter().any(|s| s == name),
        )
    };

    let table_properties = table_properties(bag);
    let badge_properties: Vec<NeighbourhoodProperty> = table_properties
        .iter()
        .filter(|p| is_selected(&p.name))
        .cloned()
        .collect();
    let card_properties = badge_properties
        .iter()
        .filter(|p| p.group != G::DoNotShowInTable)
        .cloned()
        .collect();

    PropertyViews {
        badge_properties,
        table_properties,
        card_properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buurt_insight_models::YearTag;
    use serde_json::json;

    fn bag(entries: &[(&str, serde_json::Value, Option<i32>)]) -> PropertyBag {
        entries
            .iter()
            .map(|(k, v, year)| {
                let value = year.map_or_else(
                    || TimestampedValue::untagged(Some(v.clone())),
                    |y| TimestampedValue::new(Some(v.clone()), y),
                );
                ((*k).to_string(), value)
            })
            .collect()
    }

    fn value_of<'a>(props: &'a [NeighbourhoodProperty], name: &str) -> &'a serde_json::Value {
        &props.iter().find(|p| p.name == name).unwrap().value
    }

    fn sample() -> PropertyBag {
        bag(&[
            ("neighbourhoodName", json!("Nieuwmarkt"), None),
            ("municipalityName", json!("Amsterdam"), None),
            ("AantalInwoners_5", json!(1000), Some(2021)),
            ("GemiddeldInkomenPerInwoner_66", json!(32.4), Some(2020)),
            ("Koopwoningen_40", json!(27), Some(2021)),
            ("k_0Tot15Jaar_8", json!(153), Some(2021)),
            ("WestersTotaal_17", json!(100), Some(2021)),
            ("NietWestersTotaal_18", json!(150), Some(2021)),
            ("crimeScore", json!(37), None),
            ("avgDistanceToSchools", json!(1013), None),
            ("schoolsInNeighbourhood", json!(4), None),
            ("avgDistanceToCafes", serde_json::Value::Null, None),
        ])
    }

    #[test]
    fn formats_values() {
        let table = table_properties(&sample());

        assert_eq!(value_of(&table, "neighbourhoodName"), "Nieuwmarkt");
        assert_eq!(value_of(&table, "meanIncomePerResident"), "€ 32.400");
        assert_eq!(value_of(&table, "ownedProperties"), "27%");
        assert_eq!(value_of(&table, "residentsAge0to14Percentage"), "15%");
        assert_eq!(value_of(&table, "westernImmigrants"), "10%");
        assert_eq!(value_of(&table, "nonImmigrants"), "75%");
        assert_eq!(value_of(&table, "crimeScore"), "37/100");
        assert_eq!(value_of(&table, "schoolsInNeighbourhood"), "4");
        assert_eq!(value_of(&table, "avgDistanceToSchools"), "1.0 km");
        assert_eq!(value_of(&table, "avgDistanceToCafes"), NO_INFO);
    }

    #[test]
    fn table_order_and_years() {
        let table = table_properties(&sample());
        let names: Vec<&str> = table.iter().map(|p| p.name.as_str()).collect();

        assert_eq!(&names[..3], ["neighbourhoodName", "municipalityName", "meanIncomePerResident"]);
        assert_eq!(names.last(), Some(&"nonImmigrants"));
        assert!(!names.contains(&"builtBefore2000"));
        assert!(!names.contains(&"gpsInNeighbourhood"));

        let income = table.iter().find(|p| p.name == "meanIncomePerResident").unwrap();
        assert_eq!(income.year, Some(YearTag::Year(2020)));
        assert_eq!(income.group, PropertyGroup::Income);
    }

    #[test]
    fn default_selection_views() {
        let views = build_views(&sample(), None);

        let badge: Vec<&str> = views.badge_properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(badge, ["neighbourhoodName", "meanIncomePerResident"]);
        let card: Vec<&str> = views.card_properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(card, ["meanIncomePerResident"]);
    }

    #[test]
    fn missing_inputs_render_no_info() {
        let bag = bag(&[("k_0Tot15Jaar_8", json!(153), Some(2021))]);
        let views = build_views(&bag, Some(&["residentsAge0to14Percentage".to_string()]));

        assert_eq!(views.card_properties.len(), 1);
        assert_eq!(views.card_properties[0].value, NO_INFO);
        assert_eq!(value_of(&views.table_properties, "nonImmigrants"), NO_INFO);
        assert_eq!(value_of(&views.table_properties, "neighbourhoodName"), NO_INFO);
    }

    #[test]
    fn short_distances_and_euros() {
        let bag = bag(&[("avgDistanceToGps", json!(763), None)]);
        assert_eq!(value_of(&table_properties(&bag), "avgDistanceToGps"), "763 m");
        assert_eq!(format_euros(950), "€ 950");
        assert_eq!(format_euros(1_234_567), "€ 1.234.567");
    }
}
