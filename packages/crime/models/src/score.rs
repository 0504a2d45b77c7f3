//! Safety score formulas.
//!
//! A safety score runs from 0 (least safe) to 100. Each basis maps its
//! input to an "unsafety" figure by a fixed weight, clamps it to
//! `[0, 100]` and subtracts it from 100.

use strum::{AsRefStr, Display};

/// What a safety score was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ScoreBasis {
    /// Monthly registered crimes per 1000 residents. 10 per 1000 → 0.
    PerThousandResidents,
    /// Monthly registered crimes when the population is unknown. 40 → 0.
    RawMonthlyTotal,
    /// Sum of the historical per-1000 indicators from the yearly
    /// statistics. A heuristic kept for neighbourhoods without monthly
    /// figures.
    HistoricalIndicators,
}

impl ScoreBasis {
    /// Multiplier applied to the input before clamping.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::PerThousandResidents => 10.0,
            Self::RawMonthlyTotal => 2.5,
            Self::HistoricalIndicators => 5.0,
        }
    }

    /// Safety score for `input` on this basis.
    #[must_use]
    pub fn score(self, input: f64) -> u8 {
        safety_from_unsafety(input * self.weight())
    }
}

/// `100 − clamp(round(unsafety), 0, 100)`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn safety_from_unsafety(unsafety: f64) -> u8 {
    let clamped = unsafety.round().clamp(0.0, 100.0);
    100 - clamped as u8
}

/// Score for a monthly total, normalised by population when known.
#[must_use]
pub fn monthly_score(total: f64, residents: Option<f64>) -> (ScoreBasis, u8) {
    match residents.filter(|r| *r > 0.0 && r.is_finite()) {
        Some(residents) => {
            let per_thousand = total / residents * 1000.0;
            (
                ScoreBasis::PerThousandResidents,
                ScoreBasis::PerThousandResidents.score(per_thousand),
            )
        }
        None => (ScoreBasis::RawMonthlyTotal, ScoreBasis::RawMonthlyTotal.score(total)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_crimes_among_1900_residents_is_37() {
        assert_eq!(monthly_score(12.0, Some(1900.0)), (ScoreBasis::PerThousandResidents, 37));
    }

    #[test]
    fn unknown_population_uses_raw_total() {
        assert_eq!(monthly_score(12.0, None), (ScoreBasis::RawMonthlyTotal, 70));
        assert_eq!(monthly_score(12.0, Some(0.0)), (ScoreBasis::RawMonthlyTotal, 70));
        assert_eq!(monthly_score(40.0, None).1, 0);
    }

    #[test]
    fn score_stays_in_range() {
        for x in [-1e9, -3.2, 0.0, 0.49, 0.5, 42.0, 99.5, 100.0, 250.0, 1e12] {
            assert!(safety_from_unsafety(x) <= 100, "{x}");
        }
        assert_eq!(safety_from_unsafety(-5.0), 100);
        assert_eq!(safety_from_unsafety(1e12), 0);
    }

    #[test]
    fn historical_weight() {
        assert_eq!(ScoreBasis::HistoricalIndicators.score(4.5 + 3.1), 62);
        assert_eq!(ScoreBasis::HistoricalIndicators.to_string(), "historical_indicators");
    }
}
