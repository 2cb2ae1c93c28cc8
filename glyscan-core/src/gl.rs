//! Glycemic-load engine.
//!
//! Pure and synchronous. GL is `GI × carbs / 100`, rounded half-up to an
//! integer. Negative inputs are not rejected; they are computed
//! arithmetically like any other value.

use serde::{Deserialize, Serialize};

use crate::types::{GlClass, NutritionRecord};

/// Highest GL still classed as [`GlClass::Safe`].
pub const SAFE_MAX: i64 = 10;

/// Lowest GL classed as [`GlClass::HighRisk`].
pub const HIGH_RISK_MIN: i64 = 20;

/// Serving returned by [`safe_serving_size`] when GI or carbs is zero.
pub const NEUTRAL_SERVING_GRAMS: f64 = 100.0;

/// Round half-up (towards positive infinity on ties).
#[must_use]
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

#[allow(clippy::cast_possible_truncation)]
fn to_gl(x: f64) -> i64 {
    // Saturating cast; NaN becomes 0.
    round_half_up(x) as i64
}

/// GL of `carbs_grams` of carbohydrate at glycemic index `gi`.
#[must_use]
pub fn gl(gi: f64, carbs_grams: f64) -> i64 {
    to_gl(gi * carbs_grams / 100.0)
}

/// GL of a serving, given carbs per 100 g.
#[must_use]
pub fn gl_for_serving(gi: f64, carbs_per_100g: f64, serving_grams: f64) -> i64 {
    gl(gi, carbs_per_100g * serving_grams / 100.0)
}

/// Safety class of a GL value. Exactly 20 is already high risk.
#[must_use]
pub fn classify(gl: i64) -> GlClass {
    if gl <= SAFE_MAX {
        GlClass::Safe
    } else if gl < HIGH_RISK_MIN {
        GlClass::Moderate
    } else {
        GlClass::HighRisk
    }
}

/// Serving (grams, rounded to the nearest 10) whose GL equals `target_gl`.
#[must_use]
pub fn safe_serving_size(gi: f64, carbs_per_100g: f64, target_gl: f64) -> f64 {
    if gi == 0.0 || carbs_per_100g == 0.0 {
        return NEUTRAL_SERVING_GRAMS;
    }
    let raw = target_gl * 10_000.0 / (gi * carbs_per_100g);
    round_half_up(raw / 10.0) * 10.0
}

/// Sum of the records' standard-serving GL.
#[must_use]
pub fn total_gl<'a>(records: impl IntoIterator<Item = &'a NutritionRecord>) -> i64 {
    records.into_iter().map(|r| r.calculated_gl).sum()
}

/// GL and class of a record eaten at a given serving.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlAssessment {
    /// Computed GL.
    pub gl: i64,
    /// Class of `gl`.
    pub class: GlClass,
    /// Serving the assessment was computed for.
    pub serving_grams: f64,
}

/// Assess `record` at `serving_grams`.
#[must_use]
pub fn assess(record: &NutritionRecord, serving_grams: f64) -> GlAssessment {
    let gl = gl_for_serving(record.glycemic_index, record.carbs_per_100g, serving_grams);
    GlAssessment {
        gl,
        class: classify(gl),
        serving_grams,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FoodCategory;

    #[test]
    fn zero_inputs_give_zero_gl() {
        assert_eq!(gl(0.0, 42.0), 0);
        assert_eq!(gl(73.0, 0.0), 0);
    }

    #[test]
    fn reference_values() {
        assert_eq!(gl(33.0, 30.0), 10);
        assert_eq!(gl(70.0, 30.0), 21);
        assert_eq!(gl(36.0, 14.0), 5);
        assert_eq!(gl(51.0, 23.0), 12);
        assert_eq!(gl(73.0, 28.0), 20);
    }

    #[test]
    fn ties_round_up() {
        // 70 × 15 / 100 = 10.5
        assert_eq!(gl_for_serving(70.0, 30.0, 50.0), 11);
    }

    #[test]
    fn negative_inputs_are_computed_arithmetically() {
        assert_eq!(gl(-50.0, 20.0), -10);
        assert_eq!(classify(-10), GlClass::Safe);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify(10), GlClass::Safe);
        assert_eq!(classify(11), GlClass::Moderate);
        assert_eq!(classify(19), GlClass::Moderate);
        assert_eq!(classify(20), GlClass::HighRisk);
    }

    #[test]
    fn safe_serving_rounds_to_tens() {
        // 10 × 10000 / (73 × 28) = 48.9 → 50
        assert!((safe_serving_size(73.0, 28.0, 10.0) - 50.0).abs() < f64::EPSILON);
        assert!((safe_serving_size(0.0, 28.0, 10.0) - 100.0).abs() < f64::EPSILON);
        assert!((safe_serving_size(73.0, 0.0, 10.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn assess_and_total() {
        let rice = NutritionRecord::new("r", "쌀밥", "Rice", 73.0, 28.0, 100.0, FoodCategory::Grain);
        let apple = NutritionRecord::new("a", "사과", "Apple", 36.0, 14.0, 100.0, FoodCategory::Fruit);
        assert_eq!(rice.calculated_gl, 20);
        assert_eq!(rice.gl_class, GlClass::HighRisk);
        assert_eq!(total_gl([&rice, &apple]), 25);

        let half = assess(&rice, 50.0);
        assert_eq!(half.gl, 10);
        assert_eq!(half.class, GlClass::Safe);
    }
}
