//! Consumption advice derived from a record's GL class.

use serde::{Deserialize, Serialize};

use crate::gl::{self, SAFE_MAX};
use crate::types::{GlClass, NutritionRecord};

/// Max alternatives offered for a high-risk food.
pub const MAX_ALTERNATIVES: usize = 3;

/// GL the recommended serving is sized for.
const TARGET_GL: f64 = 10.0;

/// Advice for eating one record at one serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionAdvice {
    /// Class at the assessed serving.
    pub level: GlClass,
    /// One-line message for the user.
    pub message: String,
    /// Serving (grams) the user should aim for.
    pub recommended_serving: f64,
    /// Lower-GL foods from the same category, best first.
    pub alternatives: Vec<NutritionRecord>,
    /// Practical tips.
    pub tips: Vec<String>,
}

/// Advise on eating `record` at `serving_grams`.
///
/// `catalog` is only consulted for high-risk foods.
#[must_use]
pub fn advise(
    record: &NutritionRecord,
    serving_grams: f64,
    catalog: &[NutritionRecord],
) -> ConsumptionAdvice {
    let assessment = gl::assess(record, serving_grams);
    let safe_serving = || {
        gl::safe_serving_size(
            record.glycemic_index,
            record.carbs_per_100g,
            TARGET_GL,
        )
    };

    match assessment.class {
        GlClass::Safe => ConsumptionAdvice {
            level: GlClass::Safe,
            message: format!("{} is fine at {serving_grams} g.", record.name_local),
            recommended_serving: serving_grams,
            alternatives: Vec::new(),
            tips: vec![
                "Keep the current portion.".to_string(),
                "Pair with vegetables or protein for a steadier response.".to_string(),
            ],
        },
        GlClass::Moderate => {
            let recommended = safe_serving();
            ConsumptionAdvice {
                level: GlClass::Moderate,
                message: format!(
                    "{}: reduce to about {recommended} g to stay in the safe range.",
                    record.name_local
                ),
                recommended_serving: recommended,
                alternatives: Vec::new(),
                tips: vec![
                    format!("Aim for {recommended} g."),
                    "Eat vegetables first.".to_string(),
                    "Take a short walk after the meal.".to_string(),
                ],
            }
        }
        GlClass::HighRisk => {
            let recommended = safe_serving();
            ConsumptionAdvice {
                level: GlClass::HighRisk,
                message: format!(
                    "{} is high risk at {serving_grams} g; limit to {recommended} g or pick an alternative.",
                    record.name_local
                ),
                recommended_serving: recommended,
                alternatives: find_alternatives(record, catalog, MAX_ALTERNATIVES),
                tips: vec![
                    format!("Limit the portion to {recommended} g."),
                    "Consider a lower-GL alternative from the same category.".to_string(),
                    "Check blood glucose after eating.".to_string(),
                ],
            }
        }
    }
}

/// Same-category records other than `record` with a safe GL, lowest GL first.
#[must_use]
pub fn find_alternatives(
    record: &NutritionRecord,
    catalog: &[NutritionRecord],
    max: usize,
) -> Vec<NutritionRecord> {
    let mut out: Vec<NutritionRecord> = catalog
        .iter()
        .filter(|c| c.category == record.category && c.id != record.id && c.calculated_gl <= SAFE_MAX)
        .cloned()
        .collect();
    out.sort_by_key(|c| c.calculated_gl);
    out.truncate(max);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FoodCategory;

    fn grain(id: &str, name: &str, gi: f64, carbs: f64) -> NutritionRecord {
        NutritionRecord::new(id, name, "", gi, carbs, 100.0, FoodCategory::Grain)
    }

    #[test]
    fn safe_keeps_current_serving() {
        let apple = NutritionRecord::new("a", "사과", "Apple", 36.0, 14.0, 100.0, FoodCategory::Fruit);
        let advice = advise(&apple, 150.0, &[]);
        assert_eq!(advice.level, GlClass::Safe);
        assert!((advice.recommended_serving - 150.0).abs() < f64::EPSILON);
        assert!(advice.alternatives.is_empty());
    }

    #[test]
    fn moderate_recommends_safe_serving() {
        let banana = NutritionRecord::new("b", "바나나", "Banana", 51.0, 23.0, 100.0, FoodCategory::Fruit);
        let advice = advise(&banana, 100.0, &[]);
        assert_eq!(advice.level, GlClass::Moderate);
        // 100000 / 1173 = 85.2 → 90
        assert!((advice.recommended_serving - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn high_risk_offers_sorted_same_category_alternatives() {
        let rice = grain("rice", "쌀밥", 73.0, 28.0);
        let catalog = vec![
            rice.clone(),
            grain("oat", "귀리", 55.0, 12.0),
            grain("barley", "보리", 28.0, 20.0),
            grain("bread", "식빵", 75.0, 50.0),
            NutritionRecord::new("apple", "사과", "", 36.0, 14.0, 100.0, FoodCategory::Fruit),
        ];
        let advice = advise(&rice, 100.0, &catalog);
        assert_eq!(advice.level, GlClass::HighRisk);
        let ids: Vec<&str> = advice.alternatives.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["barley", "oat"]);
    }

    #[test]
    fn alternatives_are_capped() {
        let rice = grain("rice", "쌀밥", 73.0, 28.0);
        let catalog: Vec<_> = (0..6)
            .map(|i| grain(&format!("g{i}"), "곡물", 10.0, f64::from(i) * 5.0))
            .collect();
        assert_eq!(find_alternatives(&rice, &catalog, 3).len(), 3);
    }
}
