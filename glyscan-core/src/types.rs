//! Core type definitions for the matching pipeline.
//!
//! All types are serializable. Field names on [`NutritionRecord`] follow the
//! nutrition backend's wire format (`nameKo`, `carbohydratesPer100g`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gl;

/// Id prefix marking a record as a non-authoritative placeholder.
///
/// Records carrying this prefix are manufactured by the fallback engine and
/// are refused by the shared record cache.
pub const PROVISIONAL_PREFIX: &str = "provisional_";

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Identifier of a nutrition record, as assigned by the nutrition store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Wrap a raw id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id marks a fallback placeholder rather than a store record.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Monotonically increasing generation token for one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Addresses one detection inside one analysis request.
///
/// Keys from a superseded request never match the coordinator's active
/// request, which is what turns late resolution events into no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectionKey {
    /// The request the detection belongs to.
    pub request: RequestId,
    /// Position of the detection in the parser's output.
    pub position: usize,
}

impl fmt::Display for DetectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.request, self.position)
    }
}

// ---------------------------------------------------------------------------
// Detections
// ---------------------------------------------------------------------------

/// Region of the image a detection was found in (model-relative units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

/// One food identification produced by the vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    /// Generic name used when no language-specific name fits.
    pub primary_name: String,
    /// Name in the local (Hangul) script.
    pub name_local: Option<String>,
    /// Name in a foreign script, usually English.
    pub name_foreign: Option<String>,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    /// Where in the image the item was seen.
    pub bounding_box: Option<BoundingBox>,
}

impl Detection {
    /// Create a detection. Blank names become `None`; confidence is clamped.
    #[must_use]
    pub fn new(
        primary_name: impl Into<String>,
        name_local: Option<String>,
        name_foreign: Option<String>,
        confidence: f32,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            primary_name: primary_name.into().trim().to_string(),
            name_local: non_blank(name_local),
            name_foreign: non_blank(name_foreign),
            confidence,
            bounding_box: None,
        }
    }

    /// Detection carrying only a local-script name.
    #[must_use]
    pub fn local(name: impl Into<String>, confidence: f32) -> Self {
        let name = name.into();
        Self::new(name.clone(), Some(name), None, confidence)
    }

    /// Attach a bounding box.
    #[must_use]
    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }

    /// Non-empty name fields in query order (local, foreign, generic),
    /// without repeats. Between one and three entries for any detection the
    /// parser emits.
    #[must_use]
    pub fn queries(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(3);
        let candidates = [
            self.name_local.as_deref(),
            self.name_foreign.as_deref(),
            Some(self.primary_name.as_str()),
        ];
        for name in candidates.into_iter().flatten() {
            let name = name.trim();
            if !name.is_empty() && !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    /// Best display name: local, then foreign, then generic.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name_local
            .as_deref()
            .or(self.name_foreign.as_deref())
            .unwrap_or(&self.primary_name)
    }
}

fn non_blank(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

// ---------------------------------------------------------------------------
// Nutrition records
// ---------------------------------------------------------------------------

/// Glycemic-load safety class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlClass {
    /// GL ≤ 10.
    #[default]
    Safe,
    /// 10 < GL < 20.
    Moderate,
    /// GL ≥ 20.
    HighRisk,
}

impl GlClass {
    /// Short human-readable safety message.
    #[must_use]
    pub fn summary(self) -> &'static str {
        match self {
            Self::Safe => "Safe level (low glycemic load).",
            Self::Moderate => "Needs attention (medium glycemic load).",
            Self::HighRisk => "High risk (high glycemic load).",
        }
    }
}

impl fmt::Display for GlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::HighRisk => write!(f, "HIGH_RISK"),
        }
    }
}

/// Food category as labelled by the nutrition store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FoodCategory {
    /// 곡물
    Grain,
    /// 채소
    Vegetable,
    /// 과일
    Fruit,
    /// 육류
    Meat,
    /// 어류
    Fish,
    /// 유제품
    Dairy,
    /// 견과류
    Nuts,
    /// 음료
    Beverage,
    /// 간식
    Snack,
    /// 한식
    Korean,
    /// 서양식
    Western,
    /// 중식
    Chinese,
    /// 일식
    Japanese,
    /// 가공식품
    Processed,
    /// 외식메뉴
    EatingOut,
    /// 기타. Unknown labels also map here.
    #[default]
    Other,
}

impl FoodCategory {
    /// Every category, in the store's canonical order.
    pub const ALL: [FoodCategory; 16] = [
        Self::Grain,
        Self::Vegetable,
        Self::Fruit,
        Self::Meat,
        Self::Fish,
        Self::Dairy,
        Self::Nuts,
        Self::Beverage,
        Self::Snack,
        Self::Korean,
        Self::Western,
        Self::Chinese,
        Self::Japanese,
        Self::Processed,
        Self::EatingOut,
        Self::Other,
    ];

    /// The store's label for this category.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Grain => "곡물",
            Self::Vegetable => "채소",
            Self::Fruit => "과일",
            Self::Meat => "육류",
            Self::Fish => "어류",
            Self::Dairy => "유제품",
            Self::Nuts => "견과류",
            Self::Beverage => "음료",
            Self::Snack => "간식",
            Self::Korean => "한식",
            Self::Western => "서양식",
            Self::Chinese => "중식",
            Self::Japanese => "일식",
            Self::Processed => "가공식품",
            Self::EatingOut => "외식메뉴",
            Self::Other => "기타",
        }
    }

    /// Parse a store label. Unknown labels map to [`FoodCategory::Other`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label() == label)
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for FoodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<FoodCategory> for String {
    fn from(value: FoodCategory) -> Self {
        value.label().to_string()
    }
}

impl From<String> for FoodCategory {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

/// A nutrition record as owned by the nutrition store.
///
/// The pipeline only reads and caches copies of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
    /// Store-assigned id.
    pub id: RecordId,
    /// Name in the local script.
    #[serde(rename = "nameKo")]
    pub name_local: String,
    /// Name in a foreign script.
    #[serde(rename = "nameEn", default)]
    pub name_foreign: String,
    /// Glycemic index (0–100 for real foods).
    #[serde(rename = "glycemicIndex")]
    pub glycemic_index: f64,
    /// Carbohydrate grams per 100 g.
    #[serde(rename = "carbohydratesPer100g")]
    pub carbs_per_100g: f64,
    /// Standard serving size in grams.
    #[serde(rename = "standardServingSize")]
    pub standard_serving: f64,
    /// GL at the standard serving. Backends may omit it; see
    /// [`NutritionRecord::with_computed_gl`].
    #[serde(rename = "calculatedGL", default)]
    pub calculated_gl: i64,
    /// Store category.
    #[serde(default)]
    pub category: FoodCategory,
    /// Safety class of `calculated_gl`.
    #[serde(rename = "glClassification", default)]
    pub gl_class: GlClass,
}

impl NutritionRecord {
    /// Build a record, computing GL and class from GI, carbs and serving.
    #[must_use]
    pub fn new(
        id: impl Into<RecordId>,
        name_local: impl Into<String>,
        name_foreign: impl Into<String>,
        glycemic_index: f64,
        carbs_per_100g: f64,
        standard_serving: f64,
        category: FoodCategory,
    ) -> Self {
        let record = Self {
            id: id.into(),
            name_local: name_local.into(),
            name_foreign: name_foreign.into(),
            glycemic_index,
            carbs_per_100g,
            standard_serving,
            calculated_gl: 0,
            category,
            gl_class: GlClass::Safe,
        };
        record.with_computed_gl()
    }

    /// Recompute `calculated_gl` and `gl_class` from the nutrient fields.
    #[must_use]
    pub fn with_computed_gl(mut self) -> Self {
        self.calculated_gl = gl::gl_for_serving(
            self.glycemic_index,
            self.carbs_per_100g,
            self.standard_serving,
        );
        self.gl_class = gl::classify(self.calculated_gl);
        self
    }

    /// Whether this record is a fallback placeholder.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }

    /// Both names, skipping empty ones.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        [self.name_local.as_str(), self.name_foreign.as_str()]
            .into_iter()
            .filter(|n| !n.trim().is_empty())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Candidate sets
// ---------------------------------------------------------------------------

/// The resolver's output for one detection.
///
/// `options` holds no duplicate ids and is in rank order (best first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    /// The detection the options were found for.
    pub detection: Detection,
    /// Ranked candidate records.
    pub options: Vec<NutritionRecord>,
}

impl CandidateSet {
    /// A candidate set with no options.
    #[must_use]
    pub fn empty(detection: Detection) -> Self {
        Self {
            detection,
            options: Vec::new(),
        }
    }

    /// Whether any option was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_skip_blank_and_repeated_names() {
        let det = Detection::new("사과", Some("사과".into()), Some("  ".into()), 0.9);
        assert_eq!(det.queries(), vec!["사과"]);

        let det = Detection::new("apple", Some("사과".into()), Some("Apple".into()), 0.9);
        assert_eq!(det.queries(), vec!["사과", "Apple", "apple"]);
    }

    #[test]
    fn confidence_is_clamped() {
        assert!((Detection::local("밥", 1.7).confidence - 1.0).abs() < f32::EPSILON);
        assert!(Detection::local("밥", -0.2).confidence.abs() < f32::EPSILON);
        assert!(Detection::local("밥", f32::NAN).confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn record_wire_format_round_trips() {
        let json = r#"{
            "id": "f-1",
            "nameKo": "사과",
            "nameEn": "Apple",
            "glycemicIndex": 36,
            "carbohydratesPer100g": 14,
            "standardServingSize": 100,
            "calculatedGL": 5,
            "category": "과일",
            "glClassification": "SAFE"
        }"#;
        let record: NutritionRecord = serde_json::from_str(json).expect("parse");
        assert_eq!(record.id.as_str(), "f-1");
        assert_eq!(record.category, FoodCategory::Fruit);
        assert_eq!(record.gl_class, GlClass::Safe);

        let back = serde_json::to_value(&record).expect("serialize");
        assert_eq!(back["category"], "과일");
        assert_eq!(back["glClassification"], "SAFE");
    }

    #[test]
    fn unknown_category_label_maps_to_other() {
        assert_eq!(FoodCategory::from_label("분식"), FoodCategory::Other);
        assert_eq!(FoodCategory::from_label(" 한식 "), FoodCategory::Korean);
    }

    #[test]
    fn provisional_ids_are_recognised() {
        assert!(RecordId::new("provisional_abc").is_provisional());
        assert!(!RecordId::new("food-12").is_provisional());
    }
}
