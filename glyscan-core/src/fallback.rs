//! Fallback suggestions for detections nothing matched.
//!
//! Tools, from most to least informed: a similar-food search over name
//! prefixes, a provisional record built from the category average, and an
//! empty manual-entry template. Independent of any detection, a list of
//! popular low-GL foods can be offered instead. Provisional records carry
//! the [`PROVISIONAL_PREFIX`] id and are never written to the shared cache.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FallbackConfig;
use crate::gl::SAFE_MAX;
use crate::resolver::{ranking, FoodMatchResolver};
use crate::store::gl_range_query;
use crate::types::{Detection, FoodCategory, NutritionRecord, RecordId, PROVISIONAL_PREFIX};

/// Points for a name equal to the detection's name in the same script.
const EXACT_POINTS: u32 = 10;
/// Points for containment in either direction.
const PARTIAL_POINTS: u32 = 5;

/// Mean nutrient values of a category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryAverage {
    /// Mean GI, rounded.
    pub glycemic_index: f64,
    /// Mean carbs per 100 g, rounded.
    pub carbs_per_100g: f64,
    /// Records the mean was taken over (0 when defaults were used).
    pub sample_size: usize,
}

/// A partially filled record for the user to complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEntryTemplate {
    /// Prefilled local name.
    pub name_local: String,
    /// Prefilled foreign name.
    pub name_foreign: String,
    /// Left at zero for the user.
    pub glycemic_index: f64,
    /// Left at zero for the user.
    pub carbs_per_100g: f64,
    /// Default serving.
    pub standard_serving: f64,
    /// Always [`FoodCategory::Other`].
    pub category: FoodCategory,
}

impl ManualEntryTemplate {
    /// Turn the template into a provisional record with the user's numbers.
    #[must_use]
    pub fn complete(self, glycemic_index: f64, carbs_per_100g: f64) -> NutritionRecord {
        NutritionRecord::new(
            provisional_id(),
            self.name_local,
            self.name_foreign,
            glycemic_index,
            carbs_per_100g,
            self.standard_serving,
            self.category,
        )
    }
}

fn provisional_id() -> RecordId {
    RecordId(format!("{PROVISIONAL_PREFIX}{}", uuid::Uuid::new_v4().simple()))
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Suggestion engine used when resolution comes back empty.
#[derive(Debug)]
pub struct FallbackEngine {
    resolver: Arc<FoodMatchResolver>,
    config: FallbackConfig,
}

impl FallbackEngine {
    /// Engine searching through `resolver` (and so through its cache).
    #[must_use]
    pub fn new(resolver: Arc<FoodMatchResolver>, config: FallbackConfig) -> Self {
        Self { resolver, config }
    }

    /// Configured similar-food limit.
    #[must_use]
    pub fn similar_limit(&self) -> usize {
        self.config.similar_limit
    }

    /// Configured popular-food limit.
    #[must_use]
    pub fn popular_limit(&self) -> usize {
        self.config.popular_limit
    }

    /// Safe-class foods (GL 0 to [`SAFE_MAX`]), lowest GL first, at most
    /// `limit`. Served through the search cache; a failed lookup yields an
    /// empty list.
    pub async fn popular_foods(&self, limit: usize) -> Vec<NutritionRecord> {
        let mut records = match self.resolver.search(&gl_range_query(0, SAFE_MAX)).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "popular-food lookup failed");
                return Vec::new();
            }
        };
        records.retain(|r| (0..=SAFE_MAX).contains(&r.calculated_gl));
        let mut records = ranking::dedup_by_id(records);
        records.sort_by_key(|r| r.calculated_gl);
        records.truncate(limit);
        debug!(popular = records.len(), "popular-food suggestions");
        records
    }

    /// Records found by searching every 2-char-and-longer prefix of each of
    /// the detection's names, best score first, at most `limit`.
    pub async fn find_similar(&self, detection: &Detection, limit: usize) -> Vec<NutritionRecord> {
        let mut prefixes: Vec<String> = Vec::new();
        for name in detection.queries() {
            let chars: Vec<char> = name.chars().collect();
            for len in 2..=chars.len() {
                let prefix: String = chars[..len].iter().collect();
                if !prefixes.contains(&prefix) {
                    prefixes.push(prefix);
                }
            }
        }

        let outcomes = join_all(prefixes.iter().map(|p| self.resolver.search(p))).await;
        let mut found = Vec::new();
        for (prefix, outcome) in prefixes.iter().zip(outcomes) {
            match outcome {
                Ok(records) => found.extend(records),
                Err(e) => debug!(prefix = %prefix, error = %e, "prefix search failed"),
            }
        }

        let mut scored: Vec<(u32, NutritionRecord)> = ranking::dedup_by_id(found)
            .into_iter()
            .map(|r| (similarity(&r, detection), r))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(limit);

        debug!(
            detection = detection.display_name(),
            prefixes = prefixes.len(),
            suggestions = scored.len(),
            "similar-food search"
        );
        scored.into_iter().map(|(_, r)| r).collect()
    }

    /// Mean GI and carbs of `category`, or the configured defaults when the
    /// category is empty or the lookup fails.
    pub async fn category_average(&self, category: FoodCategory) -> CategoryAverage {
        let defaults = CategoryAverage {
            glycemic_index: self.config.default_glycemic_index,
            carbs_per_100g: self.config.default_carbs_per_100g,
            sample_size: 0,
        };
        let records = match self.resolver.store().search_category(category).await {
            Ok(records) => records,
            Err(e) => {
                warn!(category = %category, error = %e, "category lookup failed, using defaults");
                return defaults;
            }
        };
        if records.is_empty() {
            return defaults;
        }

        #[allow(clippy::cast_precision_loss)]
        let n = records.len() as f64;
        let gi = records.iter().map(|r| r.glycemic_index).sum::<f64>() / n;
        let carbs = records.iter().map(|r| r.carbs_per_100g).sum::<f64>() / n;
        CategoryAverage {
            glycemic_index: round_half_up(gi),
            carbs_per_100g: round_half_up(carbs),
            sample_size: records.len(),
        }
    }

    /// Provisional record for `detection` using the category average.
    pub async fn default_record(&self, detection: &Detection, category: FoodCategory) -> NutritionRecord {
        let avg = self.category_average(category).await;
        let (name_local, name_foreign) = prefilled_names(detection);
        NutritionRecord::new(
            provisional_id(),
            name_local,
            name_foreign,
            avg.glycemic_index,
            avg.carbs_per_100g,
            self.config.default_serving_grams,
            category,
        )
    }

    /// Manual-entry template for `detection`. No I/O.
    #[must_use]
    pub fn manual_entry_template(&self, detection: &Detection) -> ManualEntryTemplate {
        let (name_local, name_foreign) = prefilled_names(detection);
        ManualEntryTemplate {
            name_local,
            name_foreign,
            glycemic_index: 0.0,
            carbs_per_100g: 0.0,
            standard_serving: self.config.default_serving_grams,
            category: FoodCategory::Other,
        }
    }
}

fn prefilled_names(detection: &Detection) -> (String, String) {
    (
        detection
            .name_local
            .clone()
            .unwrap_or_else(|| detection.primary_name.clone()),
        detection
            .name_foreign
            .clone()
            .unwrap_or_else(|| detection.primary_name.clone()),
    )
}

fn points(have: &str, want: Option<&str>) -> u32 {
    let (have, want) = match want {
        Some(w) if !w.trim().is_empty() && !have.trim().is_empty() => {
            (have.trim().to_lowercase(), w.trim().to_lowercase())
        }
        _ => return 0,
    };
    if have == want {
        EXACT_POINTS
    } else if have.contains(&want) || want.contains(&have) {
        PARTIAL_POINTS
    } else {
        0
    }
}

/// Point score of `record` for `detection`.
fn similarity(record: &NutritionRecord, detection: &Detection) -> u32 {
    let local = points(&record.name_local, detection.name_local.as_deref());
    let foreign = points(&record.name_foreign, detection.name_foreign.as_deref());
    let generic = points(&record.name_local, Some(&detection.primary_name))
        .max(points(&record.name_foreign, Some(&detection.primary_name)))
        .min(PARTIAL_POINTS);
    local + foreign + generic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MatchCache;
    use crate::config::CacheConfig;
    use crate::store::{NutritionStore, StaticNutritionStore};
    use crate::taxonomy::TransportError;
    use async_trait::async_trait;

    fn engine_over(store: Arc<dyn NutritionStore>) -> FallbackEngine {
        let cache = Arc::new(MatchCache::in_memory(&CacheConfig::default()));
        let resolver = Arc::new(FoodMatchResolver::new(store, cache));
        FallbackEngine::new(resolver, FallbackConfig::default())
    }

    fn engine() -> FallbackEngine {
        engine_over(Arc::new(StaticNutritionStore::new(vec![
            NutritionRecord::new("r1", "김치찌개", "Kimchi stew", 40.0, 5.0, 300.0, FoodCategory::Korean),
            NutritionRecord::new("r2", "김치", "Kimchi", 20.0, 4.0, 50.0, FoodCategory::Korean),
            NutritionRecord::new("r3", "김밥", "Gimbap", 60.0, 30.0, 200.0, FoodCategory::Korean),
            NutritionRecord::new("r4", "바나나", "Banana", 51.0, 23.0, 100.0, FoodCategory::Fruit),
        ])))
    }

    struct DownStore;

    #[async_trait]
    impl NutritionStore for DownStore {
        async fn search(&self, _query: &str) -> Result<Vec<NutritionRecord>, TransportError> {
            Err(TransportError::Unreachable("offline".into()))
        }
    }

    #[tokio::test]
    async fn similar_foods_by_prefix() {
        let det = Detection::local("김치볶음밥", 0.8);
        let similar = engine().find_similar(&det, 5).await;
        let ids: Vec<&str> = similar.iter().map(|r| r.id.as_str()).collect();
        // "김치" is contained in the detection name; "김치찌개" only shares a prefix.
        assert_eq!(ids, vec!["r2", "r1"]);
    }

    #[tokio::test]
    async fn similar_respects_limit() {
        let det = Detection::local("김치볶음밥", 0.8);
        assert_eq!(engine().find_similar(&det, 1).await.len(), 1);
    }

    #[tokio::test]
    async fn category_average_is_rounded() {
        let avg = engine().category_average(FoodCategory::Korean).await;
        assert!((avg.glycemic_index - 40.0).abs() < f64::EPSILON);
        // (5 + 4 + 30) / 3 = 13.0
        assert!((avg.carbs_per_100g - 13.0).abs() < f64::EPSILON);
        assert_eq!(avg.sample_size, 3);
    }

    #[tokio::test]
    async fn category_average_defaults() {
        let empty = engine().category_average(FoodCategory::Dairy).await;
        assert!((empty.glycemic_index - 50.0).abs() < f64::EPSILON);
        let down = engine_over(Arc::new(DownStore)).category_average(FoodCategory::Korean).await;
        assert!((down.carbs_per_100g - 20.0).abs() < f64::EPSILON);
        assert_eq!(down.sample_size, 0);
    }

    #[tokio::test]
    async fn default_record_is_provisional() {
        let engine = engine();
        let det = Detection::local("된장찌개", 0.8);
        let record = engine.default_record(&det, FoodCategory::Korean).await;
        assert!(record.is_provisional());
        assert_eq!(record.name_local, "된장찌개");
        assert!(!engine.resolver.cache().put_record(record));
    }

    #[tokio::test]
    async fn popular_foods_are_low_gl_and_cached() {
        let engine = engine();
        // GLs: 김치찌개 6, 김치 0, 김밥 36, 바나나 12.
        let popular = engine.popular_foods(10).await;
        let ids: Vec<&str> = popular.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert!(engine.resolver.cache().get_search("gl:0-10").is_some());

        assert_eq!(engine.popular_foods(1).await.len(), 1);
    }

    #[tokio::test]
    async fn popular_foods_empty_when_store_is_down() {
        assert!(engine_over(Arc::new(DownStore)).popular_foods(10).await.is_empty());
    }

    #[test]
    fn manual_template_is_zeroed() {
        let template = engine().manual_entry_template(&Detection::local("식혜", 0.7));
        assert!(template.glycemic_index.abs() < f64::EPSILON);
        assert!((template.standard_serving - 100.0).abs() < f64::EPSILON);
        assert_eq!(template.category, FoodCategory::Other);
        let record = template.complete(60.0, 20.0);
        assert!(record.is_provisional());
        assert_eq!(record.calculated_gl, 12);
    }
}
