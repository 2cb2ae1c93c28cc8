//! Collaborator seams: the nutrition store and the vision recognizer.
//!
//! Both are injected as trait objects so tests and embedders can substitute
//! them. They report failures as raw [`TransportError`]s; classification
//! happens in the resolver and the pipeline.

use async_trait::async_trait;

use crate::taxonomy::TransportError;
use crate::types::{FoodCategory, NutritionRecord, RecordId};

/// Free-text search over the nutrition database.
///
/// Results are unranked and may contain records whose names only loosely
/// match the query.
#[async_trait]
pub trait NutritionStore: Send + Sync {
    /// Search by free text.
    async fn search(&self, query: &str) -> Result<Vec<NutritionRecord>, TransportError>;

    /// Fetch one record by id.
    async fn fetch(&self, id: &RecordId) -> Result<Option<NutritionRecord>, TransportError> {
        let found = self.search(id.as_str()).await?;
        Ok(found.into_iter().find(|r| &r.id == id))
    }

    /// Every record of a category.
    async fn search_category(
        &self,
        category: FoodCategory,
    ) -> Result<Vec<NutritionRecord>, TransportError> {
        let found = self.search(&format!("category:{}", category.label())).await?;
        Ok(found.into_iter().filter(|r| r.category == category).collect())
    }

    /// Records whose calculated GL lies in `min..=max`.
    async fn search_gl_range(
        &self,
        min: i64,
        max: i64,
    ) -> Result<Vec<NutritionRecord>, TransportError> {
        let found = self.search(&gl_range_query(min, max)).await?;
        Ok(found
            .into_iter()
            .filter(|r| (min..=max).contains(&r.calculated_gl))
            .collect())
    }
}

/// Query text for a GL range lookup: `gl:<min>-<max>`.
#[must_use]
pub fn gl_range_query(min: i64, max: i64) -> String {
    format!("gl:{min}-{max}")
}

/// Parse the body of a `gl:` query. Bounds are non-negative integers.
fn parse_gl_range(range: &str) -> Option<(i64, i64)> {
    let (min, max) = range.trim().split_once('-')?;
    Some((min.trim().parse().ok()?, max.trim().parse().ok()?))
}

/// The vision model: one base64 image in, one opaque reply out.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognise foods in a bare base64 JPEG.
    async fn recognize(&self, image_base64: &str) -> Result<String, TransportError>;
}

/// In-memory catalogue with case-insensitive substring search.
///
/// Understands the `category:<label>` and `gl:<min>-<max>` query forms.
#[derive(Debug, Clone, Default)]
pub struct StaticNutritionStore {
    records: Vec<NutritionRecord>,
}

impl StaticNutritionStore {
    /// Catalogue over `records`.
    #[must_use]
    pub fn new(records: Vec<NutritionRecord>) -> Self {
        Self { records }
    }

    /// All records.
    #[must_use]
    pub fn records(&self) -> &[NutritionRecord] {
        &self.records
    }

    fn matches(record: &NutritionRecord, needle: &str) -> bool {
        record
            .names()
            .any(|n| n.to_lowercase().contains(needle))
    }
}

#[async_trait]
impl NutritionStore for StaticNutritionStore {
    async fn search(&self, query: &str) -> Result<Vec<NutritionRecord>, TransportError> {
        let query = query.trim();
        if let Some(label) = query.strip_prefix("category:") {
            let category = FoodCategory::from_label(label);
            return Ok(self
                .records
                .iter()
                .filter(|r| r.category == category)
                .cloned()
                .collect());
        }
        if let Some(range) = query.strip_prefix("gl:") {
            let Some((min, max)) = parse_gl_range(range) else {
                return Ok(Vec::new());
            };
            return Ok(self
                .records
                .iter()
                .filter(|r| (min..=max).contains(&r.calculated_gl))
                .cloned()
                .collect());
        }
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .records
            .iter()
            .filter(|r| r.id.as_str() == query || Self::matches(r, &needle))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StaticNutritionStore {
        StaticNutritionStore::new(vec![
            NutritionRecord::new("a", "사과", "Apple", 36.0, 14.0, 100.0, FoodCategory::Fruit),
            NutritionRecord::new("b", "사과주스", "Apple juice", 41.0, 11.0, 200.0, FoodCategory::Beverage),
            NutritionRecord::new("c", "쌀밥", "Rice", 73.0, 28.0, 210.0, FoodCategory::Grain),
        ])
    }

    #[tokio::test]
    async fn substring_search_is_case_insensitive() {
        let found = catalog().search("APPLE").await.expect("search");
        assert_eq!(found.len(), 2);
        assert!(catalog().search("  ").await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn default_fetch_and_category() {
        let store = catalog();
        let rice = store.fetch(&RecordId::new("c")).await.expect("fetch");
        assert_eq!(rice.map(|r| r.name_local), Some("쌀밥".to_string()));
        assert!(store.fetch(&RecordId::new("zz")).await.expect("fetch").is_none());

        let fruit = store.search_category(FoodCategory::Fruit).await.expect("category");
        assert_eq!(fruit.len(), 1);
    }

    #[tokio::test]
    async fn gl_range_query_form() {
        let store = catalog();
        // GLs: 사과 5, 사과주스 9, 쌀밥 43.
        let low = store.search("gl:0-10").await.expect("search");
        let ids: Vec<&str> = low.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let high = store.search_gl_range(20, 100).await.expect("range");
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].id.as_str(), "c");

        assert!(store.search("gl:ten-twenty").await.expect("search").is_empty());
        assert_eq!(gl_range_query(0, 10), "gl:0-10");
    }
}
