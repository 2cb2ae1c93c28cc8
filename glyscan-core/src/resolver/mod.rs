//! Food match resolver: detection → ranked candidate set.
//!
//! For one detection, every non-empty name becomes a query (1 to 3). The
//! queries run concurrently, each hitting the search cache first and the
//! nutrition store on a miss (writing the result back before returning).
//! Per-query results are merged in query order, deduplicated by record id
//! and ranked with [`ranking::rank`].
//!
//! A failed query is logged and skipped. Only when every query of a
//! detection fails does the resolution carry a classified failure.

pub mod ranking;

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::{normalize_query, MatchCache};
use crate::store::NutritionStore;
use crate::taxonomy::{classify, ClassifiedError, FailureContext, TransportError};
use crate::types::{CandidateSet, Detection, NutritionRecord, RecordId};

/// One query that could not be answered.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFailure {
    /// The query text.
    pub query: String,
    /// Classified cause.
    pub error: ClassifiedError,
}

/// Resolver output for one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Ranked options for the detection (possibly empty).
    pub candidates: CandidateSet,
    /// Queries that failed.
    pub failures: Vec<QueryFailure>,
    /// Number of queries issued.
    pub queries: usize,
}

impl Resolution {
    /// Whether every issued query failed.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.queries > 0 && self.failures.len() == self.queries
    }

    /// Why the detection has no candidates, if it has none.
    ///
    /// A total query failure reports the first failure; otherwise the food
    /// simply was not found.
    #[must_use]
    pub fn drop_reason(&self) -> Option<ClassifiedError> {
        if !self.candidates.is_empty() {
            return None;
        }
        if self.all_failed() {
            if let Some(first) = self.failures.first() {
                return Some(first.error.clone());
            }
        }
        Some(ClassifiedError::food_not_found(
            self.candidates.detection.display_name(),
        ))
    }
}

/// Resolves detections against the match cache and the nutrition store.
pub struct FoodMatchResolver {
    store: Arc<dyn NutritionStore>,
    cache: Arc<MatchCache>,
}

impl std::fmt::Debug for FoodMatchResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoodMatchResolver")
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl FoodMatchResolver {
    /// Resolver over `store`, fronted by `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn NutritionStore>, cache: Arc<MatchCache>) -> Self {
        Self { store, cache }
    }

    /// The shared match cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<MatchCache> {
        &self.cache
    }

    /// The nutrition store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn NutritionStore> {
        &self.store
    }

    /// Cached search: search cache first, store on a miss, result written
    /// back to the cache. Blank queries return nothing without a lookup.
    ///
    /// # Errors
    /// Returns the store's [`TransportError`] on a miss that fails.
    pub async fn search(&self, query: &str) -> Result<Vec<NutritionRecord>, TransportError> {
        let key = normalize_query(query);
        if key.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(hit) = self.cache.get_search(&key) {
            return Ok(hit);
        }

        let start = Instant::now();
        let results = self.store.search(query.trim()).await?;
        debug!(
            query = %key,
            results = results.len(),
            elapsed_us = start.elapsed().as_micros(),
            "nutrition store search"
        );
        self.cache.put_search(&key, &results);
        Ok(results)
    }

    /// Resolve one detection.
    pub async fn resolve(&self, detection: &Detection) -> Resolution {
        let queries = detection.queries();
        if queries.is_empty() {
            debug!(detection = detection.display_name(), "no searchable names");
            return Resolution {
                candidates: CandidateSet::empty(detection.clone()),
                failures: Vec::new(),
                queries: 0,
            };
        }
        let outcomes = join_all(queries.iter().map(|q| self.search(q))).await;

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(found) => merged.extend(found),
                Err(err) => {
                    warn!(query = %query, error = %err, "food search failed");
                    failures.push(QueryFailure {
                        query: (*query).to_string(),
                        error: classify(&err, FailureContext::FoodSearch),
                    });
                }
            }
        }

        let options = ranking::rank(ranking::dedup_by_id(merged), detection);
        self.cache.put_records(&options);

        debug!(
            detection = detection.display_name(),
            queries = queries.len(),
            failed = failures.len(),
            options = options.len(),
            "resolved detection"
        );

        Resolution {
            queries: queries.len(),
            candidates: CandidateSet {
                detection: detection.clone(),
                options,
            },
            failures,
        }
    }

    /// Resolve every detection concurrently. Output order matches input.
    pub async fn resolve_all(&self, detections: &[Detection]) -> Vec<Resolution> {
        join_all(detections.iter().map(|d| self.resolve(d))).await
    }

    /// Record by id: record cache first, store on a miss, written back.
    ///
    /// # Errors
    /// Returns the classified store failure.
    pub async fn lookup_record(
        &self,
        id: &RecordId,
    ) -> Result<Option<NutritionRecord>, ClassifiedError> {
        if let Some(hit) = self.cache.get_record(id) {
            return Ok(Some(hit));
        }
        let fetched = self
            .store
            .fetch(id)
            .await
            .map_err(|e| classify(&e, FailureContext::FoodSearch))?;
        if let Some(record) = &fetched {
            self.cache.put_record(record.clone());
        }
        Ok(fetched)
    }
}
