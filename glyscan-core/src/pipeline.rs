//! Analysis pipeline: image → detections → candidates → selections.
//!
//! [`AnalysisPipeline::analyze`] runs one request end to end and reports a
//! phase. Starting a request supersedes the previous one; a request that
//! finishes after being superseded reports [`AnalysisPhase::Superseded`]
//! and leaves the coordinator untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{GlyscanConfig, ParserConfig};
use crate::coordinator::{
    DroppedDetection, EventOutcome, PendingSelection, ResolvedFood, SelectionCoordinator,
};
use crate::fallback::{FallbackEngine, ManualEntryTemplate};
use crate::parser::{self, ParseOutcome};
use crate::resolver::FoodMatchResolver;
use crate::store::Recognizer;
use crate::taxonomy::{classify, ClassifiedError, FailureContext, TransportError};
use crate::types::{Detection, DetectionKey, NutritionRecord, RecordId, RequestId};

// ---------------------------------------------------------------------------
// Image payload
// ---------------------------------------------------------------------------

/// Bare base64 image data, as the recognizer expects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload(String);

impl ImagePayload {
    /// Accept bare base64 or a `data:image/...;base64,` URL.
    ///
    /// # Errors
    /// Returns [`TransportError::Payload`] when no image data remains.
    pub fn from_input(input: &str) -> Result<Self, TransportError> {
        let trimmed = input.trim();
        let data = if trimmed.starts_with("data:") {
            trimmed.split_once(',').map_or("", |(_, rest)| rest)
        } else {
            trimmed
        };
        if data.is_empty() {
            return Err(TransportError::Payload("empty image data".to_string()));
        }
        Ok(Self(data.to_string()))
    }

    /// The base64 text.
    #[must_use]
    pub fn as_base64(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Everything one finished request produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// The request.
    pub request_id: RequestId,
    /// Parsed detections, in model order.
    pub detections: Vec<Detection>,
    /// Automatically resolved foods.
    pub resolved: Vec<ResolvedFood>,
    /// Detections awaiting a choice.
    pub pending: Vec<PendingSelection>,
    /// Detections with no candidates.
    pub dropped: Vec<DroppedDetection>,
    /// Mean detection confidence.
    pub mean_confidence: f32,
    /// Sum of resolved GL.
    pub total_gl: i64,
    /// When the report was built.
    pub timestamp: DateTime<Utc>,
}

/// Where a request stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisPhase {
    /// Still running.
    Analyzing,
    /// Finished; selections admitted.
    Resolved(AnalysisReport),
    /// Terminal failure for this request.
    Failed(ClassifiedError),
    /// A newer request took over.
    Superseded,
}

/// Result of [`AnalysisPipeline::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// The request.
    pub request_id: RequestId,
    /// Final phase.
    pub phase: AnalysisPhase,
}

/// Fallback options for a dropped detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSuggestion {
    /// Similar foods, best first.
    pub similar: Vec<NutritionRecord>,
    /// Popular low-GL foods, lowest GL first.
    pub popular: Vec<NutritionRecord>,
    /// Template for manual entry.
    pub template: ManualEntryTemplate,
}

fn mean_confidence(detections: &[Detection]) -> f32 {
    if detections.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = detections.len() as f32;
    detections.iter().map(|d| d.confidence).sum::<f32>() / n
}

// ---------------------------------------------------------------------------
// AnalysisPipeline
// ---------------------------------------------------------------------------

/// Wires recognizer, parser, resolver, coordinator and fallback engine.
///
/// The coordinator lock is only taken for synchronous sections.
pub struct AnalysisPipeline {
    recognizer: Arc<dyn Recognizer>,
    resolver: Arc<FoodMatchResolver>,
    fallback: FallbackEngine,
    coordinator: Mutex<SelectionCoordinator>,
    status: Mutex<Option<AnalysisOutcome>>,
    parser: ParserConfig,
    recognition_timeout: Duration,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("resolver", &self.resolver)
            .field("recognition_timeout", &self.recognition_timeout)
            .finish_non_exhaustive()
    }
}

impl AnalysisPipeline {
    /// Pipeline over an injected recognizer and resolver.
    #[must_use]
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        resolver: Arc<FoodMatchResolver>,
        config: &GlyscanConfig,
    ) -> Self {
        Self {
            recognizer,
            fallback: FallbackEngine::new(resolver.clone(), config.fallback.clone()),
            resolver,
            coordinator: Mutex::new(SelectionCoordinator::new()),
            status: Mutex::new(None),
            parser: config.parser.clone(),
            recognition_timeout: Duration::from_millis(config.vision.timeout_ms),
        }
    }

    /// The resolver (and through it, the match cache).
    #[must_use]
    pub fn resolver(&self) -> &Arc<FoodMatchResolver> {
        &self.resolver
    }

    /// The fallback engine.
    #[must_use]
    pub fn fallback(&self) -> &FallbackEngine {
        &self.fallback
    }

    /// Run one analysis request.
    pub async fn analyze(&self, image: &str) -> AnalysisOutcome {
        let start = Instant::now();
        let request_id = self.coordinator.lock().begin_request();
        self.set_status(AnalysisOutcome {
            request_id,
            phase: AnalysisPhase::Analyzing,
        });
        info!(request_id = %request_id, "analysis started");

        let phase = match self.run(request_id, image).await {
            Ok(phase) => phase,
            Err(error) => {
                if self.coordinator.lock().is_active(request_id) {
                    warn!(request_id = %request_id, kind = ?error.kind, "analysis failed");
                    AnalysisPhase::Failed(error)
                } else {
                    AnalysisPhase::Superseded
                }
            }
        };

        let outcome = AnalysisOutcome { request_id, phase };
        if !matches!(outcome.phase, AnalysisPhase::Superseded) {
            self.set_status(outcome.clone());
        }
        info!(
            request_id = %request_id,
            elapsed_ms = start.elapsed().as_millis(),
            superseded = matches!(outcome.phase, AnalysisPhase::Superseded),
            "analysis finished"
        );
        outcome
    }

    async fn run(&self, request_id: RequestId, image: &str) -> Result<AnalysisPhase, ClassifiedError> {
        let recognition = |e: TransportError| classify(&e, FailureContext::Recognition);

        let payload = ImagePayload::from_input(image).map_err(recognition)?;
        let raw = match tokio::time::timeout(
            self.recognition_timeout,
            self.recognizer.recognize(payload.as_base64()),
        )
        .await
        {
            Ok(result) => result.map_err(recognition)?,
            Err(_) => {
                let ms = u64::try_from(self.recognition_timeout.as_millis()).unwrap_or(u64::MAX);
                return Err(recognition(TransportError::Timeout(ms)));
            }
        };

        let detections = match parser::parse(&raw, &self.parser) {
            ParseOutcome::Parsed(d) => d,
            ParseOutcome::Empty => return Err(ClassifiedError::recognition_empty()),
        };
        debug!(request_id = %request_id, detections = detections.len(), "recognition parsed");

        let resolutions = self.resolver.resolve_all(&detections).await;

        let mut coordinator = self.coordinator.lock();
        if !coordinator.admit(request_id, resolutions) {
            return Ok(AnalysisPhase::Superseded);
        }
        Ok(AnalysisPhase::Resolved(AnalysisReport {
            request_id,
            mean_confidence: mean_confidence(&detections),
            detections,
            resolved: coordinator.resolved().to_vec(),
            pending: coordinator.pending().to_vec(),
            dropped: coordinator.dropped().to_vec(),
            total_gl: coordinator.total_gl(),
            timestamp: Utc::now(),
        }))
    }

    fn set_status(&self, outcome: AnalysisOutcome) {
        let mut status = self.status.lock();
        let newer_exists = status
            .as_ref()
            .is_some_and(|s| s.request_id > outcome.request_id);
        if !newer_exists {
            *status = Some(outcome);
        }
    }

    /// Latest known outcome of the most recent request.
    #[must_use]
    pub fn status(&self) -> Option<AnalysisOutcome> {
        self.status.lock().clone()
    }

    // ------------------------------------------------------------------
    // Selection events
    // ------------------------------------------------------------------

    /// Apply a user's choice for a pending detection.
    pub fn resolve_selection(&self, key: DetectionKey, chosen: NutritionRecord) -> EventOutcome {
        self.coordinator.lock().resolve(key, chosen)
    }

    /// Dismiss a pending detection.
    pub fn discard(&self, key: DetectionKey) -> EventOutcome {
        self.coordinator.lock().discard(key)
    }

    /// Add a record outside any detection (deduplicated by id).
    pub fn add_manual(&self, record: NutritionRecord) -> bool {
        self.coordinator.lock().add_manual(record)
    }

    /// Remove a resolved record.
    pub fn remove_record(&self, id: &RecordId) -> bool {
        self.coordinator.lock().remove_record(id)
    }

    /// Forget all selections.
    pub fn clear(&self) {
        self.coordinator.lock().clear();
    }

    /// Pending selections of the active request.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingSelection> {
        self.coordinator.lock().pending().to_vec()
    }

    /// Resolved foods of the active request.
    #[must_use]
    pub fn resolved(&self) -> Vec<ResolvedFood> {
        self.coordinator.lock().resolved().to_vec()
    }

    /// Sum of resolved GL.
    #[must_use]
    pub fn total_gl(&self) -> i64 {
        self.coordinator.lock().total_gl()
    }

    /// Similar foods, popular low-GL picks and a manual-entry template for
    /// a detection.
    pub async fn suggest_fallback(&self, detection: &Detection) -> FallbackSuggestion {
        let (similar, popular) = futures::join!(
            self.fallback.find_similar(detection, self.fallback.similar_limit()),
            self.fallback.popular_foods(self.fallback.popular_limit()),
        );
        FallbackSuggestion {
            similar,
            popular,
            template: self.fallback.manual_entry_template(detection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MatchCache;
    use crate::store::StaticNutritionStore;
    use crate::taxonomy::ErrorKind;
    use crate::types::FoodCategory;
    use async_trait::async_trait;

    struct FixedRecognizer(Result<String, TransportError>);

    #[async_trait]
    impl Recognizer for FixedRecognizer {
        async fn recognize(&self, _image: &str) -> Result<String, TransportError> {
            self.0.clone()
        }
    }

    struct SlowRecognizer;

    #[async_trait]
    impl Recognizer for SlowRecognizer {
        async fn recognize(&self, _image: &str) -> Result<String, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    fn pipeline(recognizer: Arc<dyn Recognizer>) -> AnalysisPipeline {
        let config = GlyscanConfig::default();
        let store = Arc::new(StaticNutritionStore::new(vec![NutritionRecord::new(
            "a", "사과", "Apple", 36.0, 14.0, 100.0, FoodCategory::Fruit,
        )]));
        let cache = Arc::new(MatchCache::in_memory(&config.cache));
        let resolver = Arc::new(FoodMatchResolver::new(store, cache));
        AnalysisPipeline::new(recognizer, resolver, &config)
    }

    #[test]
    fn image_payload_strips_data_url() {
        let p = ImagePayload::from_input("data:image/jpeg;base64,QUJD").expect("payload");
        assert_eq!(p.as_base64(), "QUJD");
        assert_eq!(ImagePayload::from_input(" QUJD ").expect("payload").as_base64(), "QUJD");
        assert!(ImagePayload::from_input("data:image/png;base64,").is_err());
        assert!(ImagePayload::from_input("").is_err());
    }

    #[tokio::test]
    async fn resolves_single_match() {
        let p = pipeline(Arc::new(FixedRecognizer(Ok(
            r#"{"foods":[{"nameKo":"사과","confidence":0.95}]}"#.to_string(),
        ))));
        let outcome = p.analyze("QUJD").await;
        let AnalysisPhase::Resolved(report) = outcome.phase else {
            panic!("expected resolved, got {:?}", outcome.phase);
        };
        assert_eq!(report.resolved.len(), 1);
        assert_eq!(report.resolved[0].assessment.gl, 5);
        assert!((report.mean_confidence - 0.95).abs() < 1e-6);
        assert_eq!(p.status().map(|s| s.request_id), Some(outcome.request_id));
    }

    #[tokio::test]
    async fn vision_failure_is_classified() {
        let p = pipeline(Arc::new(FixedRecognizer(Err(TransportError::Status {
            status: 503,
            body: String::new(),
        }))));
        let outcome = p.analyze("QUJD").await;
        let AnalysisPhase::Failed(err) = outcome.phase else {
            panic!("expected failure");
        };
        assert_eq!(err.kind, ErrorKind::ApiError);
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn unusable_reply_is_recognition_failure() {
        let p = pipeline(Arc::new(FixedRecognizer(Ok("I cannot tell.".to_string()))));
        let AnalysisPhase::Failed(err) = p.analyze("QUJD").await.phase else {
            panic!("expected failure");
        };
        assert_eq!(err.kind, ErrorKind::AiRecognitionFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn recognition_times_out() {
        let p = pipeline(Arc::new(SlowRecognizer));
        let AnalysisPhase::Failed(err) = p.analyze("QUJD").await.phase else {
            panic!("expected failure");
        };
        assert_eq!(err.kind, ErrorKind::TimeoutError);
    }

    #[tokio::test]
    async fn fallback_suggestion_for_unknown_food() {
        let p = pipeline(Arc::new(FixedRecognizer(Ok(String::new()))));
        let suggestion = p.suggest_fallback(&Detection::local("사과파이", 0.7)).await;
        assert_eq!(suggestion.similar.len(), 1);
        assert_eq!(suggestion.template.name_local, "사과파이");
    }
}
