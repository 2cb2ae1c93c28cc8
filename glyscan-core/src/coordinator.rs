//! Selection coordinator: the per-detection state machine.
//!
//! ```text
//! UNRESOLVED ──0 options──▶ DROPPED
//!     │
//!     ├──1 option────▶ AUTO_RESOLVED
//!     │
//!     └──>1 options──▶ PENDING ──choice──▶ AUTO_RESOLVED
//!                          └──discard──▶ DROPPED
//! ```
//!
//! Every request gets a [`RequestId`]. Beginning a new request discards all
//! state of the previous one; events addressed to a superseded request are
//! silent no-ops.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::gl::{self, GlAssessment};
use crate::resolver::Resolution;
use crate::taxonomy::ClassifiedError;
use crate::types::{CandidateSet, Detection, DetectionKey, NutritionRecord, RecordId, RequestId};

/// Lifecycle state of one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionState {
    /// Not yet admitted.
    Unresolved,
    /// A record was chosen (automatically or by the user).
    AutoResolved,
    /// Several options await a choice.
    Pending,
    /// No record will be chosen.
    Dropped,
}

/// A detection with several options, awaiting a choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSelection {
    /// Address of the detection.
    pub key: DetectionKey,
    /// Ranked options (always more than one).
    pub candidates: CandidateSet,
}

/// How a record entered the resolved list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionSource {
    /// The only candidate for its detection.
    Automatic,
    /// Chosen by the user from a pending selection.
    UserChoice,
    /// Added by the user outside any detection.
    Manual,
}

/// A record accepted into the meal, with its GL at the standard serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFood {
    /// Detection it resolves, if any.
    pub key: Option<DetectionKey>,
    /// The record.
    pub record: NutritionRecord,
    /// GL at `record.standard_serving`.
    pub assessment: GlAssessment,
    /// How it got here.
    pub source: ResolutionSource,
}

impl ResolvedFood {
    fn new(key: Option<DetectionKey>, record: NutritionRecord, source: ResolutionSource) -> Self {
        let assessment = gl::assess(&record, record.standard_serving);
        Self {
            key,
            record,
            assessment,
            source,
        }
    }
}

/// Why a detection was dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DropReason {
    /// Resolution produced no candidates.
    NoCandidates(ClassifiedError),
    /// The user dismissed the pending selection.
    Discarded,
}

/// A detection that will not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedDetection {
    /// Address of the detection.
    pub key: DetectionKey,
    /// The detection.
    pub detection: Detection,
    /// Why.
    pub reason: DropReason,
}

/// Result of an external resolution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event was applied.
    Applied,
    /// The key belongs to a superseded request.
    Stale,
    /// No pending selection has that key.
    Unknown,
}

/// State machine over the detections of the active request.
#[derive(Debug, Default)]
pub struct SelectionCoordinator {
    active: Option<RequestId>,
    last_issued: u64,
    states: HashMap<DetectionKey, SelectionState>,
    pending: Vec<PendingSelection>,
    resolved: Vec<ResolvedFood>,
    dropped: Vec<DroppedDetection>,
}

impl SelectionCoordinator {
    /// Idle coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, discarding everything from the previous one.
    pub fn begin_request(&mut self) -> RequestId {
        self.last_issued += 1;
        let id = RequestId(self.last_issued);
        if let Some(previous) = self.active {
            info!(
                previous = %previous,
                next = %id,
                discarded_pending = self.pending.len(),
                "request superseded"
            );
        }
        self.active = Some(id);
        self.reset();
        id
    }

    fn reset(&mut self) {
        self.states.clear();
        self.pending.clear();
        self.resolved.clear();
        self.dropped.clear();
    }

    /// The request events are accepted for.
    #[must_use]
    pub fn active_request(&self) -> Option<RequestId> {
        self.active
    }

    /// Whether `request` is the active request.
    #[must_use]
    pub fn is_active(&self, request: RequestId) -> bool {
        self.active == Some(request)
    }

    /// Admit the resolver's output for `request`, in detection order.
    ///
    /// Returns `false` (and changes nothing) when `request` was superseded.
    pub fn admit(&mut self, request: RequestId, resolutions: Vec<Resolution>) -> bool {
        if !self.is_active(request) {
            debug!(request = %request, "ignoring results of superseded request");
            return false;
        }

        for (position, resolution) in resolutions.into_iter().enumerate() {
            let key = DetectionKey { request, position };
            let reason = resolution.drop_reason();
            let CandidateSet { detection, mut options } = resolution.candidates;
            let state = match options.len() {
                0 => {
                    self.dropped.push(DroppedDetection {
                        key,
                        detection,
                        reason: DropReason::NoCandidates(
                            reason.unwrap_or_else(|| ClassifiedError::food_not_found("")),
                        ),
                    });
                    SelectionState::Dropped
                }
                1 => {
                    let record = options.remove(0);
                    self.resolved
                        .push(ResolvedFood::new(Some(key), record, ResolutionSource::Automatic));
                    SelectionState::AutoResolved
                }
                _ => {
                    self.pending.push(PendingSelection {
                        key,
                        candidates: CandidateSet { detection, options },
                    });
                    SelectionState::Pending
                }
            };
            self.states.insert(key, state);
        }

        debug!(
            request = %request,
            resolved = self.resolved.len(),
            pending = self.pending.len(),
            dropped = self.dropped.len(),
            "admitted resolutions"
        );
        true
    }

    fn take_pending(&mut self, key: DetectionKey) -> Result<PendingSelection, EventOutcome> {
        if !self.is_active(key.request) {
            debug!(key = %key, "stale selection event");
            return Err(EventOutcome::Stale);
        }
        let Some(index) = self.pending.iter().position(|p| p.key == key) else {
            debug!(key = %key, "selection event for unknown key");
            return Err(EventOutcome::Unknown);
        };
        Ok(self.pending.remove(index))
    }

    /// Apply an external choice for a pending detection.
    ///
    /// The chosen record is not checked against the pending options. If a
    /// record with the same id is already resolved, it is not added twice.
    pub fn resolve(&mut self, key: DetectionKey, chosen: NutritionRecord) -> EventOutcome {
        if let Err(outcome) = self.take_pending(key) {
            return outcome;
        }
        if !self.resolved.iter().any(|r| r.record.id == chosen.id) {
            self.resolved
                .push(ResolvedFood::new(Some(key), chosen, ResolutionSource::UserChoice));
        }
        self.states.insert(key, SelectionState::AutoResolved);
        EventOutcome::Applied
    }

    /// Dismiss a pending detection.
    pub fn discard(&mut self, key: DetectionKey) -> EventOutcome {
        match self.take_pending(key) {
            Ok(pending) => {
                self.dropped.push(DroppedDetection {
                    key,
                    detection: pending.candidates.detection,
                    reason: DropReason::Discarded,
                });
                self.states.insert(key, SelectionState::Dropped);
                EventOutcome::Applied
            }
            Err(outcome) => outcome,
        }
    }

    /// Add a record picked outside any detection. Returns `false` if a record
    /// with that id is already resolved.
    pub fn add_manual(&mut self, record: NutritionRecord) -> bool {
        if self.resolved.iter().any(|r| r.record.id == record.id) {
            return false;
        }
        self.resolved
            .push(ResolvedFood::new(None, record, ResolutionSource::Manual));
        true
    }

    /// Remove every resolved entry with `id`. Returns whether any went.
    pub fn remove_record(&mut self, id: &RecordId) -> bool {
        let before = self.resolved.len();
        self.resolved.retain(|r| &r.record.id != id);
        before != self.resolved.len()
    }

    /// Forget all state, keeping the active request id.
    pub fn clear(&mut self) {
        self.reset();
    }

    /// State of a detection. `None` for keys of a superseded request.
    #[must_use]
    pub fn state_of(&self, key: DetectionKey) -> Option<SelectionState> {
        if !self.is_active(key.request) {
            return None;
        }
        Some(
            self.states
                .get(&key)
                .copied()
                .unwrap_or(SelectionState::Unresolved),
        )
    }

    /// Detections awaiting a choice, in detection order.
    #[must_use]
    pub fn pending(&self) -> &[PendingSelection] {
        &self.pending
    }

    /// Resolved foods, in the order they were accepted.
    #[must_use]
    pub fn resolved(&self) -> &[ResolvedFood] {
        &self.resolved
    }

    /// Dropped detections.
    #[must_use]
    pub fn dropped(&self) -> &[DroppedDetection] {
        &self.dropped
    }

    /// Sum of the resolved records' standard-serving GL.
    #[must_use]
    pub fn total_gl(&self) -> i64 {
        gl::total_gl(self.resolved.iter().map(|r| &r.record))
    }
}
