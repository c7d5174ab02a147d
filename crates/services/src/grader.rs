//! Grading of finished activities.

use std::sync::Arc;

use course_core::Clock;
use course_core::evaluator::{SlideChange, evaluate_slide_status};
use course_core::model::{
    ActivityId, ActivityMetadata, ActivityScore, ActivityStatus, ActivityType, SlideIdentifier,
};
use course_core::scoring::{GradeDecision, decide, passes, passing_threshold};
use course_core::ProgressAggregate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::emitter::StatementEmitter;
use crate::error::GradeError;

/// A finished activity as reported by the player.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRequest {
    pub activity_id: ActivityId,
    /// Used when the content declares no such activity.
    pub activity_type: Option<ActivityType>,
    pub score: Option<ActivityScore>,
    /// Overrides the threshold derived from the activity type and content.
    pub passing_score: Option<f64>,
}

impl GradeRequest {
    #[must_use]
    pub fn new(activity_id: impl Into<ActivityId>, score: Option<ActivityScore>) -> Self {
        Self {
            activity_id: activity_id.into(),
            activity_type: None,
            score,
            passing_score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeOutcome {
    pub activity_id: ActivityId,
    pub activity_type: ActivityType,
    pub score: Option<ActivityScore>,
    pub decision: GradeDecision,
    /// Owning slide, when the activity is declared in the content.
    pub slide: Option<SlideIdentifier>,
    pub slide_change: SlideChange,
    pub status_written: bool,
    pub statements: Vec<Uuid>,
}

impl GradeOutcome {
    /// Slide-level transitions are what trigger a remote save.
    #[must_use]
    pub fn needs_persist(&self) -> bool {
        self.slide_change.has_transition()
    }
}

/// Scores outcome → activity status → slide status → statements.
pub struct ActivityGrader {
    emitter: Arc<StatementEmitter>,
    clock: Clock,
}

impl ActivityGrader {
    #[must_use]
    pub fn new(emitter: Arc<StatementEmitter>, clock: Clock) -> Self {
        Self { emitter, clock }
    }

    /// Grades one activity and reports the resulting transitions.
    ///
    /// Without metadata the activity type's defaults apply and no status is
    /// written; statements are still sent.
    ///
    /// # Errors
    ///
    /// Returns `GradeError` if the aggregate rejects the status or the owning
    /// slide cannot be evaluated.
    pub fn grade(
        &self,
        aggregate: &mut ProgressAggregate,
        request: GradeRequest,
    ) -> Result<GradeOutcome, GradeError> {
        let now = self.clock.now();
        let id = request.activity_id;
        let located = aggregate
            .activity_metadata(&id)
            .map(|(guid, meta)| (guid.clone(), meta.clone()));

        let meta = located.as_ref().map(|(_, meta)| meta);
        let activity_type = meta
            .map(ActivityMetadata::activity_type)
            .or(request.activity_type)
            .unwrap_or(ActivityType::Unknown);
        if meta.is_none() {
            warn!(
                target: "progress",
                activity_id = %id,
                activity_type = activity_type.as_str(),
                "no metadata for activity; grading with defaults"
            );
        }

        let rule = meta.map_or_else(
            || activity_type.default_completion_required(),
            |meta| meta.completion_required.clone(),
        );
        let threshold = request
            .passing_score
            .or_else(|| passing_threshold(activity_type, meta));
        let passed = passes(request.score.as_ref(), threshold);
        let decision = decide(activity_type, &rule, passed);

        let mut slide = None;
        let mut slide_change = SlideChange::default();
        let mut status_written = false;

        if let Some((guid, _)) = &located {
            let owner = aggregate.structure().find(guid).cloned();
            let status = ActivityStatus {
                activity_type,
                slide_index: owner.as_ref().map_or(0, |slide| slide.index),
                slide_guid: guid.clone(),
                completed: true,
                passed,
                completed_at: Some(now),
                passed_at: passed.then_some(now),
                score: request.score,
                meets_criteria: Some(decision.meets_criteria),
            };
            aggregate.set_activity_status(&id, status, now)?;
            status_written = true;
            slide_change = evaluate_slide_status(aggregate, guid, now)?;
            slide = owner;
        }

        debug!(
            target: "progress",
            activity_id = %id,
            activity_type = activity_type.as_str(),
            rule = rule.as_str(),
            raw = request.score.map(|score| score.raw),
            threshold,
            passed,
            meets_criteria = decision.meets_criteria,
            "graded activity"
        );

        let mut statements = Vec::new();
        if decision.emit_completed {
            statements.extend(self.emitter.activity_completed(&id, activity_type, meta, request.score));
        }
        if decision.emit_pass_or_fail {
            let sent = if passed {
                self.emitter.activity_passed(&id, activity_type, meta, request.score)
            } else {
                self.emitter.activity_failed(&id, activity_type, meta, request.score)
            };
            statements.extend(sent);
        }
        if let Some(slide) = &slide {
            if slide_change.just_completed() {
                statements.extend(self.emitter.slide_completed(slide));
            }
            if slide_change.just_passed() {
                statements.extend(self.emitter.slide_passing(slide));
            }
        }

        Ok(GradeOutcome {
            activity_id: id,
            activity_type,
            score: request.score,
            decision,
            slide,
            slide_change,
            status_written,
            statements,
        })
    }
}
