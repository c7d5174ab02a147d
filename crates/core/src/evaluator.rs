//! Derivation of slide and AU outcomes from activity statuses.
//!
//! Everything here reads the aggregate; only [`evaluate_slide_status`] and
//! [`refresh_au_outcome`] write the derived flags back.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::aggregate::ProgressAggregate;
use crate::error::EvaluationError;
use crate::model::{ActivityScore, MoveOn, SlideGuid, SlideStatus};

/// Slide flags before and after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlideChange {
    pub was_completed: bool,
    pub was_passed: bool,
    pub is_now_completed: bool,
    pub is_now_passed: bool,
}

impl SlideChange {
    #[must_use]
    pub fn just_completed(&self) -> bool {
        !self.was_completed && self.is_now_completed
    }

    #[must_use]
    pub fn just_passed(&self) -> bool {
        !self.was_passed && self.is_now_passed
    }

    /// True when either flag flipped on; such changes are persisted remotely.
    #[must_use]
    pub fn has_transition(&self) -> bool {
        self.just_completed() || self.just_passed()
    }
}

/// AU-level flags before and after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuChange {
    pub progress: u8,
    pub was_completed: bool,
    pub was_passed: bool,
    pub is_completed: bool,
    pub is_passed: bool,
}

impl AuChange {
    #[must_use]
    pub fn just_completed(&self) -> bool {
        !self.was_completed && self.is_completed
    }

    #[must_use]
    pub fn just_passed(&self) -> bool {
        !self.was_passed && self.is_passed
    }
}

/// Computes a slide's derived flags without touching the aggregate.
///
/// # Errors
///
/// Returns `EvaluationError::UnknownSlide` if the slide has no status entry.
pub fn derive_slide_status(
    aggregate: &ProgressAggregate,
    guid: &SlideGuid,
) -> Result<SlideStatus, EvaluationError> {
    let mut status = *aggregate
        .slide_status(guid)
        .ok_or_else(|| EvaluationError::UnknownSlide(guid.clone()))?;

    let activities = aggregate
        .slide_activities(guid)
        .filter(|activities| !activities.is_empty());

    let Some(activities) = activities else {
        status.completed = status.viewed;
        status.passed = status.viewed;
        status.failed = false;
        return Ok(status);
    };

    let mut all_completed = true;
    let mut all_passed = true;
    let mut any_failed = false;

    for (id, meta) in activities {
        let Some(activity) = aggregate.activity_status(id) else {
            all_completed = false;
            all_passed = false;
            continue;
        };
        let rule = &meta.completion_required;
        all_completed &= rule.satisfies_completion(activity.completed, activity.passed);
        all_passed &= rule.satisfies_passing(activity.completed, activity.passed);
        any_failed |= activity.completed && !activity.passed && rule.requires_grading();
    }

    status.completed = all_completed;
    status.passed = all_passed;
    status.failed = any_failed;
    Ok(status)
}

/// Re-derives a slide's flags and stores them, returning the transition.
///
/// # Errors
///
/// Returns `EvaluationError::UnknownSlide` if the slide is not part of the course.
pub fn evaluate_slide_status(
    aggregate: &mut ProgressAggregate,
    guid: &SlideGuid,
    now: DateTime<Utc>,
) -> Result<SlideChange, EvaluationError> {
    let before = *aggregate
        .slide_status(guid)
        .ok_or_else(|| EvaluationError::UnknownSlide(guid.clone()))?;
    let after = derive_slide_status(aggregate, guid)?;

    aggregate
        .set_slide_status(guid, after, now)
        .map_err(|_| EvaluationError::UnknownSlide(guid.clone()))?;

    let change = SlideChange {
        was_completed: before.completed,
        was_passed: before.passed,
        is_now_completed: after.completed,
        is_now_passed: after.passed,
    };
    debug!(
        target: "progress",
        slide_guid = %guid,
        completed = after.completed,
        passed = after.passed,
        failed = after.failed,
        transition = change.has_transition(),
        "evaluated slide"
    );
    Ok(change)
}

fn all_slides(aggregate: &ProgressAggregate) -> (bool, bool) {
    let statuses = &aggregate.progress().slide_status;
    let completed = statuses.values().all(|status| status.completed);
    let passed = statuses.values().all(|status| status.passed);
    (completed, passed)
}

/// Whether the AU satisfies its `moveOn` rule.
#[must_use]
pub fn evaluate_au_completion(aggregate: &ProgressAggregate) -> bool {
    if aggregate.structure().slide_count() == 0 {
        return true;
    }
    let (completed, passed) = all_slides(aggregate);
    match aggregate.structure().move_on() {
        MoveOn::Completed => completed,
        MoveOn::Passed => passed,
        MoveOn::CompletedAndPassed => completed && passed,
        MoveOn::CompletedOrPassed => completed || passed,
        MoveOn::NotApplicable => true,
    }
}

/// Whether the AU counts as passed. A `Completed` AU never carries success.
#[must_use]
pub fn evaluate_au_passed(aggregate: &ProgressAggregate) -> bool {
    let (completed, passed) = all_slides(aggregate);
    match aggregate.structure().move_on() {
        MoveOn::Completed => false,
        MoveOn::CompletedAndPassed => completed && passed,
        MoveOn::NotApplicable => true,
        MoveOn::Passed | MoveOn::CompletedOrPassed => passed,
    }
}

/// Share of progress steps achieved, rounded and clamped to `0..=100`.
///
/// Passed slides plus every activity meeting its criteria, over the step
/// total. Activities outside the step total can push the sum past it.
#[must_use]
pub fn progress_percentage(aggregate: &ProgressAggregate) -> u8 {
    let progress = aggregate.progress();
    let passed_slides = progress
        .slide_status
        .values()
        .filter(|status| status.passed)
        .count();

    if progress.total_progress_steps > 0 {
        let meeting_criteria = progress
            .activity_status
            .iter()
            .filter(|(_, status)| status.meets_criteria == Some(true))
            .count();
        ratio(passed_slides + meeting_criteria, progress.total_progress_steps)
    } else {
        ratio(passed_slides, aggregate.structure().slide_count())
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ratio(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (done as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Index to resume at: the first slide not completed, or the last slide when
/// everything is done. A course without slides resumes at 0.
#[must_use]
pub fn first_incomplete_slide_index(aggregate: &ProgressAggregate) -> usize {
    let slides = aggregate.structure().slides();
    if slides.is_empty() {
        return 0;
    }
    slides
        .iter()
        .find(|slide| {
            !aggregate
                .slide_status(&slide.guid)
                .is_some_and(|status| status.completed)
        })
        .map_or(slides.len() - 1, |slide| slide.index)
}

/// Mean score over completed activities that recorded one.
#[must_use]
pub fn average_score(aggregate: &ProgressAggregate) -> Option<ActivityScore> {
    let scores: Vec<ActivityScore> = aggregate
        .progress()
        .activity_status
        .values()
        .filter(|status| status.completed)
        .filter_map(|status| status.score)
        .collect();
    if scores.is_empty() {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let count = scores.len() as f64;
    let mean = |field: fn(&ActivityScore) -> f64| scores.iter().map(field).sum::<f64>() / count;
    let scaled = mean(|score| score.scaled.unwrap_or_default());

    Some(ActivityScore {
        raw: mean(|score| score.raw).round(),
        min: mean(|score| score.min).round(),
        max: mean(|score| score.max).round(),
        scaled: Some((scaled * 100.0).round() / 100.0),
    })
}

/// Recomputes progress percentage and AU completion/pass, storing the result.
pub fn refresh_au_outcome(aggregate: &mut ProgressAggregate, now: DateTime<Utc>) -> AuChange {
    let was_completed = aggregate.progress().au_completed;
    let was_passed = aggregate.progress().au_passed;

    let progress = progress_percentage(aggregate);
    let is_completed = evaluate_au_completion(aggregate);
    let is_passed = evaluate_au_passed(aggregate);
    aggregate.set_au_outcome(progress, is_completed, is_passed, now);

    AuChange {
        progress,
        was_completed,
        was_passed,
        is_completed,
        is_passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::sample;
    use crate::model::{ActivityId, ActivityStatus, CourseStructure};
    use crate::parser::ActivitiesMeta;
    use crate::time::fixed_now;

    fn grade(aggregate: &mut ProgressAggregate, id: &str, completed: bool, passed: bool) {
        let id = ActivityId::new(id);
        let mut status = aggregate.activity_status(&id).cloned().unwrap();
        status.completed = completed;
        status.passed = passed;
        status.meets_criteria = Some(passed);
        aggregate.set_activity_status(&id, status, fixed_now()).unwrap();
    }

    fn view_and_evaluate(aggregate: &mut ProgressAggregate, guid: &str) -> SlideChange {
        let guid = SlideGuid::new(guid);
        aggregate.mark_viewed(&guid, fixed_now()).unwrap();
        evaluate_slide_status(aggregate, &guid, fixed_now()).unwrap()
    }

    fn set_slide(aggregate: &mut ProgressAggregate, guid: &str, completed: bool, passed: bool) {
        let status = SlideStatus {
            viewed: true,
            completed,
            passed,
            ..SlideStatus::default()
        };
        aggregate
            .set_slide_status(&SlideGuid::new(guid), status, fixed_now())
            .unwrap();
    }

    #[test]
    fn slide_without_activities_mirrors_viewed() {
        let mut aggregate = sample(MoveOn::Completed);
        let status = derive_slide_status(&aggregate, &SlideGuid::new("a")).unwrap();
        assert!(!status.completed && !status.passed);

        let change = view_and_evaluate(&mut aggregate, "a");
        assert!(change.just_completed() && change.just_passed());
        let status = aggregate.slide_status(&SlideGuid::new("a")).unwrap();
        assert_eq!(status.completed, status.viewed);
        assert_eq!(status.passed, status.viewed);
    }

    #[test]
    fn slide_passes_only_when_every_passed_activity_passes() {
        let mut aggregate = sample(MoveOn::Completed);
        grade(&mut aggregate, "q1", true, true);
        let change = view_and_evaluate(&mut aggregate, "b");
        assert!(!change.is_now_passed);

        grade(&mut aggregate, "j1", true, true);
        let change = evaluate_slide_status(&mut aggregate, &SlideGuid::new("b"), fixed_now()).unwrap();
        assert!(change.just_passed() && change.just_completed());
    }

    #[test]
    fn failed_flag_marks_graded_activity_that_did_not_pass() {
        let mut aggregate = sample(MoveOn::Completed);
        grade(&mut aggregate, "c1", true, false);
        let status = derive_slide_status(&aggregate, &SlideGuid::new("c")).unwrap();
        assert!(status.failed);
        assert!(!status.completed);
        assert!(!status.passed);
    }

    #[test]
    fn unknown_slide_is_an_error() {
        let mut aggregate = sample(MoveOn::Completed);
        let err = evaluate_slide_status(&mut aggregate, &SlideGuid::new("nope"), fixed_now()).unwrap_err();
        assert_eq!(err, EvaluationError::UnknownSlide(SlideGuid::new("nope")));
    }

    #[test]
    fn completed_move_on_ignores_failed_passing() {
        let mut aggregate = sample(MoveOn::Completed);
        set_slide(&mut aggregate, "a", true, true);
        set_slide(&mut aggregate, "b", true, false);
        set_slide(&mut aggregate, "c", true, true);
        assert!(evaluate_au_completion(&aggregate));
        assert!(!evaluate_au_passed(&aggregate));
    }

    #[test]
    fn completed_and_passed_needs_both() {
        let mut aggregate = sample(MoveOn::CompletedAndPassed);
        set_slide(&mut aggregate, "a", true, true);
        set_slide(&mut aggregate, "b", true, false);
        set_slide(&mut aggregate, "c", true, true);
        assert!(!evaluate_au_completion(&aggregate));
        assert!(!evaluate_au_passed(&aggregate));

        set_slide(&mut aggregate, "b", true, true);
        assert!(evaluate_au_completion(&aggregate));
        assert!(evaluate_au_passed(&aggregate));
    }

    #[test]
    fn move_on_truth_table() {
        // (move_on, completed-only slide state) -> (au completed, au passed)
        let cases = [
            (MoveOn::Completed, true, false),
            (MoveOn::Passed, false, false),
            (MoveOn::CompletedAndPassed, false, false),
            (MoveOn::CompletedOrPassed, true, false),
            (MoveOn::NotApplicable, true, true),
        ];
        for (move_on, expect_completed, expect_passed) in cases {
            let mut aggregate = sample(move_on);
            for guid in ["a", "b", "c"] {
                set_slide(&mut aggregate, guid, true, false);
            }
            assert_eq!(evaluate_au_completion(&aggregate), expect_completed, "{move_on:?}");
            assert_eq!(evaluate_au_passed(&aggregate), expect_passed, "{move_on:?}");
        }
    }

    #[test]
    fn empty_course_is_trivially_complete() {
        let structure = CourseStructure::new("au", "AU", MoveOn::Passed, Vec::new());
        let aggregate = ProgressAggregate::initialize(structure, ActivitiesMeta::new(), fixed_now());
        assert!(evaluate_au_completion(&aggregate));
        assert_eq!(first_incomplete_slide_index(&aggregate), 0);
        assert_eq!(progress_percentage(&aggregate), 0);
    }

    #[test]
    fn percentage_is_monotonic_and_clamped() {
        let mut aggregate = sample(MoveOn::Passed);
        let mut last = progress_percentage(&aggregate);
        assert_eq!(last, 0);

        view_and_evaluate(&mut aggregate, "a");
        let step = progress_percentage(&aggregate);
        assert!(step >= last);
        assert_eq!(step, 20);
        last = step;

        grade(&mut aggregate, "q1", true, true);
        grade(&mut aggregate, "j1", true, true);
        view_and_evaluate(&mut aggregate, "b");
        let step = progress_percentage(&aggregate);
        assert!(step >= last);
        last = step;

        grade(&mut aggregate, "c1", true, true);
        view_and_evaluate(&mut aggregate, "c");
        let step = progress_percentage(&aggregate);
        assert!(step >= last);
        assert_eq!(step, 100);
    }

    #[test]
    fn percentage_counts_activities_outside_the_step_total() {
        let mut aggregate = sample(MoveOn::Passed);
        view_and_evaluate(&mut aggregate, "a");
        grade(&mut aggregate, "c1", true, true);
        view_and_evaluate(&mut aggregate, "c");

        assert_eq!(aggregate.progress().total_progress_steps, 5);
        // two passed slides plus c1
        assert_eq!(progress_percentage(&aggregate), 60);

        grade(&mut aggregate, "q1", true, true);
        grade(&mut aggregate, "j1", true, true);
        assert_eq!(progress_percentage(&aggregate), 100);
    }

    #[test]
    fn resume_index_skips_completed_slides() {
        let mut aggregate = sample(MoveOn::Passed);
        assert_eq!(first_incomplete_slide_index(&aggregate), 0);
        set_slide(&mut aggregate, "a", true, true);
        assert_eq!(first_incomplete_slide_index(&aggregate), 1);
        set_slide(&mut aggregate, "b", true, true);
        set_slide(&mut aggregate, "c", true, true);
        assert_eq!(first_incomplete_slide_index(&aggregate), 2);
    }

    #[test]
    fn average_covers_completed_scored_activities() {
        let mut aggregate = sample(MoveOn::Passed);
        assert!(average_score(&aggregate).is_none());

        for (id, raw) in [("q1", 80.0), ("j1", 100.0)] {
            let id = ActivityId::new(id);
            let status = ActivityStatus {
                completed: true,
                score: Some(ActivityScore::percent(raw)),
                ..aggregate.activity_status(&id).cloned().unwrap()
            };
            aggregate.set_activity_status(&id, status, fixed_now()).unwrap();
        }
        let average = average_score(&aggregate).unwrap();
        assert_eq!(average.raw, 90.0);
        assert_eq!(average.max, 100.0);
        assert_eq!(average.scaled, Some(0.9));
    }

    #[test]
    fn refresh_reports_au_transitions() {
        let mut aggregate = sample(MoveOn::Completed);
        for guid in ["a", "b", "c"] {
            set_slide(&mut aggregate, guid, true, true);
        }
        let change = refresh_au_outcome(&mut aggregate, fixed_now());
        assert!(change.just_completed());
        assert!(!change.is_passed);
        assert!(aggregate.progress().au_completed);

        let again = refresh_au_outcome(&mut aggregate, fixed_now());
        assert!(!again.just_completed());
    }
}
