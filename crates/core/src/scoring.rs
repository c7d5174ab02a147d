//! Scoring of finished activities and the pass/verb decision table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ActivityMetadata, ActivityScore, ActivityType, CompletionRequired, Question};

/// Threshold for quiz and CTF blocks that do not declare `passingScore`.
pub const DEFAULT_QUIZ_PASSING_SCORE: f64 = 70.0;

/// What the learner handed in for an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActivityResponse {
    /// One answer per question, in question order. Missing answers are `null`.
    Answers { answers: Vec<Value> },
    /// Outcome of an auto-graded code exercise.
    Execution { success: bool },
    /// Auto-grader task progress of a scenario or console session.
    #[serde(rename_all = "camelCase")]
    Tasks {
        completed_tasks: u32,
        total_tasks: u32,
        all_completed: bool,
    },
    /// Nothing was scored.
    Ungraded,
}

#[allow(clippy::cast_precision_loss)]
fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64 * 100.0).round()
}

/// Percentage of questions answered correctly, rounded. No questions scores 0.
#[must_use]
pub fn score_answers(questions: &[Question], answers: &[Value]) -> ActivityScore {
    let correct = questions
        .iter()
        .enumerate()
        .filter(|(index, question)| {
            answers
                .get(*index)
                .is_some_and(|answer| question.is_correct(answer))
        })
        .count();
    ActivityScore::percent(percent(correct, questions.len()))
}

#[must_use]
pub fn score_execution(success: bool) -> ActivityScore {
    ActivityScore::percent(if success { 100.0 } else { 0.0 })
}

/// Share of auto-grader tasks finished.
///
/// A scenario without auto-graders that reports `all_completed` counts as fully done.
#[must_use]
pub fn score_tasks(completed_tasks: u32, total_tasks: u32, all_completed: bool) -> ActivityScore {
    let (done, total) = match (total_tasks, all_completed) {
        (0, true) => (1, 1),
        (0, false) => (0, 1),
        (total, _) => (completed_tasks.min(total), total),
    };
    ActivityScore::percent(f64::from(done) / f64::from(total) * 100.0)
}

/// Scores a response. `None` means no score was collected.
#[must_use]
pub fn score_response(meta: Option<&ActivityMetadata>, response: &ActivityResponse) -> Option<ActivityScore> {
    match response {
        ActivityResponse::Answers { answers } => {
            let questions = meta.map_or(&[][..], |meta| meta.payload.questions());
            Some(score_answers(questions, answers))
        }
        ActivityResponse::Execution { success } => Some(score_execution(*success)),
        ActivityResponse::Tasks {
            completed_tasks,
            total_tasks,
            all_completed,
        } => Some(score_tasks(*completed_tasks, *total_tasks, *all_completed)),
        ActivityResponse::Ungraded => None,
    }
}

/// Passing threshold for an activity of this type.
#[must_use]
pub fn passing_threshold(activity_type: ActivityType, meta: Option<&ActivityMetadata>) -> Option<f64> {
    if let Some(fixed) = activity_type.fixed_passing_score() {
        return Some(fixed);
    }
    let declared = meta.and_then(|meta| meta.passing_score);
    if activity_type.is_question_based() {
        Some(declared.unwrap_or(DEFAULT_QUIZ_PASSING_SCORE))
    } else {
        declared
    }
}

/// `raw/max*100 >= threshold`; exact match without a threshold; pass when unscored.
#[must_use]
pub fn passes(score: Option<&ActivityScore>, threshold: Option<f64>) -> bool {
    let Some(score) = score else {
        return true;
    };
    match threshold {
        Some(threshold) if score.max > 0.0 => score.raw / score.max * 100.0 >= threshold,
        Some(threshold) => score.raw >= threshold,
        None => (score.raw - score.max).abs() < f64::EPSILON,
    }
}

/// Outcome of grading plus which activity statements apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeDecision {
    pub passed: bool,
    pub meets_criteria: bool,
    pub emit_completed: bool,
    pub emit_pass_or_fail: bool,
}

/// Applies the per-requirement rules to a pass result.
///
/// A `completed-and-passed` activity that passed reports only `activityPassed`;
/// a failed one reports `activityCompleted` and `activityFailed`.
#[must_use]
pub fn decide(activity_type: ActivityType, rule: &CompletionRequired, passed: bool) -> GradeDecision {
    let meets_criteria = if activity_type.is_question_based() && rule.is_completion_only() {
        true
    } else {
        passed
    };
    let (emit_completed, emit_pass_or_fail) = match rule {
        CompletionRequired::Attempted
        | CompletionRequired::Completed
        | CompletionRequired::NotApplicable => (true, false),
        CompletionRequired::Passed => (false, true),
        CompletionRequired::CompletedAndPassed => (!passed, true),
        CompletionRequired::Other(_) => (true, true),
    };
    GradeDecision {
        passed,
        meets_criteria,
        emit_completed,
        emit_pass_or_fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivityPayload, QuizPayload};
    use serde_json::json;

    fn free_response(answer: &str) -> Question {
        serde_json::from_value(json!({
            "question": "?",
            "type": "freeResponse",
            "typeAttributes": {"correctAnswer": answer}
        }))
        .unwrap()
    }

    #[test]
    fn answers_score_rounds_percentage() {
        let questions = vec![free_response("a"), free_response("b"), free_response("c")];
        let score = score_answers(&questions, &[json!("a"), json!("x")]);
        assert_eq!(score.raw, 33.0);
        assert_eq!(score.max, 100.0);
        assert_eq!(score_answers(&[], &[]).raw, 0.0);
    }

    #[test]
    fn answers_without_metadata_score_zero() {
        let response = ActivityResponse::Answers { answers: vec![json!("a")] };
        assert_eq!(score_response(None, &response).unwrap().raw, 0.0);

        let meta = ActivityMetadata {
            completion_required: CompletionRequired::Passed,
            passing_score: None,
            ksats: Vec::new(),
            payload: ActivityPayload::Quiz(QuizPayload {
                title: None,
                questions: vec![free_response("a")],
            }),
        };
        assert_eq!(score_response(Some(&meta), &response).unwrap().raw, 100.0);
    }

    #[test]
    fn tasks_without_graders_count_when_all_completed() {
        assert_eq!(score_tasks(0, 0, true).raw, 100.0);
        assert_eq!(score_tasks(0, 0, false).raw, 0.0);
        assert_eq!(score_tasks(1, 4, false).raw, 25.0);
        assert_eq!(score_tasks(9, 4, true).raw, 100.0);
    }

    #[test]
    fn thresholds_per_type() {
        assert_eq!(passing_threshold(ActivityType::Quiz, None), Some(70.0));
        assert_eq!(passing_threshold(ActivityType::Jobe, None), Some(100.0));
        assert_eq!(passing_threshold(ActivityType::Unknown, None), None);
    }

    #[test]
    fn pass_rules() {
        let eighty = ActivityScore::percent(80.0);
        assert!(passes(Some(&eighty), Some(80.0)));
        assert!(!passes(Some(&eighty), Some(81.0)));
        assert!(!passes(Some(&eighty), None));
        assert!(passes(Some(&ActivityScore::percent(100.0)), None));
        assert!(passes(None, Some(100.0)));
    }

    #[test]
    fn decision_table() {
        use CompletionRequired::*;

        let attempted = decide(ActivityType::Quiz, &Attempted, false);
        assert!(attempted.meets_criteria);
        assert!(attempted.emit_completed && !attempted.emit_pass_or_fail);

        let passed_rule = decide(ActivityType::Ctf, &Passed, false);
        assert!(!passed_rule.meets_criteria);
        assert!(!passed_rule.emit_completed && passed_rule.emit_pass_or_fail);

        let cap_pass = decide(ActivityType::Quiz, &CompletedAndPassed, true);
        assert!(!cap_pass.emit_completed && cap_pass.emit_pass_or_fail);
        let cap_fail = decide(ActivityType::Quiz, &CompletedAndPassed, false);
        assert!(cap_fail.emit_completed && cap_fail.emit_pass_or_fail);

        let jobe_completed = decide(ActivityType::Jobe, &Completed, false);
        assert!(!jobe_completed.meets_criteria);

        let other = decide(ActivityType::Quiz, &Other("x".into()), true);
        assert!(other.emit_completed && other.emit_pass_or_fail && other.meets_criteria);
    }
}
