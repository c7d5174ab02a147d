//! Session-scoped handle owning the progress aggregate.

use std::collections::BTreeSet;
use std::sync::Arc;

use course_core::evaluator::{AuChange, SlideChange, average_score, evaluate_slide_status, refresh_au_outcome};
use course_core::model::{ActivityId, MoveOn, SlideIdentifier};
use course_core::scoring::{ActivityResponse, score_response};
use course_core::{Clock, EvaluationError, ProgressAggregate};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::background::BackgroundTasks;
use crate::emitter::StatementEmitter;
use crate::error::SessionError;
use crate::grader::{ActivityGrader, GradeOutcome, GradeRequest};
use crate::sync::{QuizProgress, RemoteStateSync};

/// What a slide view changed.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideVisit {
    pub slide: SlideIdentifier,
    pub first_view: bool,
    pub slide_change: SlideChange,
    pub au_change: AuChange,
    pub statements: Vec<Uuid>,
}

/// Result of a submitted activity, including the AU-level recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub grade: GradeOutcome,
    pub au_change: AuChange,
    /// Statements sent for the submission, `answered` interactions first.
    pub statements: Vec<Uuid>,
}

/// One learner's run through one AU.
///
/// All mutation goes through this handle; statements and saves are dispatched
/// after the aggregate reflects the change.
pub struct CourseSession {
    aggregate: ProgressAggregate,
    grader: ActivityGrader,
    emitter: Arc<StatementEmitter>,
    sync: Arc<RemoteStateSync>,
    tasks: BackgroundTasks,
    clock: Clock,
    current_slide: usize,
    au_passed_sent: bool,
    au_completed_sent: bool,
    autograders: BTreeSet<String>,
}

impl CourseSession {
    /// Wires a session around an initialized aggregate. The emitter and sync
    /// share the session's task set and clock.
    #[must_use]
    pub fn new(
        aggregate: ProgressAggregate,
        emitter: StatementEmitter,
        sync: Arc<RemoteStateSync>,
        clock: Clock,
    ) -> Self {
        let tasks = BackgroundTasks::new();
        let emitter = Arc::new(emitter.with_clock(clock).with_tasks(tasks.clone()));
        Self {
            aggregate,
            grader: ActivityGrader::new(Arc::clone(&emitter), clock),
            emitter,
            sync,
            tasks,
            clock,
            current_slide: 0,
            au_passed_sent: false,
            au_completed_sent: false,
            autograders: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_current_slide(mut self, index: usize) -> Self {
        self.current_slide = index;
        self
    }

    // ─── Accessors ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn aggregate(&self) -> &ProgressAggregate {
        &self.aggregate
    }

    #[must_use]
    pub fn emitter(&self) -> &Arc<StatementEmitter> {
        &self.emitter
    }

    #[must_use]
    pub fn current_slide(&self) -> usize {
        self.current_slide
    }

    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        self.aggregate.progress().au_progress
    }

    /// Waits for every statement send and progress save issued so far.
    pub async fn flush(&self) {
        self.tasks.flush().await;
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn initialize(&self) -> Vec<Uuid> {
        info!(target: "progress", au_id = self.aggregate.structure().au_id(), "session initialized");
        [self.emitter.launched(), self.emitter.initialized()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Sends `terminated` and saves the final snapshot.
    pub fn terminate(&self) -> Option<Uuid> {
        self.sync.spawn_save(&self.tasks, self.aggregate.snapshot());
        self.emitter.terminated()
    }

    pub fn class_event(&self, class_id: &str) -> Option<Uuid> {
        self.emitter.class_event(class_id)
    }

    pub fn scenario_event(&self, scenario_id: &str, event_type: &str, data: Option<Value>) -> Option<Uuid> {
        self.emitter.scenario_event(scenario_id, event_type, data)
    }

    // ─── Slides ────────────────────────────────────────────────────────────────

    fn slide_at(&self, index: usize) -> Result<SlideIdentifier, EvaluationError> {
        let structure = self.aggregate.structure();
        structure
            .slide(index)
            .cloned()
            .ok_or(EvaluationError::SlideIndexOutOfRange {
                index,
                count: structure.slide_count(),
            })
    }

    /// Navigates to a slide and records the view.
    ///
    /// The first view sends `SlideViewed`, plus `slideEvent` when `event` is given.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Evaluation` for an index outside the course.
    pub fn view_slide(&mut self, index: usize, event: Option<&str>) -> Result<SlideVisit, SessionError> {
        let slide = self.slide_at(index)?;
        let now = self.clock.now();
        self.current_slide = index;

        let first_view = self.aggregate.mark_viewed(&slide.guid, now)?;
        let slide_change = evaluate_slide_status(&mut self.aggregate, &slide.guid, now)?;

        let mut statements = Vec::new();
        if first_view {
            statements.extend(self.emitter.slide_viewed(&slide));
            if let Some(event) = event {
                statements.extend(self.emitter.slide_event(&slide, event));
            }
        }
        if slide_change.just_completed() {
            statements.extend(self.emitter.slide_completed(&slide));
        }
        if slide_change.just_passed() {
            statements.extend(self.emitter.slide_passing(&slide));
        }

        let au_change = self.refresh_au(&mut statements);
        if slide_change.has_transition() || au_change.just_completed() || au_change.just_passed() {
            self.persist();
        }

        debug!(
            target: "progress",
            slide_index = index,
            first_view,
            completed = slide_change.is_now_completed,
            passed = slide_change.is_now_passed,
            au_progress = au_change.progress,
            "slide viewed"
        );
        Ok(SlideVisit {
            slide,
            first_view,
            slide_change,
            au_change,
            statements,
        })
    }

    /// Sends a `slideEvent` for the current slide without touching progress.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Evaluation` when the current slide index is stale.
    pub fn slide_event(&self, event: &str) -> Result<Option<Uuid>, SessionError> {
        let slide = self.slide_at(self.current_slide)?;
        Ok(self.emitter.slide_event(&slide, event))
    }

    // ─── Activities ────────────────────────────────────────────────────────────

    /// Scores a submission and grades the activity.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Grade` if the aggregate rejects the grading result.
    pub fn submit_activity(
        &mut self,
        activity_id: &ActivityId,
        response: &ActivityResponse,
    ) -> Result<Submission, SessionError> {
        let meta = self.aggregate.activity_metadata(activity_id).map(|(_, meta)| meta);
        let score = score_response(meta, response);

        let mut statements = Vec::new();
        if let (Some(meta), ActivityResponse::Answers { answers }) = (meta, response) {
            for (index, question) in meta.payload.questions().iter().enumerate() {
                let Some(answer) = answers.get(index).filter(|answer| !answer.is_null()) else {
                    continue;
                };
                statements.extend(self.emitter.answered(activity_id, index, question, answer));
            }
        }

        let grade = self
            .grader
            .grade(&mut self.aggregate, GradeRequest::new(activity_id.clone(), score))?;
        statements.extend(grade.statements.iter().copied());

        let au_change = self.refresh_au(&mut statements);
        if grade.needs_persist() || au_change.just_completed() || au_change.just_passed() {
            self.persist();
        }

        Ok(Submission {
            grade,
            au_change,
            statements,
        })
    }

    /// Grades an activity whose outcome was decided elsewhere (e.g. a remote grader).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Grade` if the aggregate rejects the grading result.
    pub fn record_grade(&mut self, request: GradeRequest) -> Result<Submission, SessionError> {
        let grade = self.grader.grade(&mut self.aggregate, request)?;
        let mut statements = grade.statements.clone();
        let au_change = self.refresh_au(&mut statements);
        if grade.needs_persist() || au_change.just_completed() || au_change.just_passed() {
            self.persist();
        }
        Ok(Submission {
            grade,
            au_change,
            statements,
        })
    }

    // ─── Auxiliary state ───────────────────────────────────────────────────────

    pub async fn quiz_progress(&self, slide_index: usize, quiz_id: &ActivityId) -> QuizProgress {
        self.sync.load_quiz_progress(slide_index + 1, quiz_id).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Sync` without a record store or when the write fails.
    pub async fn save_quiz_progress(
        &self,
        slide_index: usize,
        quiz_id: &ActivityId,
        progress: &QuizProgress,
    ) -> Result<(), SessionError> {
        Ok(self
            .sync
            .save_quiz_progress(slide_index + 1, quiz_id, progress)
            .await?)
    }

    /// Loads auto-grader tasks completed in earlier sessions.
    pub async fn load_autograders(&mut self) -> &BTreeSet<String> {
        let stored = self.sync.completed_autograders().await;
        self.autograders.extend(stored);
        &self.autograders
    }

    #[must_use]
    pub fn completed_autograders(&self) -> &BTreeSet<String> {
        &self.autograders
    }

    /// Records an auto-grader task reported complete. The first report sends
    /// `answered`; repeats are ignored. Returns whether this was a new task.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Sync` when the record store write fails.
    pub async fn record_autograder(&mut self, uuid: &str) -> Result<bool, SessionError> {
        if !self.autograders.insert(uuid.to_owned()) {
            return Ok(false);
        }
        self.emitter.autograder_answered(uuid);
        if self.sync.has_store() {
            self.sync.record_autograder(uuid).await?;
        }
        Ok(true)
    }

    // ─── AU outcome ────────────────────────────────────────────────────────────

    fn refresh_au(&mut self, statements: &mut Vec<Uuid>) -> AuChange {
        let before = self.aggregate.progress().au_progress;
        let change = refresh_au_outcome(&mut self.aggregate, self.clock.now());
        if change.progress != before {
            statements.extend(self.emitter.progressed(change.progress));
        }
        statements.extend(self.report_au_outcome(change));
        change
    }

    fn report_au_outcome(&mut self, change: AuChange) -> Vec<Uuid> {
        let score = average_score(&self.aggregate);
        let (send_completed, send_passed) = match self.aggregate.structure().move_on() {
            MoveOn::Passed => (false, change.is_passed),
            MoveOn::Completed | MoveOn::NotApplicable => (change.is_completed, false),
            MoveOn::CompletedAndPassed => (change.is_completed, change.is_passed),
            MoveOn::CompletedOrPassed if !change.is_completed => (false, false),
            MoveOn::CompletedOrPassed if score.is_some() && change.is_passed => (false, true),
            MoveOn::CompletedOrPassed => (true, false),
        };

        let mut sent = Vec::new();
        if send_passed && !self.au_passed_sent {
            self.au_passed_sent = true;
            info!(target: "progress", au_id = self.aggregate.structure().au_id(), "AU passed");
            sent.extend(self.emitter.au_passed(score));
        }
        if send_completed && !self.au_completed_sent {
            self.au_completed_sent = true;
            info!(target: "progress", au_id = self.aggregate.structure().au_id(), "AU completed");
            sent.extend(self.emitter.au_completed());
        }
        sent
    }

    fn persist(&self) {
        self.sync.spawn_save(&self.tasks, self.aggregate.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{Actor, CourseDocument, SlideDocument};
    use course_core::time::{fixed_clock, fixed_now};
    use course_core::ContentParser;
    use serde_json::json;
    use storage::repository::{InMemoryStateStore, InMemoryStatementLog, StateStore, StatementSink};

    const QUIZ: &str = r#"
:::quiz
```json
{
  "cmi5QuizId": "warmup",
  "completionRequired": "passed",
  "passingScore": 50,
  "questions": [
    {"question": "2 + 2?", "type": "freeResponse", "typeAttributes": {"correctAnswer": "4"}},
    {"question": "Sky?", "type": "freeResponse", "typeAttributes": {"correctAnswer": "blue"}}
  ]
}
```
:::
"#;

    fn document(move_on: &str) -> CourseDocument {
        CourseDocument {
            au_name: "Intro".into(),
            title: "Intro".into(),
            slides: vec![
                SlideDocument {
                    slide_title: Some("Welcome".into()),
                    filepath: Some("welcome.md".into()),
                    content: Some("Hello".into()),
                },
                SlideDocument {
                    slide_title: Some("Check".into()),
                    filepath: Some("check.md".into()),
                    content: Some(QUIZ.into()),
                },
            ],
            move_on_criteria: Some(move_on.into()),
            ..CourseDocument::default()
        }
    }

    struct Harness {
        session: CourseSession,
        log: InMemoryStatementLog,
        states: InMemoryStateStore,
    }

    fn harness(move_on: &str) -> Harness {
        let parsed = ContentParser::default().parse_document(&document(move_on));
        let aggregate = ProgressAggregate::from_parsed(parsed, fixed_now());
        let log = InMemoryStatementLog::new();
        let states = InMemoryStateStore::new();
        let actor = Actor::with_account("Ada", "https://lms.example", "ada");
        let sink: Arc<dyn StatementSink> = Arc::new(log.clone());
        let store: Arc<dyn StateStore> = Arc::new(states.clone());
        let emitter = StatementEmitter::new(Some(sink), actor.clone(), "https://course.example/au", None);
        let sync = Arc::new(RemoteStateSync::new(Some(store), actor, "https://course.example/au", None));
        Harness {
            session: CourseSession::new(aggregate, emitter, sync, fixed_clock()),
            log,
            states,
        }
    }

    fn verbs(log: &InMemoryStatementLog) -> Vec<String> {
        log.statements()
            .unwrap()
            .iter()
            .map(|statement| statement.verb_display().to_owned())
            .collect()
    }

    #[tokio::test]
    async fn first_view_completes_a_plain_slide() {
        let mut h = harness("completed-and-passed");

        let visit = h.session.view_slide(0, Some("enter")).unwrap();
        assert!(visit.first_view);
        assert!(visit.slide_change.just_completed() && visit.slide_change.just_passed());
        assert_eq!(visit.au_change.progress, 33);

        let again = h.session.view_slide(0, Some("enter")).unwrap();
        assert!(!again.first_view);
        assert!(!again.slide_change.has_transition());
        h.session.flush().await;

        assert_eq!(
            verbs(&h.log),
            vec!["SlideViewed", "slideEvent", "slideCompleted", "slidePassing", "progressed"]
        );
        assert_eq!(h.states.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn passing_the_quiz_finishes_the_au_once() {
        let mut h = harness("completed-and-passed");
        h.session.view_slide(0, None).unwrap();
        h.session.view_slide(1, None).unwrap();

        let quiz = ActivityId::new("warmup");
        let submission = h
            .session
            .submit_activity(&quiz, &ActivityResponse::Answers { answers: vec![json!("4"), json!("green")] })
            .unwrap();
        assert!(submission.grade.decision.passed);
        assert_eq!(submission.grade.score.unwrap().raw, 50.0);
        assert!(submission.au_change.just_completed() && submission.au_change.just_passed());
        assert_eq!(h.session.progress_percent(), 100);

        h.session
            .submit_activity(&quiz, &ActivityResponse::Answers { answers: vec![json!("4"), json!("blue")] })
            .unwrap();
        h.session.flush().await;

        let verbs = verbs(&h.log);
        assert_eq!(verbs.iter().filter(|verb| *verb == "auPassed").count(), 1);
        assert_eq!(verbs.iter().filter(|verb| *verb == "auCompleted").count(), 1);
        assert_eq!(verbs.iter().filter(|verb| *verb == "answered").count(), 4);
        assert!(!verbs.contains(&"activityCompleted".to_owned()));
    }

    #[tokio::test]
    async fn completed_or_passed_reports_scored_courses_as_passed() {
        let mut h = harness("completed-or-passed");
        h.session.view_slide(0, None).unwrap();
        h.session.view_slide(1, None).unwrap();
        h.session
            .submit_activity(
                &ActivityId::new("warmup"),
                &ActivityResponse::Answers { answers: vec![json!("4"), json!("blue")] },
            )
            .unwrap();
        h.session.flush().await;

        let verbs = verbs(&h.log);
        assert!(verbs.contains(&"passed".to_owned()));
        assert!(!verbs.contains(&"completed".to_owned()));
    }

    #[tokio::test]
    async fn out_of_range_slide_is_rejected() {
        let mut h = harness("passed");
        let err = h.session.view_slide(7, None).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Evaluation(EvaluationError::SlideIndexOutOfRange { index: 7, count: 2 })
        ));
    }

    #[tokio::test]
    async fn autograder_tasks_are_recorded_once() {
        let mut h = harness("passed");
        assert!(h.session.record_autograder("task-1").await.unwrap());
        assert!(!h.session.record_autograder("task-1").await.unwrap());
        h.session.flush().await;

        assert_eq!(verbs(&h.log), vec!["answered"]);
        assert_eq!(h.states.len().unwrap(), 1);
        assert!(h.session.completed_autograders().contains("task-1"));
    }
}
