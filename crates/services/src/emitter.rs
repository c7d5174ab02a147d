//! Statement construction and fire-and-forget delivery.

use std::sync::{Arc, Mutex};

use course_core::Clock;
use course_core::model::{
    ActivityId, ActivityMetadata, ActivityScore, ActivityType, Actor, Context, CourseVerb,
    Question, QuestionKind, SlideIdentifier, Statement, StatementObject, StatementResult,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use storage::repository::StatementSink;

use crate::background::BackgroundTasks;
use crate::config::LaunchConfig;
use crate::error::EmitError;

const INTERACTION_TYPE: &str = "http://adlnet.gov/expapi/activities/cmi.interaction";
const ASSESSMENT_TYPE: &str = "http://adlnet.gov/expapi/activities/assessment";

/// A statement the record store did not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub statement_id: Uuid,
    pub verb: String,
    pub error: String,
}

/// Builds statements for one AU session and dispatches them in the background.
pub struct StatementEmitter {
    sink: Option<Arc<dyn StatementSink>>,
    dev_mode: bool,
    actor: Actor,
    au_activity_id: String,
    context: Context,
    clock: Clock,
    tasks: BackgroundTasks,
    failures_tx: mpsc::UnboundedSender<DeliveryFailure>,
    failures_rx: Mutex<Option<mpsc::UnboundedReceiver<DeliveryFailure>>>,
}

impl StatementEmitter {
    #[must_use]
    pub fn new(
        sink: Option<Arc<dyn StatementSink>>,
        actor: Actor,
        au_activity_id: impl Into<String>,
        registration: Option<String>,
    ) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            sink,
            dev_mode: false,
            actor,
            au_activity_id: au_activity_id.into(),
            context: Context {
                registration,
                ..Context::default()
            },
            clock: Clock::default(),
            tasks: BackgroundTasks::new(),
            failures_tx,
            failures_rx: Mutex::new(Some(failures_rx)),
        }
    }

    /// Emitter for a launch; dev-mode launches never send anything.
    #[must_use]
    pub fn from_config(config: &LaunchConfig, sink: Option<Arc<dyn StatementSink>>) -> Self {
        Self::new(
            sink,
            config.actor.clone(),
            config.activity_id.clone(),
            config.registration.clone(),
        )
        .with_dev_mode(config.is_dev_mode())
    }

    #[must_use]
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Context template from the launch data (context activities, extensions).
    #[must_use]
    pub fn with_context_template(mut self, context_activities: Option<Value>, extensions: Option<Value>) -> Self {
        self.context.context_activities = context_activities;
        self.context.extensions = extensions;
        self
    }

    /// Shares a task set with the owning session so one `flush` covers both.
    #[must_use]
    pub fn with_tasks(mut self, tasks: BackgroundTasks) -> Self {
        self.tasks = tasks;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.dev_mode && self.sink.is_some()
    }

    #[must_use]
    pub fn au_activity_id(&self) -> &str {
        &self.au_activity_id
    }

    /// Takes the delivery-failure receiver. Only the first caller gets it.
    #[must_use]
    pub fn failures(&self) -> Option<mpsc::UnboundedReceiver<DeliveryFailure>> {
        self.failures_rx.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Waits for all in-flight sends.
    pub async fn flush(&self) {
        self.tasks.flush().await;
    }

    // ─── Object ids ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn slide_object_id(&self, slide_number: usize) -> String {
        format!("{}/slide-{slide_number}", self.au_activity_id)
    }

    #[must_use]
    pub fn activity_object_id(&self, activity_id: &ActivityId) -> String {
        format!("{}/activity/{activity_id}", self.au_activity_id)
    }

    // ─── Envelope ──────────────────────────────────────────────────────────────

    /// Wraps a verb, object and result in the session envelope.
    #[must_use]
    pub fn build(
        &self,
        verb: CourseVerb,
        object: StatementObject,
        result: Option<StatementResult>,
    ) -> Statement {
        Statement {
            id: Uuid::new_v4(),
            actor: self.actor.clone(),
            verb: verb.verb(),
            object,
            result,
            context: self.context.clone(),
            timestamp: self.clock.now(),
        }
    }

    /// Dispatches a statement without waiting. Returns its id, or `None` when
    /// sending is disabled.
    pub fn emit(&self, statement: Statement) -> Option<Uuid> {
        let sink = match (&self.sink, self.dev_mode) {
            (Some(sink), false) => Arc::clone(sink),
            _ => {
                debug!(target: "lrs", verb = statement.verb_display(), "dev mode; statement not sent");
                return None;
            }
        };

        let id = statement.id;
        let failures = self.failures_tx.clone();
        self.tasks.spawn("statement", async move {
            match sink.send_statement(&statement).await {
                Ok(()) => debug!(target: "lrs", id = %statement.id, verb = statement.verb_display(), "statement sent"),
                Err(err) => {
                    warn!(
                        target: "lrs",
                        id = %statement.id,
                        verb = statement.verb_display(),
                        error = %err,
                        "statement delivery failed"
                    );
                    let _ = failures.send(DeliveryFailure {
                        statement_id: statement.id,
                        verb: statement.verb_display().to_owned(),
                        error: err.to_string(),
                    });
                }
            }
        });
        Some(id)
    }

    /// Sends a statement and waits for the record store's answer.
    ///
    /// # Errors
    ///
    /// Returns `EmitError::Disabled` in dev mode, or the storage error of the send.
    pub async fn send_now(&self, statement: &Statement) -> Result<(), EmitError> {
        match (&self.sink, self.dev_mode) {
            (Some(sink), false) => Ok(sink.send_statement(statement).await?),
            _ => Err(EmitError::Disabled),
        }
    }

    fn emit_verb(&self, verb: CourseVerb, object: StatementObject, result: Option<StatementResult>) -> Option<Uuid> {
        self.emit(self.build(verb, object, result))
    }

    fn au_object(&self) -> StatementObject {
        StatementObject::activity(self.au_activity_id.clone())
    }

    // ─── Session lifecycle ─────────────────────────────────────────────────────

    pub fn launched(&self) -> Option<Uuid> {
        self.emit_verb(CourseVerb::Launched, self.au_object(), None)
    }

    pub fn initialized(&self) -> Option<Uuid> {
        self.emit_verb(CourseVerb::Initialized, self.au_object(), None)
    }

    pub fn terminated(&self) -> Option<Uuid> {
        self.emit_verb(CourseVerb::Terminated, self.au_object(), None)
    }

    pub fn progressed(&self, percent: u8) -> Option<Uuid> {
        let result = StatementResult::default().extension("progress", percent);
        self.emit_verb(CourseVerb::Progressed, self.au_object(), Some(result))
    }

    pub fn class_event(&self, class_id: &str) -> Option<Uuid> {
        let result = StatementResult::default().extension("classId", class_id);
        self.emit_verb(CourseVerb::ClassEvent, self.au_object(), Some(result))
    }

    pub fn scenario_event(&self, scenario_id: &str, event_type: &str, data: Option<Value>) -> Option<Uuid> {
        let mut result = StatementResult::default()
            .extension("scenarioEvent/scenarioId", scenario_id)
            .extension("scenarioEvent/eventType", event_type);
        if let Some(data) = data {
            result = result.extension("scenarioEvent/eventData", data);
        }
        self.emit_verb(CourseVerb::ScenarioEvent, self.au_object(), Some(result))
    }

    // ─── AU outcome ────────────────────────────────────────────────────────────

    /// cmi5 `passed` plus the course `auPassed`, both carrying the averaged score.
    pub fn au_passed(&self, score: Option<ActivityScore>) -> Vec<Uuid> {
        let result = StatementResult {
            score,
            success: Some(true),
            completion: Some(true),
            ..StatementResult::default()
        };
        [CourseVerb::AuPassed, CourseVerb::Passed]
            .into_iter()
            .filter_map(|verb| self.emit_verb(verb, self.au_object(), Some(result.clone())))
            .collect()
    }

    /// cmi5 `completed` plus the course `auCompleted`.
    pub fn au_completed(&self) -> Vec<Uuid> {
        let result = StatementResult {
            completion: Some(true),
            ..StatementResult::default()
        };
        [CourseVerb::AuCompleted, CourseVerb::Completed]
            .into_iter()
            .filter_map(|verb| self.emit_verb(verb, self.au_object(), Some(result.clone())))
            .collect()
    }

    // ─── Slides ────────────────────────────────────────────────────────────────

    fn slide_object(&self, slide: &SlideIdentifier) -> StatementObject {
        StatementObject::activity(self.slide_object_id(slide.index + 1)).with_definition(json!({
            "name": {"en-US": slide.title},
        }))
    }

    pub fn slide_viewed(&self, slide: &SlideIdentifier) -> Option<Uuid> {
        let result = StatementResult::default()
            .extension("SlideViewed/slideNumber", slide.index + 1)
            .extension("SlideViewed/slideName", slide.title.clone());
        self.emit_verb(CourseVerb::SlideViewed, self.slide_object(slide), Some(result))
    }

    pub fn slide_event(&self, slide: &SlideIdentifier, event_type: &str) -> Option<Uuid> {
        let result = StatementResult::default()
            .extension("slideEvent/type", event_type)
            .extension("slideEvent/slideNumber", slide.index + 1)
            .extension("slideEvent/slideName", slide.title.clone());
        self.emit_verb(CourseVerb::SlideEvent, self.slide_object(slide), Some(result))
    }

    pub fn slide_completed(&self, slide: &SlideIdentifier) -> Option<Uuid> {
        let result = StatementResult {
            completion: Some(true),
            ..StatementResult::default()
        }
        .extension("slideCompleted/slideNumber", slide.index + 1)
        .extension("slideCompleted/slideName", slide.title.clone());
        self.emit_verb(CourseVerb::SlideCompleted, self.slide_object(slide), Some(result))
    }

    pub fn slide_passing(&self, slide: &SlideIdentifier) -> Option<Uuid> {
        let result = StatementResult {
            success: Some(true),
            ..StatementResult::default()
        }
        .extension("slidePassing/slideNumber", slide.index + 1)
        .extension("slidePassing/slideName", slide.title.clone());
        self.emit_verb(CourseVerb::SlidePassing, self.slide_object(slide), Some(result))
    }

    // ─── Activities ────────────────────────────────────────────────────────────

    fn activity_result(
        verb_path: &str,
        activity_type: ActivityType,
        meta: Option<&ActivityMetadata>,
        score: Option<ActivityScore>,
    ) -> StatementResult {
        let mut result = StatementResult {
            score: score.map(|score| ActivityScore::percent(score.raw)),
            ..StatementResult::default()
        }
        .extension(&format!("{verb_path}/type"), activity_type.as_str());
        if let Some(meta) = meta.filter(|meta| !meta.ksats.is_empty()) {
            result = result.extension(&format!("{verb_path}/metadata"), json!({"ksats": meta.ksats}));
        }
        result
    }

    pub fn activity_completed(
        &self,
        activity_id: &ActivityId,
        activity_type: ActivityType,
        meta: Option<&ActivityMetadata>,
        score: Option<ActivityScore>,
    ) -> Option<Uuid> {
        let mut result = Self::activity_result("activityCompleted", activity_type, meta, score);
        result.completion = Some(true);
        let object = StatementObject::activity(self.activity_object_id(activity_id));
        self.emit_verb(CourseVerb::ActivityCompleted, object, Some(result))
    }

    pub fn activity_passed(
        &self,
        activity_id: &ActivityId,
        activity_type: ActivityType,
        meta: Option<&ActivityMetadata>,
        score: Option<ActivityScore>,
    ) -> Option<Uuid> {
        let mut result = Self::activity_result("activityPassed", activity_type, meta, score);
        result.success = Some(true);
        let object = StatementObject::activity(self.activity_object_id(activity_id));
        self.emit_verb(CourseVerb::ActivityPassed, object, Some(result))
    }

    pub fn activity_failed(
        &self,
        activity_id: &ActivityId,
        activity_type: ActivityType,
        meta: Option<&ActivityMetadata>,
        score: Option<ActivityScore>,
    ) -> Option<Uuid> {
        let mut result = Self::activity_result("activityFailed", activity_type, meta, score);
        result.success = Some(false);
        let object = StatementObject::activity(self.activity_object_id(activity_id));
        self.emit_verb(CourseVerb::ActivityFailed, object, Some(result))
    }

    /// `answered` interaction for one quiz question.
    pub fn answered(
        &self,
        activity_id: &ActivityId,
        question_index: usize,
        question: &Question,
        answer: &Value,
    ) -> Option<Uuid> {
        let question_id = question
            .cmi5_question_id
            .clone()
            .unwrap_or_else(|| format!("question-{}", question_index + 1));
        let object_id = format!("{}/{question_id}", self.activity_object_id(activity_id));
        let definition = interaction_definition(question);
        let Some(definition) = definition else {
            debug!(target: "lrs", question = question_index, "no interaction for question type");
            return None;
        };

        let result = StatementResult {
            success: Some(question.is_correct(answer)),
            response: Some(interaction_response(question, answer)),
            ..StatementResult::default()
        };
        let object = StatementObject::activity(object_id).with_definition(definition);
        self.emit_verb(CourseVerb::Answered, object, Some(result))
    }

    /// `answered` for an auto-grader task reported complete by a scenario.
    pub fn autograder_answered(&self, uuid: &str) -> Option<Uuid> {
        let object = StatementObject::activity(format!("{}/autograder/{uuid}", self.au_activity_id))
            .with_definition(json!({
                "name": {"en-US": "AutoGrader Task Completed"},
                "description": {"en-US": format!("AutoGrader task with UUID {uuid}")},
                "type": ASSESSMENT_TYPE,
            }));
        self.emit_verb(CourseVerb::Answered, object, None)
    }
}

fn choice_id(index: usize) -> String {
    format!("q-{index}")
}

fn interaction_definition(question: &Question) -> Option<Value> {
    let name = json!({"en-US": question.question});
    let options = &question.type_attributes.options;
    match question.kind {
        QuestionKind::MultipleChoice | QuestionKind::SelectAll | QuestionKind::TrueFalse => {
            let correct: Vec<String> = options
                .iter()
                .enumerate()
                .filter(|(_, option)| option.correct)
                .map(|(index, _)| choice_id(index))
                .collect();
            let choices: Vec<Value> = options
                .iter()
                .enumerate()
                .map(|(index, option)| json!({"id": choice_id(index), "description": {"en-US": option.text}}))
                .collect();
            Some(json!({
                "name": name,
                "description": name,
                "type": INTERACTION_TYPE,
                "interactionType": "choice",
                "correctResponsesPattern": [correct.join("[,]")],
                "choices": choices,
            }))
        }
        QuestionKind::Number | QuestionKind::FreeResponse => {
            let correct = question
                .type_attributes
                .correct_answer
                .as_ref()
                .map(value_text)
                .unwrap_or_default();
            Some(json!({
                "name": name,
                "description": name,
                "type": INTERACTION_TYPE,
                "interactionType": "fill-in",
                "correctResponsesPattern": [correct],
            }))
        }
        QuestionKind::Unknown => None,
    }
}

fn interaction_response(question: &Question, answer: &Value) -> String {
    match question.kind {
        QuestionKind::MultipleChoice | QuestionKind::SelectAll => match answer {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_u64)
                .map(|index| format!("q-{index}"))
                .collect::<Vec<_>>()
                .join("[,]"),
            Value::Number(index) => format!("q-{index}"),
            other => value_text(other),
        },
        _ => value_text(answer),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
