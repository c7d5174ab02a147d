use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ids::SlideGuid;
use crate::model::quiz::Question;

//
// ─── ACTIVITY TYPE ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Quiz,
    Ctf,
    Jobe,
    Scenario,
    Consoles,
    #[serde(other)]
    Unknown,
}

impl ActivityType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Ctf => "ctf",
            Self::Jobe => "jobe",
            Self::Scenario => "scenario",
            Self::Consoles => "consoles",
            Self::Unknown => "unknown",
        }
    }

    /// Maps a fenced block tag to its activity type. Unrecognised tags yield `None`.
    #[must_use]
    pub fn from_block_tag(tag: &str) -> Option<Self> {
        match tag {
            "quiz" => Some(Self::Quiz),
            "ctf" => Some(Self::Ctf),
            "jobe" => Some(Self::Jobe),
            "scenario" => Some(Self::Scenario),
            "consoles" => Some(Self::Consoles),
            _ => None,
        }
    }

    /// Requirement applied when a block does not declare `completionRequired`.
    #[must_use]
    pub fn default_completion_required(self) -> CompletionRequired {
        match self {
            Self::Ctf => CompletionRequired::Attempted,
            _ => CompletionRequired::Passed,
        }
    }

    /// Jobe, scenario and console activities are all-or-nothing.
    #[must_use]
    pub fn fixed_passing_score(self) -> Option<f64> {
        match self {
            Self::Jobe | Self::Scenario | Self::Consoles => Some(100.0),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_question_based(self) -> bool {
        matches!(self, Self::Quiz | Self::Ctf)
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── COMPLETION REQUIRED ──────────────────────────────────────────────────────
//

/// What an activity must achieve before it counts toward its slide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CompletionRequired {
    Attempted,
    Completed,
    Passed,
    CompletedAndPassed,
    NotApplicable,
    Other(String),
}

impl CompletionRequired {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Attempted => "attempted",
            Self::Completed => "completed",
            Self::Passed => "passed",
            Self::CompletedAndPassed => "completed-and-passed",
            Self::NotApplicable => "not-applicable",
            Self::Other(value) => value,
        }
    }

    /// Attempted, completed and not-applicable only need the activity finished.
    #[must_use]
    pub fn is_completion_only(&self) -> bool {
        matches!(self, Self::Attempted | Self::Completed | Self::NotApplicable)
    }

    /// `passed` and `completed-and-passed` can fail.
    #[must_use]
    pub fn requires_grading(&self) -> bool {
        matches!(self, Self::Passed | Self::CompletedAndPassed)
    }

    /// Whether an activity in this state satisfies the slide's completion check.
    #[must_use]
    pub fn satisfies_completion(&self, completed: bool, passed: bool) -> bool {
        match self {
            Self::Passed => passed,
            Self::CompletedAndPassed => completed && passed,
            Self::Attempted | Self::Completed | Self::NotApplicable | Self::Other(_) => completed,
        }
    }

    /// Whether an activity in this state satisfies the slide's passing check.
    #[must_use]
    pub fn satisfies_passing(&self, completed: bool, passed: bool) -> bool {
        match self {
            Self::Attempted | Self::Completed | Self::NotApplicable => completed,
            Self::Passed | Self::CompletedAndPassed | Self::Other(_) => passed,
        }
    }
}

impl From<String> for CompletionRequired {
    fn from(value: String) -> Self {
        match value.as_str() {
            "attempted" => Self::Attempted,
            "completed" => Self::Completed,
            "passed" => Self::Passed,
            "completed-and-passed" => Self::CompletedAndPassed,
            "not-applicable" => Self::NotApplicable,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for CompletionRequired {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<CompletionRequired> for String {
    fn from(value: CompletionRequired) -> Self {
        match value {
            CompletionRequired::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for CompletionRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── PAYLOADS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobePayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub evaluator: Option<String>,
}

/// Auto-graded task attached to a scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoGrader {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub question_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioPayload {
    #[serde(default, alias = "scenarioUUID")]
    pub uuid: Option<String>,
    #[serde(default, alias = "scenarioName")]
    pub name: Option<String>,
    #[serde(default)]
    pub auto_graders: Vec<AutoGrader>,
}

/// Type-specific content of an activity block, validated at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActivityPayload {
    Quiz(QuizPayload),
    Ctf(QuizPayload),
    Jobe(JobePayload),
    Scenario(ScenarioPayload),
    Consoles(ScenarioPayload),
    Unknown,
}

impl ActivityPayload {
    #[must_use]
    pub fn activity_type(&self) -> ActivityType {
        match self {
            Self::Quiz(_) => ActivityType::Quiz,
            Self::Ctf(_) => ActivityType::Ctf,
            Self::Jobe(_) => ActivityType::Jobe,
            Self::Scenario(_) => ActivityType::Scenario,
            Self::Consoles(_) => ActivityType::Consoles,
            Self::Unknown => ActivityType::Unknown,
        }
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        match self {
            Self::Quiz(quiz) | Self::Ctf(quiz) => &quiz.questions,
            _ => &[],
        }
    }
}

//
// ─── METADATA ─────────────────────────────────────────────────────────────────
//

/// Parsed description of one activity. Read-only after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetadata {
    pub completion_required: CompletionRequired,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passing_score: Option<f64>,
    #[serde(default)]
    pub ksats: Vec<Value>,
    pub payload: ActivityPayload,
}

impl ActivityMetadata {
    #[must_use]
    pub fn activity_type(&self) -> ActivityType {
        self.payload.activity_type()
    }

    /// Whether this activity contributes a step to `totalProgressSteps`.
    #[must_use]
    pub fn is_gradable(&self) -> bool {
        match self.activity_type() {
            ActivityType::Jobe | ActivityType::Scenario | ActivityType::Consoles => true,
            ActivityType::Quiz | ActivityType::Ctf => matches!(
                self.completion_required,
                CompletionRequired::Attempted | CompletionRequired::Passed
            ),
            ActivityType::Unknown => false,
        }
    }
}

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityScore {
    pub raw: f64,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaled: Option<f64>,
}

impl ActivityScore {
    /// Score on the usual 0..=100 scale.
    #[must_use]
    pub fn percent(raw: f64) -> Self {
        Self {
            raw,
            min: 0.0,
            max: 100.0,
            scaled: Some(raw / 100.0),
        }
    }
}

/// Grading state of one activity. Re-grading overwrites the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatus {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub slide_index: usize,
    pub slide_guid: SlideGuid,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ActivityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meets_criteria: Option<bool>,
}

impl ActivityStatus {
    /// Not-yet-attempted status seeded at initialization.
    #[must_use]
    pub fn pending(activity_type: ActivityType, slide_index: usize, slide_guid: SlideGuid) -> Self {
        Self {
            activity_type,
            slide_index,
            slide_guid,
            completed: false,
            passed: false,
            completed_at: None,
            passed_at: None,
            score: None,
            meets_criteria: None,
        }
    }
}
