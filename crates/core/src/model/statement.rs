use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::activity::ActivityScore;

const ADL_VERBS: &str = "http://adlnet.gov/expapi/verbs";
const COURSE_VERBS: &str = "https://rangeos/verbs";

/// Base IRI for result extension keys.
pub const EXTENSION_BASE: &str = "https://rangeos/extensions";

//
// ─── ACTOR ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub home_page: String,
    pub name: String,
}

/// Learner the statements and state documents belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(default = "agent_object_type")]
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
}

fn agent_object_type() -> String {
    "Agent".to_owned()
}

impl Actor {
    #[must_use]
    pub fn with_account(
        name: impl Into<String>,
        home_page: impl Into<String>,
        account_name: impl Into<String>,
    ) -> Self {
        Self {
            object_type: agent_object_type(),
            name: Some(name.into()),
            mbox: None,
            account: Some(Account {
                home_page: home_page.into(),
                name: account_name.into(),
            }),
        }
    }

    /// Stable key identifying the learner, used to scope stored state.
    #[must_use]
    pub fn identity_key(&self) -> String {
        if let Some(account) = &self.account {
            return format!("{}|{}", account.home_page, account.name);
        }
        if let Some(mbox) = &self.mbox {
            return mbox.clone();
        }
        self.name.clone().unwrap_or_default()
    }
}

//
// ─── VERBS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verb {
    pub id: String,
    #[serde(default)]
    pub display: BTreeMap<String, String>,
}

/// Every verb the player reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CourseVerb {
    Launched,
    Initialized,
    Passed,
    Completed,
    Terminated,
    Progressed,
    Answered,
    ClassEvent,
    SlideEvent,
    AuPassed,
    AuCompleted,
    SlideCompleted,
    SlidePassing,
    ActivityCompleted,
    ActivityPassed,
    ActivityFailed,
    ScenarioEvent,
    SlideViewed,
}

impl CourseVerb {
    #[must_use]
    pub fn display(self) -> &'static str {
        match self {
            Self::Launched => "launched",
            Self::Initialized => "initialized",
            Self::Passed => "passed",
            Self::Completed => "completed",
            Self::Terminated => "terminated",
            Self::Progressed => "progressed",
            Self::Answered => "answered",
            Self::ClassEvent => "classEvent",
            Self::SlideEvent => "slideEvent",
            Self::AuPassed => "auPassed",
            Self::AuCompleted => "auCompleted",
            Self::SlideCompleted => "slideCompleted",
            Self::SlidePassing => "slidePassing",
            Self::ActivityCompleted => "activityCompleted",
            Self::ActivityPassed => "activityPassed",
            Self::ActivityFailed => "activityFailed",
            Self::ScenarioEvent => "scenarioEvent",
            Self::SlideViewed => "SlideViewed",
        }
    }

    #[must_use]
    pub fn iri(self) -> String {
        match self {
            Self::Launched
            | Self::Initialized
            | Self::Passed
            | Self::Completed
            | Self::Terminated
            | Self::Progressed
            | Self::Answered => format!("{ADL_VERBS}/{}", self.display()),
            _ => format!("{COURSE_VERBS}/{}", self.display()),
        }
    }

    #[must_use]
    pub fn verb(self) -> Verb {
        Verb {
            id: self.iri(),
            display: BTreeMap::from([("en-US".to_owned(), self.display().to_owned())]),
        }
    }
}

//
// ─── ENVELOPE ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementObject {
    pub object_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
}

impl StatementObject {
    #[must_use]
    pub fn activity(id: impl Into<String>) -> Self {
        Self {
            object_type: "Activity".to_owned(),
            id: id.into(),
            definition: None,
        }
    }

    #[must_use]
    pub fn with_definition(mut self, definition: Value) -> Self {
        self.definition = Some(definition);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ActivityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl StatementResult {
    /// Adds an extension keyed under `https://rangeos/extensions/<path>`.
    #[must_use]
    pub fn extension(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.extensions
            .insert(format!("{EXTENSION_BASE}/{path}"), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_activities: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// xAPI statement sent to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub id: Uuid,
    pub actor: Actor,
    pub verb: Verb,
    pub object: StatementObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StatementResult>,
    pub context: Context,
    pub timestamp: DateTime<Utc>,
}

impl Statement {
    #[must_use]
    pub fn verb_display(&self) -> &str {
        self.verb
            .display
            .get("en-US")
            .map_or(self.verb.id.as_str(), String::as_str)
    }
}
