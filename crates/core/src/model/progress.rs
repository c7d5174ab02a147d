use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::activity::ActivityStatus;
use crate::model::ids::{ActivityId, SlideGuid};

/// Per-slide flags. `completed`, `passed` and `failed` are derived by the evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlideStatus {
    pub viewed: bool,
    pub audio_completed: bool,
    pub scrolled_to_bottom: bool,
    pub completed: bool,
    pub passed: bool,
    pub failed: bool,
}

/// The mutable progress sub-tree. This is the only part persisted remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressTracking {
    pub au_progress: u8,
    pub au_completed: bool,
    pub au_passed: bool,
    pub total_progress_steps: usize,
    pub slide_status: BTreeMap<SlideGuid, SlideStatus>,
    pub activity_status: BTreeMap<ActivityId, ActivityStatus>,
}

/// Envelope written to the remote state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub progress: ProgressTracking,
    pub last_updated: DateTime<Utc>,
    pub version: String,
}
