//! Persistence of learner progress in the record store's State resource.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use course_core::model::{ActivityId, Actor, ProgressSnapshot, ProgressTracking};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use storage::repository::{StateKey, StateStore};

use crate::background::BackgroundTasks;
use crate::config::LaunchConfig;
use crate::error::SyncError;

pub const PROGRESS_STATE_SUFFIX: &str = "/states/courseAUProgress";
pub const QUIZ_CURRENT_QUESTION_SUFFIX: &str = "/states/quizCurrentQuestion";
pub const QUIZ_CURRENT_ANSWERS_SUFFIX: &str = "/states/quizCurrentAnswers";
pub const AUTO_GRADER_STATE_ID: &str = "rangeos.autograder.completed";

/// Resume point inside one quiz.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
    pub current_question: usize,
    pub answers: Vec<Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoGraderState {
    #[serde(default)]
    auto_graders: Vec<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentQuestionState {
    current_question: usize,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentAnswersState {
    answers: Vec<Value>,
}

/// Saves and loads the progress sub-tree for one learner and AU.
pub struct RemoteStateSync {
    store: Option<Arc<dyn StateStore>>,
    actor: Actor,
    activity_id: String,
    registration: Option<String>,
    issued: AtomicU64,
    written: Arc<Mutex<u64>>,
}

impl RemoteStateSync {
    #[must_use]
    pub fn new(
        store: Option<Arc<dyn StateStore>>,
        actor: Actor,
        activity_id: impl Into<String>,
        registration: Option<String>,
    ) -> Self {
        Self {
            store,
            actor,
            activity_id: activity_id.into(),
            registration,
            issued: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
        }
    }

    #[must_use]
    pub fn from_config(config: &LaunchConfig, store: Option<Arc<dyn StateStore>>) -> Self {
        Self::new(
            store,
            config.actor.clone(),
            config.activity_id.clone(),
            config.registration.clone(),
        )
    }

    #[must_use]
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    #[must_use]
    pub fn progress_state_id(&self) -> String {
        format!("{}{PROGRESS_STATE_SUFFIX}", self.activity_id)
    }

    fn key(&self, state_id: String) -> StateKey {
        StateKey::new(
            self.actor.clone(),
            self.activity_id.clone(),
            state_id,
            self.registration.clone(),
        )
    }

    fn store(&self) -> Result<&Arc<dyn StateStore>, SyncError> {
        self.store.as_ref().ok_or(SyncError::NoRecordStore)
    }

    // ─── Progress snapshot ─────────────────────────────────────────────────────

    /// Writes the snapshot. Only the progress sub-tree is ever stored.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoRecordStore` without a store, or the store's error.
    pub async fn save(&self, snapshot: &ProgressSnapshot) -> Result<(), SyncError> {
        let store = self.store()?;
        let document = serde_json::to_value(snapshot)?;
        store.put_state(&self.key(self.progress_state_id()), &document).await?;
        debug!(
            target: "lrs",
            au_progress = snapshot.progress.au_progress,
            "progress snapshot saved"
        );
        Ok(())
    }

    /// Saves in the background. Saves are numbered; a save that finishes after
    /// a newer one has been written is skipped.
    pub fn spawn_save(self: &Arc<Self>, tasks: &BackgroundTasks, snapshot: ProgressSnapshot) {
        if self.store.is_none() {
            debug!(target: "lrs", "no record store; progress kept in memory only");
            return;
        }
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let sync = Arc::clone(self);
        tasks.spawn("progress-save", async move {
            let mut written = sync.written.lock().await;
            if *written > sequence {
                debug!(target: "lrs", sequence, latest = *written, "skipping superseded save");
                return;
            }
            match sync.save(&snapshot).await {
                Ok(()) => *written = sequence,
                Err(err) => warn!(target: "lrs", sequence, error = %err, "progress save failed"),
            }
        });
    }

    /// Reads the stored progress. Transport or decoding problems are errors here;
    /// use [`Self::load`] for the forgiving variant.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if there is no store, the store fails, or the document is malformed.
    pub async fn try_load(&self) -> Result<Option<ProgressTracking>, SyncError> {
        let store = self.store()?;
        let Some(document) = store.get_state(&self.key(self.progress_state_id())).await? else {
            return Ok(None);
        };
        let snapshot: ProgressSnapshot = serde_json::from_value(document)?;
        Ok(Some(snapshot.progress))
    }

    /// Stored progress, or `None` when absent, malformed or unreachable.
    pub async fn load(&self) -> Option<ProgressTracking> {
        match self.try_load().await {
            Ok(Some(progress)) => {
                info!(target: "lrs", au_progress = progress.au_progress, "loaded remote progress");
                Some(progress)
            }
            Ok(None) => {
                debug!(target: "lrs", "no remote progress");
                None
            }
            Err(SyncError::NoRecordStore) => None,
            Err(err) => {
                warn!(target: "lrs", error = %err, "remote progress unavailable; starting fresh");
                None
            }
        }
    }

    // ─── Quiz resume point ─────────────────────────────────────────────────────

    fn quiz_state_ids(&self, slide_number: usize, quiz_id: &ActivityId) -> (String, String) {
        let scope = format!("/{slide_number}/{quiz_id}");
        (
            format!("{}{QUIZ_CURRENT_QUESTION_SUFFIX}{scope}", self.activity_id),
            format!("{}{QUIZ_CURRENT_ANSWERS_SUFFIX}{scope}", self.activity_id),
        )
    }

    /// Current question and answers of a quiz; empty when nothing usable is stored.
    pub async fn load_quiz_progress(&self, slide_number: usize, quiz_id: &ActivityId) -> QuizProgress {
        let Ok(store) = self.store() else {
            return QuizProgress::default();
        };
        let (question_id, answers_id) = self.quiz_state_ids(slide_number, quiz_id);
        let question_key = self.key(question_id);
        let answers_key = self.key(answers_id);
        let (question, answers) = tokio::join!(
            store.get_state(&question_key),
            store.get_state(&answers_key),
        );

        let decode = || -> Result<QuizProgress, SyncError> {
            let current_question = match question? {
                Some(doc) => serde_json::from_value::<CurrentQuestionState>(doc)?.current_question,
                None => 0,
            };
            let answers = match answers? {
                Some(doc) => serde_json::from_value::<CurrentAnswersState>(doc)?.answers,
                None => Vec::new(),
            };
            Ok(QuizProgress {
                current_question,
                answers,
            })
        };
        decode().unwrap_or_else(|err| {
            warn!(target: "lrs", quiz_id = %quiz_id, error = %err, "quiz progress not loaded");
            QuizProgress::default()
        })
    }

    /// Stores the quiz resume point.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` without a store or when a write fails.
    pub async fn save_quiz_progress(
        &self,
        slide_number: usize,
        quiz_id: &ActivityId,
        progress: &QuizProgress,
    ) -> Result<(), SyncError> {
        let store = self.store()?;
        let (question_id, answers_id) = self.quiz_state_ids(slide_number, quiz_id);
        let question = serde_json::to_value(CurrentQuestionState {
            current_question: progress.current_question,
        })?;
        let answers = serde_json::to_value(CurrentAnswersState {
            answers: progress.answers.clone(),
        })?;
        store.put_state(&self.key(question_id), &question).await?;
        store.put_state(&self.key(answers_id), &answers).await?;
        Ok(())
    }

    // ─── Auto-grader set ───────────────────────────────────────────────────────

    // The auto-grader set is per learner and AU, not per registration.
    fn autograder_key(&self) -> StateKey {
        StateKey::new(
            self.actor.clone(),
            self.activity_id.clone(),
            AUTO_GRADER_STATE_ID,
            None,
        )
    }

    /// Auto-grader task uuids already completed; empty when absent or unreadable.
    pub async fn completed_autograders(&self) -> BTreeSet<String> {
        let Ok(store) = self.store() else {
            return BTreeSet::new();
        };
        match store.get_state(&self.autograder_key()).await {
            Ok(Some(document)) => serde_json::from_value::<AutoGraderState>(document)
                .map(|state| state.auto_graders.into_iter().collect())
                .unwrap_or_default(),
            Ok(None) => BTreeSet::new(),
            Err(err) => {
                warn!(target: "lrs", error = %err, "auto-grader progress not loaded");
                BTreeSet::new()
            }
        }
    }

    /// Adds a completed task to the stored set. Returns `false` if it was already there.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` without a store or when the write fails.
    pub async fn record_autograder(&self, uuid: &str) -> Result<bool, SyncError> {
        let store = self.store()?;
        let mut completed = self.completed_autograders().await;
        if !completed.insert(uuid.to_owned()) {
            debug!(target: "lrs", uuid, "auto-grader already recorded");
            return Ok(false);
        }
        let document = serde_json::to_value(AutoGraderState {
            auto_graders: completed.into_iter().collect(),
        })?;
        store.put_state(&self.autograder_key(), &document).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::fixed_now;
    use serde_json::json;
    use storage::repository::InMemoryStateStore;

    fn sync(store: &InMemoryStateStore) -> RemoteStateSync {
        let store: Arc<dyn StateStore> = Arc::new(store.clone());
        RemoteStateSync::new(
            Some(store),
            Actor::with_account("Ada", "https://lms.example", "ada"),
            "https://course.example/au/1",
            Some("reg-1".into()),
        )
    }

    #[tokio::test]
    async fn malformed_progress_loads_as_none() {
        let store = InMemoryStateStore::new();
        let sync = sync(&store);
        let key = sync.key(sync.progress_state_id());
        store.put_state(&key, &json!({"progress": "garbage"})).await.unwrap();

        assert_eq!(sync.load().await, None);
        assert!(matches!(sync.try_load().await, Err(SyncError::Json(_))));
    }

    #[tokio::test]
    async fn missing_store_is_a_precondition_error() {
        let sync = RemoteStateSync::new(None, Actor::with_account("A", "h", "a"), "au", None);
        let snapshot = ProgressSnapshot {
            progress: ProgressTracking::default(),
            last_updated: fixed_now(),
            version: "1.0.0".into(),
        };
        assert!(matches!(sync.save(&snapshot).await, Err(SyncError::NoRecordStore)));
        assert_eq!(sync.load().await, None);
    }

    #[tokio::test]
    async fn state_id_is_namespaced_under_the_activity() {
        let sync = sync(&InMemoryStateStore::new());
        assert_eq!(
            sync.progress_state_id(),
            "https://course.example/au/1/states/courseAUProgress"
        );
    }

    #[tokio::test]
    async fn quiz_progress_round_trips() {
        let store = InMemoryStateStore::new();
        let sync = sync(&store);
        let quiz = ActivityId::new("quiz-1");
        assert_eq!(sync.load_quiz_progress(2, &quiz).await, QuizProgress::default());

        let progress = QuizProgress {
            current_question: 1,
            answers: vec![json!(0), json!("tcp")],
        };
        sync.save_quiz_progress(2, &quiz, &progress).await.unwrap();
        assert_eq!(sync.load_quiz_progress(2, &quiz).await, progress);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn autograder_set_merges() {
        let sync = sync(&InMemoryStateStore::new());
        assert!(sync.record_autograder("g-1").await.unwrap());
        assert!(sync.record_autograder("g-2").await.unwrap());
        assert!(!sync.record_autograder("g-1").await.unwrap());
        let done = sync.completed_autograders().await;
        assert_eq!(done.into_iter().collect::<Vec<_>>(), vec!["g-1", "g-2"]);
    }

    #[tokio::test]
    async fn background_saves_keep_the_newest_snapshot() {
        let store = InMemoryStateStore::new();
        let sync = Arc::new(sync(&store));
        let tasks = BackgroundTasks::new();
        for percent in [10_u8, 20, 30] {
            sync.spawn_save(
                &tasks,
                ProgressSnapshot {
                    progress: ProgressTracking {
                        au_progress: percent,
                        ..ProgressTracking::default()
                    },
                    last_updated: fixed_now(),
                    version: "1.0.0".into(),
                },
            );
        }
        tasks.flush().await;
        assert_eq!(sync.load().await.unwrap().au_progress, 30);
    }
}
