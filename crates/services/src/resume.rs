//! Session start: content → aggregate → remote progress → resume point.

use std::sync::Arc;

use course_core::evaluator::first_incomplete_slide_index;
use course_core::model::CourseDocument;
use course_core::{Clock, ContentError, ContentParser, ProgressAggregate};
use tracing::{info, warn};

use storage::repository::Storage;

use crate::config::LaunchConfig;
use crate::emitter::StatementEmitter;
use crate::error::SessionError;
use crate::session::CourseSession;
use crate::sync::RemoteStateSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeState {
    #[default]
    Uninitialized,
    ContentLoaded,
    RemoteLoadAttempted,
    Resumed { slide_index: usize },
    FreshStart { slide_index: usize },
}

impl ResumeState {
    /// Slide to open once resumption has finished.
    #[must_use]
    pub fn slide_index(self) -> Option<usize> {
        match self {
            Self::Resumed { slide_index } | Self::FreshStart { slide_index } => Some(slide_index),
            _ => None,
        }
    }
}

/// Drives one launch from raw content to a ready aggregate.
///
/// Remote trouble never fails a resume: it degrades to a fresh start.
pub struct SessionResumeController {
    parser: ContentParser,
    sync: Arc<RemoteStateSync>,
    clock: Clock,
    state: ResumeState,
}

impl SessionResumeController {
    #[must_use]
    pub fn new(parser: ContentParser, sync: Arc<RemoteStateSync>, clock: Clock) -> Self {
        Self {
            parser,
            sync,
            clock,
            state: ResumeState::Uninitialized,
        }
    }

    #[must_use]
    pub fn state(&self) -> ResumeState {
        self.state
    }

    fn transition(&mut self, next: ResumeState) {
        info!(target: "resume", from = ?self.state, to = ?next, "resume state changed");
        self.state = next;
    }

    /// Parses the content and seeds an unvisited aggregate.
    pub fn load_content(&mut self, document: &CourseDocument) -> ProgressAggregate {
        let parsed = self.parser.parse_document(document);
        let aggregate = ProgressAggregate::from_parsed(parsed, self.clock.now());
        self.transition(ResumeState::ContentLoaded);
        aggregate
    }

    /// Runs the whole resume sequence and returns the aggregate to play.
    pub async fn resume(&mut self, document: &CourseDocument) -> ProgressAggregate {
        let mut aggregate = self.load_content(document);

        // Spawned so a panicking store is contained like any other failure.
        let sync = Arc::clone(&self.sync);
        let loaded = tokio::spawn(async move { sync.load().await }).await;
        self.transition(ResumeState::RemoteLoadAttempted);

        let now = self.clock.now();
        let remote = match loaded {
            Ok(remote) => remote,
            Err(err) => {
                warn!(target: "resume", error = %err, "remote progress load aborted");
                None
            }
        };

        match remote {
            Some(progress) => {
                aggregate.replace_progress(progress, now);
                let slide_index = first_incomplete_slide_index(&aggregate);
                self.transition(ResumeState::Resumed { slide_index });
            }
            None => {
                aggregate.reset_progress(now);
                self.transition(ResumeState::FreshStart { slide_index: 0 });
            }
        }
        aggregate
    }

    /// Like [`Self::resume`], starting from the JSON content document.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Content` if the document cannot be read.
    pub async fn resume_json(&mut self, json: &str) -> Result<ProgressAggregate, SessionError> {
        let document: CourseDocument = serde_json::from_str(json)
            .map_err(|err| ContentError::InvalidDocument(err.to_string()))?;
        Ok(self.resume(&document).await)
    }
}

/// Resumes a launch and opens its session at the resume point.
///
/// Dev-mode launches run without a record store; nothing is sent or saved.
///
/// # Errors
///
/// Returns `SessionError::NoRecordStore` for a live launch without `storage`.
pub async fn start_session(
    config: &LaunchConfig,
    document: &CourseDocument,
    storage: Option<Storage>,
    clock: Clock,
) -> Result<(CourseSession, ResumeState), SessionError> {
    if storage.is_none() && !config.is_dev_mode() {
        return Err(SessionError::NoRecordStore);
    }
    let (states, statements) = storage
        .map(|storage| (Some(storage.states), Some(storage.statements)))
        .unwrap_or_default();

    let sync = Arc::new(RemoteStateSync::from_config(config, states));
    let emitter = StatementEmitter::from_config(config, statements);

    let mut controller = SessionResumeController::new(ContentParser::default(), Arc::clone(&sync), clock);
    let aggregate = controller.resume(document).await;
    let state = controller.state();

    let session = CourseSession::new(aggregate, emitter, sync, clock)
        .with_current_slide(state.slide_index().unwrap_or_default());
    Ok((session, state))
}
