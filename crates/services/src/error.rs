//! Shared error types for the services crate.

use thiserror::Error;

use course_core::{AggregateError, ContentError, EvaluationError};
use storage::repository::StorageError;

/// Errors from the HTTP record-store client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordStoreError {
    #[error("record store request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("invalid record store url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<RecordStoreError> for StorageError {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::HttpStatus(status) if status == reqwest::StatusCode::CONFLICT => {
                StorageError::Conflict
            }
            RecordStoreError::HttpStatus(status) if status == reqwest::StatusCode::NOT_FOUND => {
                StorageError::NotFound
            }
            RecordStoreError::Json(err) => StorageError::Serialization(err.to_string()),
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

/// Errors building a `LaunchConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("missing launch parameter {0}")]
    Missing(&'static str),
    #[error("invalid url in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Errors emitted by `RemoteStateSync`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("no record store is available")]
    NoRecordStore,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors emitted by `StatementEmitter` when a send is awaited directly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmitError {
    #[error("statement sending is disabled")]
    Disabled,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ActivityGrader`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GradeError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Errors emitted by `CourseSession` and `SessionResumeController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no record store is available for a live session")]
    NoRecordStore,
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Grade(#[from] GradeError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Terminal failure of a bounded retry loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("{last}. Maximum attempts reached.")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    #[must_use]
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// Errors from scenario provisioning.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScenarioError {
    #[error("scenario api is not configured")]
    NotConfigured,
    #[error("No deployed scenarios found")]
    NoDeployedScenarios,
    #[error("No deployed scenarios found for Class Id {0}")]
    NoDeployedScenariosForClass(String),
    #[error("Error getting console credentials (data not found)")]
    MissingCredentials,
    #[error("scenario request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("invalid scenario api url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
