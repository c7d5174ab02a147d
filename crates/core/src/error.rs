use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::model::SlideGuid;

/// Problems with the AU content document as a whole.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("content document is not valid JSON: {0}")]
    InvalidDocument(String),

    #[error("duplicate slide guid: {0}")]
    DuplicateSlide(SlideGuid),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluationError {
    #[error("unknown slide: {0}")]
    UnknownSlide(SlideGuid),

    #[error("slide index {index} out of range ({count} slides)")]
    SlideIndexOutOfRange { index: usize, count: usize },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}
