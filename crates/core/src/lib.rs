#![forbid(unsafe_code)]

pub mod aggregate;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod scoring;
pub mod time;

pub use aggregate::{AggregateError, PROGRESS_VERSION, ProgressAggregate};
pub use error::{ContentError, Error, EvaluationError};
pub use parser::{ContentParser, ParsedCourse};
pub use time::Clock;
