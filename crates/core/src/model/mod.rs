mod activity;
mod course;
mod ids;
mod progress;
mod quiz;
mod statement;

pub use activity::{
    ActivityMetadata, ActivityPayload, ActivityScore, ActivityStatus, ActivityType, AutoGrader,
    CompletionRequired, JobePayload, QuizPayload, ScenarioPayload,
};
pub use course::{CourseDocument, CourseStructure, MoveOn, SlideDocument, SlideIdentifier};
pub use ids::{ActivityId, SlideGuid};
pub use progress::{ProgressSnapshot, ProgressTracking, SlideStatus};
pub use quiz::{AnswerOption, Question, QuestionKind, TypeAttributes};
pub use statement::{
    Account, Actor, Context, CourseVerb, EXTENSION_BASE, Statement, StatementObject,
    StatementResult, Verb,
};
