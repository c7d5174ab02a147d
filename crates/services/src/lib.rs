#![forbid(unsafe_code)]

pub mod background;
pub mod config;
pub mod emitter;
pub mod error;
pub mod grader;
pub mod record_store;
pub mod resume;
pub mod retry;
pub mod scenario;
pub mod session;
pub mod sync;

pub use course_core::Clock;

pub use background::BackgroundTasks;
pub use config::LaunchConfig;
pub use emitter::{DeliveryFailure, StatementEmitter};
pub use error::{
    ConfigError, EmitError, GradeError, RecordStoreError, RetryError, ScenarioError,
    SessionError, SyncError,
};
pub use grader::{ActivityGrader, GradeOutcome, GradeRequest};
pub use record_store::HttpRecordStore;
pub use resume::{ResumeState, SessionResumeController, start_session};
pub use retry::{RetryEvent, RetryPolicy, retry_with_policy};
pub use scenario::{ConsoleCredentials, HttpScenarioBackend, RangeData, ScenarioBackend, ScenarioService};
pub use session::{CourseSession, SlideVisit, Submission};
pub use sync::{QuizProgress, RemoteStateSync};
