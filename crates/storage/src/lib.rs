#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryStateStore, InMemoryStatementLog, StateKey, StateStore, StatementSink, Storage,
    StorageError,
};
