use async_trait::async_trait;
use course_core::model::{Actor, Statement};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Address of one state document: learner × activity × state id, optionally
/// scoped to a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKey {
    pub actor: Actor,
    pub activity_id: String,
    pub state_id: String,
    pub registration: Option<String>,
}

impl StateKey {
    #[must_use]
    pub fn new(
        actor: Actor,
        activity_id: impl Into<String>,
        state_id: impl Into<String>,
        registration: Option<String>,
    ) -> Self {
        Self {
            actor,
            activity_id: activity_id.into(),
            state_id: state_id.into(),
            registration,
        }
    }

    /// Flat key used by local adapters.
    #[must_use]
    pub fn storage_key(&self) -> (String, String, String, String) {
        (
            self.actor.identity_key(),
            self.activity_id.clone(),
            self.state_id.clone(),
            self.registration.clone().unwrap_or_default(),
        )
    }
}

/// Key/value document store for learner state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a state document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures. Absence is `Ok(None)`.
    async fn get_state(&self, key: &StateKey) -> Result<Option<Value>, StorageError>;

    /// Store (replace) a state document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn put_state(&self, key: &StateKey, document: &Value) -> Result<(), StorageError>;
}

/// Destination for xAPI statements.
#[async_trait]
pub trait StatementSink: Send + Sync {
    /// Deliver one statement.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` for a duplicate statement id, or other
    /// storage errors.
    async fn send_statement(&self, statement: &Statement) -> Result<(), StorageError>;
}

type StateMap = HashMap<(String, String, String, String), Value>;

/// Process-local state store.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    documents: Arc<Mutex<StateMap>>,
}

impl InMemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.len())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_state(&self, key: &StateKey) -> Result<Option<Value>, StorageError> {
        let guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&key.storage_key()).cloned())
    }

    async fn put_state(&self, key: &StateKey, document: &Value) -> Result<(), StorageError> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.storage_key(), document.clone());
        Ok(())
    }
}

/// Statement sink that keeps everything in memory, in delivery order.
#[derive(Clone, Default)]
pub struct InMemoryStatementLog {
    statements: Arc<Mutex<Vec<Statement>>>,
}

impl InMemoryStatementLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything delivered so far.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn statements(&self) -> Result<Vec<Statement>, StorageError> {
        let guard = self
            .statements
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }
}

#[async_trait]
impl StatementSink for InMemoryStatementLog {
    async fn send_statement(&self, statement: &Statement) -> Result<(), StorageError> {
        let mut guard = self
            .statements
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.iter().any(|existing| existing.id == statement.id) {
            return Err(StorageError::Conflict);
        }
        guard.push(statement.clone());
        Ok(())
    }
}

/// State store and statement sink behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub states: Arc<dyn StateStore>,
    pub statements: Arc<dyn StatementSink>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let states: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let statements: Arc<dyn StatementSink> = Arc::new(InMemoryStatementLog::new());
        Self { states, statements }
    }
}
