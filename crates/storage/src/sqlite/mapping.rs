use course_core::model::Statement;
use serde_json::Value;
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps driver errors, turning unique-key violations into `Conflict`.
pub(crate) fn db(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(inner) if inner.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn encode_document(document: &Value) -> Result<String, StorageError> {
    serde_json::to_string(document).map_err(ser)
}

pub(crate) fn map_document_row(row: &sqlx::sqlite::SqliteRow) -> Result<Value, StorageError> {
    let raw: String = row.try_get("document").map_err(ser)?;
    serde_json::from_str(&raw).map_err(ser)
}

pub(crate) fn map_statement_row(row: &sqlx::sqlite::SqliteRow) -> Result<Statement, StorageError> {
    let raw: String = row.try_get("body").map_err(ser)?;
    serde_json::from_str(&raw).map_err(ser)
}
