use chrono::Utc;
use course_core::model::Statement;

use super::{
    SqliteRepository,
    mapping::{db, map_statement_row, ser},
};
use crate::repository::{StatementSink, StorageError};

impl SqliteRepository {
    /// Statements recorded against an object, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or decoding failures.
    pub async fn statements_for_object(
        &self,
        object_id: &str,
    ) -> Result<Vec<Statement>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT body FROM statements
                WHERE object_id = ?1
                ORDER BY stored_at ASC, rowid ASC
            ",
        )
        .bind(object_id)
        .fetch_all(self.pool())
        .await
        .map_err(db)?;

        rows.iter().map(map_statement_row).collect()
    }

    /// Number of stored statements.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    pub async fn statement_count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM statements")
            .fetch_one(self.pool())
            .await
            .map_err(db)?;
        u64::try_from(count).map_err(ser)
    }
}

#[async_trait::async_trait]
impl StatementSink for SqliteRepository {
    async fn send_statement(&self, statement: &Statement) -> Result<(), StorageError> {
        let body = serde_json::to_string(statement).map_err(ser)?;
        sqlx::query(
            r"
                INSERT INTO statements (
                    id, actor_key, verb_id, object_id, registration, timestamp, stored_at, body
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(statement.id.to_string())
        .bind(statement.actor.identity_key())
        .bind(&statement.verb.id)
        .bind(&statement.object.id)
        .bind(statement.context.registration.as_deref())
        .bind(statement.timestamp)
        .bind(Utc::now())
        .bind(body)
        .execute(self.pool())
        .await
        .map_err(db)?;

        tracing::debug!(
            target: "lrs",
            id = %statement.id,
            verb = statement.verb_display(),
            "statement stored"
        );
        Ok(())
    }
}
