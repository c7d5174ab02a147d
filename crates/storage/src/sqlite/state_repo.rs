use chrono::Utc;
use serde_json::Value;

use super::{
    SqliteRepository,
    mapping::{db, encode_document, map_document_row},
};
use crate::repository::{StateKey, StateStore, StorageError};

#[async_trait::async_trait]
impl StateStore for SqliteRepository {
    async fn get_state(&self, key: &StateKey) -> Result<Option<Value>, StorageError> {
        let (actor_key, activity_id, state_id, registration) = key.storage_key();
        let row = sqlx::query(
            r"
                SELECT document FROM state_documents
                WHERE actor_key = ?1 AND activity_id = ?2 AND state_id = ?3 AND registration = ?4
            ",
        )
        .bind(actor_key)
        .bind(activity_id)
        .bind(state_id)
        .bind(registration)
        .fetch_optional(self.pool())
        .await
        .map_err(db)?;

        row.as_ref().map(map_document_row).transpose()
    }

    async fn put_state(&self, key: &StateKey, document: &Value) -> Result<(), StorageError> {
        let (actor_key, activity_id, state_id, registration) = key.storage_key();
        sqlx::query(
            r"
                INSERT INTO state_documents (
                    actor_key, activity_id, state_id, registration, document, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(actor_key, activity_id, state_id, registration) DO UPDATE SET
                    document = excluded.document,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(actor_key)
        .bind(activity_id)
        .bind(state_id)
        .bind(registration)
        .bind(encode_document(document)?)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(db)?;

        Ok(())
    }
}
