use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the state and statement tables.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: state documents and the statement log.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        // An absent registration is stored as '' so it participates in the key.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS state_documents (
                    actor_key TEXT NOT NULL,
                    activity_id TEXT NOT NULL,
                    state_id TEXT NOT NULL,
                    registration TEXT NOT NULL DEFAULT '',
                    document TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (actor_key, activity_id, state_id, registration)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS statements (
                    id TEXT PRIMARY KEY,
                    actor_key TEXT NOT NULL,
                    verb_id TEXT NOT NULL,
                    object_id TEXT NOT NULL,
                    registration TEXT,
                    timestamp TEXT NOT NULL,
                    stored_at TEXT NOT NULL,
                    body TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_statements_object_stored
                    ON statements (object_id, stored_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
