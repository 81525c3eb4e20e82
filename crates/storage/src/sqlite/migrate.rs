use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the current schema.
///
/// Version 1 creates exam sets, their ordered questions, the result outbox and the
/// single-row sign-in table.
#[allow(clippy::too_many_lines)]
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

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS exam_sets (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT,
                    time_limit_secs INTEGER CHECK (time_limit_secs IS NULL OR time_limit_secs > 0),
                    difficulty TEXT NOT NULL,
                    is_premium INTEGER NOT NULL CHECK (is_premium IN (0, 1))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    exam_set_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    id INTEGER NOT NULL,
                    prompt TEXT NOT NULL,
                    options_json TEXT NOT NULL,
                    correct_index INTEGER NOT NULL CHECK (correct_index >= 0),
                    explanation TEXT,
                    PRIMARY KEY (exam_set_id, position),
                    FOREIGN KEY (exam_set_id) REFERENCES exam_sets(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS result_outbox (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL UNIQUE,
                    exam_set_id INTEGER NOT NULL,
                    mode TEXT NOT NULL,
                    submit_trigger TEXT NOT NULL,
                    total_questions INTEGER NOT NULL CHECK (total_questions > 0),
                    correct_answers INTEGER NOT NULL CHECK (correct_answers >= 0),
                    incorrect_answers INTEGER NOT NULL CHECK (incorrect_answers >= 0),
                    percentage INTEGER NOT NULL CHECK (percentage BETWEEN 0 AND 100),
                    score INTEGER NOT NULL CHECK (score >= 0),
                    elapsed_secs INTEGER NOT NULL CHECK (elapsed_secs >= 0),
                    time_limit_secs INTEGER,
                    started_at TEXT NOT NULL,
                    submitted_at TEXT NOT NULL,
                    question_ids_json TEXT NOT NULL,
                    answers_json TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('pending', 'delivered', 'failed')),
                    attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
                    last_error TEXT,
                    next_attempt_at TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    delivered_at TEXT,
                    receipt_id TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS auth_state (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    access_token TEXT NOT NULL,
                    user_id INTEGER NOT NULL,
                    user_name TEXT NOT NULL,
                    user_role TEXT NOT NULL,
                    saved_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_result_outbox_status_next_attempt
                    ON result_outbox (status, next_attempt_at, created_at, id);
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
        tracing::info!(version = 1, "applied sqlite migration");
    }

    Ok(())
}
