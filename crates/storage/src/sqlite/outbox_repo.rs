use chrono::{DateTime, Utc};
use kwave_core::model::{ExamResult, SessionId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_outbox_row, ser};
use crate::repository::{
    DeliveryStatus, OutboxCounts, OutboxEntry, OutboxId, ResultOutboxRepository, StorageError,
};

const OUTBOX_COLUMNS: &str = r"
    id, session_id, exam_set_id, mode, submit_trigger,
    total_questions, correct_answers, incorrect_answers, percentage, score,
    elapsed_secs, time_limit_secs, started_at, submitted_at,
    question_ids_json, answers_json,
    status, attempts, last_error, next_attempt_at, created_at, delivered_at, receipt_id
";

impl SqliteRepository {
    async fn fetch_entry(&self, id: OutboxId) -> Result<OutboxEntry, StorageError> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM result_outbox WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_outbox_row(&row)
    }
}

#[async_trait::async_trait]
impl ResultOutboxRepository for SqliteRepository {
    async fn enqueue(
        &self,
        result: &ExamResult,
        now: DateTime<Utc>,
    ) -> Result<OutboxId, StorageError> {
        let counts = result.counts();
        let timing = result.timing();
        let question_ids_json = serde_json::to_string(result.question_ids()).map_err(ser)?;
        let answers_json = serde_json::to_string(result.answers()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO result_outbox (
                session_id, exam_set_id, mode, submit_trigger,
                total_questions, correct_answers, incorrect_answers, percentage, score,
                elapsed_secs, time_limit_secs, started_at, submitted_at,
                question_ids_json, answers_json,
                status, attempts, next_attempt_at, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 'pending', 0, ?16, ?16)
            ON CONFLICT(session_id) DO NOTHING
            ",
        )
        .bind(result.session_id().to_string())
        .bind(id_to_i64("exam_set_id", result.exam_set_id().value())?)
        .bind(result.mode().as_str())
        .bind(result.trigger().as_str())
        .bind(i64::from(counts.total_questions))
        .bind(i64::from(counts.correct_answers))
        .bind(i64::from(counts.incorrect_answers))
        .bind(i64::from(counts.percentage))
        .bind(i64::from(counts.score))
        .bind(i64::from(timing.elapsed_secs))
        .bind(timing.time_limit_secs.map(i64::from))
        .bind(timing.started_at)
        .bind(timing.submitted_at)
        .bind(question_ids_json)
        .bind(answers_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let row = sqlx::query("SELECT id FROM result_outbox WHERE session_id = ?1")
            .bind(result.session_id().to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        row.try_get("id").map_err(ser)
    }

    async fn get(&self, id: OutboxId) -> Result<OutboxEntry, StorageError> {
        self.fetch_entry(id).await
    }

    async fn get_by_session(&self, session_id: SessionId) -> Result<OutboxEntry, StorageError> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM result_outbox WHERE session_id = ?1");
        let row = sqlx::query(&sql)
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_outbox_row(&row)
    }

    async fn due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<OutboxEntry>, StorageError> {
        let sql = format!(
            r"
            SELECT {OUTBOX_COLUMNS}
            FROM result_outbox
            WHERE status = 'pending' AND next_attempt_at <= ?1
            ORDER BY created_at ASC, id ASC
            LIMIT ?2
            "
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_outbox_row).collect()
    }

    async fn mark_delivered(
        &self,
        id: OutboxId,
        receipt_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE result_outbox
            SET status = 'delivered',
                attempts = attempts + 1,
                delivered_at = ?2,
                receipt_id = ?3,
                last_error = NULL
            WHERE id = ?1
            ",
        )
        .bind(id)
        .bind(at)
        .bind(receipt_id)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: OutboxId,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<OutboxEntry, StorageError> {
        let res = match next_attempt_at {
            Some(at) => {
                sqlx::query(
                    r"
                    UPDATE result_outbox
                    SET attempts = attempts + 1, last_error = ?2, next_attempt_at = ?3
                    WHERE id = ?1
                    ",
                )
                .bind(id)
                .bind(error)
                .bind(at)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r"
                    UPDATE result_outbox
                    SET attempts = attempts + 1, last_error = ?2, status = ?3
                    WHERE id = ?1
                    ",
                )
                .bind(id)
                .bind(error)
                .bind(DeliveryStatus::Failed.as_str())
                .execute(&self.pool)
                .await
            }
        }
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        self.fetch_entry(id).await
    }

    async fn count_by_status(&self) -> Result<OutboxCounts, StorageError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM result_outbox GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut counts = OutboxCounts::default();
        for row in rows {
            let status: DeliveryStatus = row.try_get::<String, _>("status").map_err(ser)?.parse()?;
            let n: i64 = row.try_get("n").map_err(ser)?;
            let n = u32::try_from(n).map_err(ser)?;
            match status {
                DeliveryStatus::Pending => counts.pending = n,
                DeliveryStatus::Delivered => counts.delivered = n,
                DeliveryStatus::Failed => counts.failed = n,
            }
        }
        Ok(counts)
    }
}
