use kwave_core::model::{ExamSet, ExamSetId, Question};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_exam_set_row, map_question_row, ser};
use crate::repository::{ExamContentRepository, StorageError};

#[async_trait::async_trait]
impl ExamContentRepository for SqliteRepository {
    async fn upsert_exam_set(&self, exam_set: &ExamSet) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO exam_sets (id, title, description, time_limit_secs, difficulty, is_premium)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                time_limit_secs = excluded.time_limit_secs,
                difficulty = excluded.difficulty,
                is_premium = excluded.is_premium
            ",
        )
        .bind(id_to_i64("exam_set_id", exam_set.id().value())?)
        .bind(exam_set.title())
        .bind(exam_set.description())
        .bind(exam_set.time_limit_secs().map(i64::from))
        .bind(exam_set.difficulty().as_str())
        .bind(i64::from(exam_set.is_premium()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_exam_set(&self, id: ExamSetId) -> Result<Option<ExamSet>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, description, time_limit_secs, difficulty, is_premium
            FROM exam_sets WHERE id = ?1
            ",
        )
        .bind(id_to_i64("exam_set_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_exam_set_row).transpose()
    }

    async fn list_exam_sets(&self, limit: u32) -> Result<Vec<ExamSet>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, description, time_limit_secs, difficulty, is_premium
            FROM exam_sets
            ORDER BY id ASC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_exam_set_row).collect()
    }

    async fn replace_questions(
        &self,
        exam_set_id: ExamSetId,
        questions: &[Question],
    ) -> Result<(), StorageError> {
        let set_id = id_to_i64("exam_set_id", exam_set_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let exists = sqlx::query("SELECT 1 FROM exam_sets WHERE id = ?1")
            .bind(set_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        sqlx::query("DELETE FROM questions WHERE exam_set_id = ?1")
            .bind(set_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, question) in questions.iter().enumerate() {
            let options_json = serde_json::to_string(question.options()).map_err(ser)?;
            sqlx::query(
                r"
                INSERT INTO questions (exam_set_id, position, id, prompt, options_json, correct_index, explanation)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )
            .bind(set_id)
            .bind(i64::try_from(position).map_err(ser)?)
            .bind(id_to_i64("question_id", question.id().value())?)
            .bind(question.prompt())
            .bind(options_json)
            .bind(i64::try_from(question.correct_index()).map_err(ser)?)
            .bind(question.explanation())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_questions(&self, exam_set_id: ExamSetId) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, prompt, options_json, correct_index, explanation
            FROM questions
            WHERE exam_set_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(id_to_i64("exam_set_id", exam_set_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }
}
