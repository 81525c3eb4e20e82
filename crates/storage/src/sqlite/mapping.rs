use chrono::{DateTime, Utc};
use kwave_core::model::{
    AnswerMap, Difficulty, ExamMode, ExamResult, ExamSet, ExamSetId, Question, QuestionId,
    ResultCounts, ResultTiming, SessionId, SubmitTrigger,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{DeliveryStatus, OutboxEntry, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn exam_set_id_from_i64(v: i64) -> Result<ExamSetId, StorageError> {
    Ok(ExamSetId::new(i64_to_u64("exam_set_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn map_exam_set_row(row: &SqliteRow) -> Result<ExamSet, StorageError> {
    let id = exam_set_id_from_i64(row.try_get("id").map_err(ser)?)?;
    let difficulty: Difficulty = row
        .try_get::<String, _>("difficulty")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let time_limit = row
        .try_get::<Option<i64>, _>("time_limit_secs")
        .map_err(ser)?
        .map(|v| i64_to_u32("time_limit_secs", v))
        .transpose()?;
    let is_premium: i64 = row.try_get("is_premium").map_err(ser)?;

    ExamSet::new(
        id,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        time_limit,
        difficulty,
        is_premium != 0,
    )
    .map_err(ser)
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let id = question_id_from_i64(row.try_get("id").map_err(ser)?)?;
    let options_json: String = row.try_get("options_json").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;
    let correct_index: i64 = row.try_get("correct_index").map_err(ser)?;
    let correct_index = usize::try_from(correct_index).map_err(|_| {
        StorageError::Serialization(format!("invalid correct_index: {correct_index}"))
    })?;

    Question::new(
        id,
        row.try_get::<String, _>("prompt").map_err(ser)?,
        options,
        correct_index,
        row.try_get::<Option<String>, _>("explanation").map_err(ser)?,
    )
    .map_err(ser)
}

fn map_result_columns(row: &SqliteRow) -> Result<ExamResult, StorageError> {
    let session_id: SessionId = row
        .try_get::<String, _>("session_id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let exam_set_id = exam_set_id_from_i64(row.try_get("exam_set_id").map_err(ser)?)?;
    let mode: ExamMode = row
        .try_get::<String, _>("mode")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let trigger: SubmitTrigger = row
        .try_get::<String, _>("submit_trigger")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    let counts = ResultCounts {
        total_questions: i64_to_u32("total_questions", row.try_get("total_questions").map_err(ser)?)?,
        correct_answers: i64_to_u32("correct_answers", row.try_get("correct_answers").map_err(ser)?)?,
        incorrect_answers: i64_to_u32(
            "incorrect_answers",
            row.try_get("incorrect_answers").map_err(ser)?,
        )?,
        percentage: i64_to_u32("percentage", row.try_get("percentage").map_err(ser)?)?,
        score: i64_to_u32("score", row.try_get("score").map_err(ser)?)?,
    };
    let timing = ResultTiming {
        started_at: row.try_get("started_at").map_err(ser)?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
        elapsed_secs: i64_to_u32("elapsed_secs", row.try_get("elapsed_secs").map_err(ser)?)?,
        time_limit_secs: row
            .try_get::<Option<i64>, _>("time_limit_secs")
            .map_err(ser)?
            .map(|v| i64_to_u32("time_limit_secs", v))
            .transpose()?,
    };

    let question_ids_json: String = row.try_get("question_ids_json").map_err(ser)?;
    let question_ids: Vec<QuestionId> = serde_json::from_str(&question_ids_json).map_err(ser)?;
    let answers_json: String = row.try_get("answers_json").map_err(ser)?;
    let answers: AnswerMap = serde_json::from_str(&answers_json).map_err(ser)?;

    ExamResult::from_persisted(
        session_id,
        exam_set_id,
        mode,
        trigger,
        counts,
        timing,
        question_ids,
        answers,
    )
    .map_err(ser)
}

pub(crate) fn map_outbox_row(row: &SqliteRow) -> Result<OutboxEntry, StorageError> {
    let status: DeliveryStatus = row.try_get::<String, _>("status").map_err(ser)?.parse()?;
    let next_attempt_at: DateTime<Utc> = row.try_get("next_attempt_at").map_err(ser)?;

    Ok(OutboxEntry {
        id: row.try_get("id").map_err(ser)?,
        result: map_result_columns(row)?,
        status,
        attempts: i64_to_u32("attempts", row.try_get("attempts").map_err(ser)?)?,
        last_error: row.try_get("last_error").map_err(ser)?,
        next_attempt_at,
        created_at: row.try_get("created_at").map_err(ser)?,
        delivered_at: row.try_get("delivered_at").map_err(ser)?,
        receipt_id: row.try_get("receipt_id").map_err(ser)?,
    })
}
