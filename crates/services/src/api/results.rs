use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kwave_core::model::ExamResult;
use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use crate::delivery::{ResultSink, SinkAck};
use crate::error::{ApiError, SinkError};

/// Posts results to `POST {base}/exam-results`, keyed by session id for deduplication.
#[derive(Clone)]
pub struct HttpResultSink {
    api: ApiClient,
}

impl HttpResultSink {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ResultSink for HttpResultSink {
    async fn deliver(&self, result: &ExamResult) -> Result<SinkAck, SinkError> {
        let payload = ResultPayload::from(result);
        let key = result.session_id().to_string();

        match self
            .api
            .post::<_, ReceiptDto>("exam-results", &payload, Some(key.as_str()))
            .await
        {
            Ok(receipt) => Ok(SinkAck {
                receipt_id: receipt.receipt_id,
            }),
            // 409: the backend already holds this session's result.
            Err(ApiError::MissingData | ApiError::Rejected { status: 409, .. }) => {
                Ok(SinkAck { receipt_id: None })
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResultPayload {
    session_id: String,
    exam_set_id: u64,
    mode: &'static str,
    trigger: &'static str,
    total_questions: u32,
    correct_answers: u32,
    incorrect_answers: u32,
    percentage: u32,
    score: u32,
    elapsed_secs: u32,
    time_limit_secs: Option<u32>,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    answers: Vec<AnswerPayload>,
}

#[derive(Debug, Serialize)]
struct AnswerPayload {
    question_id: u64,
    selected_index: usize,
}

impl From<&ExamResult> for ResultPayload {
    fn from(result: &ExamResult) -> Self {
        Self {
            session_id: result.session_id().to_string(),
            exam_set_id: result.exam_set_id().value(),
            mode: result.mode().as_str(),
            trigger: result.trigger().as_str(),
            total_questions: result.total_questions(),
            correct_answers: result.correct_answers(),
            incorrect_answers: result.incorrect_answers(),
            percentage: result.percentage(),
            score: result.score(),
            elapsed_secs: result.elapsed_secs(),
            time_limit_secs: result.time_limit_secs(),
            started_at: result.started_at(),
            submitted_at: result.submitted_at(),
            answers: result
                .answers_by_question()
                .map(|(question_id, selected_index)| AnswerPayload {
                    question_id: question_id.value(),
                    selected_index,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReceiptDto {
    #[serde(default)]
    receipt_id: Option<String>,
}
