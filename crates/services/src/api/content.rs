use std::sync::Arc;

use async_trait::async_trait;
use kwave_core::model::{Difficulty, ExamSet, ExamSetId, Question, QuestionId};
use serde::Deserialize;
use storage::repository::ExamContentRepository;

use super::client::ApiClient;
use crate::content::{ExamContent, ExamContentSource};
use crate::error::{ApiError, ContentError};

/// Loads exam content from `GET {base}/exam-sets/{id}`.
///
/// With a cache attached, every successful download is written through to storage
/// and transport failures fall back to the cached copy.
#[derive(Clone)]
pub struct HttpExamContent {
    api: ApiClient,
    cache: Option<Arc<dyn ExamContentRepository>>,
}

impl HttpExamContent {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api, cache: None }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ExamContentRepository>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn fetch(&self, id: ExamSetId) -> Result<ExamContent, ContentError> {
        let dto: ExamContentDto = match self.api.get(&format!("exam-sets/{id}")).await {
            Ok(dto) => dto,
            Err(err) if err.status() == Some(404) => return Err(ContentError::NotFound(id)),
            Err(err) => return Err(err.into()),
        };
        dto.into_domain()
    }

    async fn from_cache(
        cache: &dyn ExamContentRepository,
        id: ExamSetId,
    ) -> Result<Option<ExamContent>, ContentError> {
        let Some(exam_set) = cache.get_exam_set(id).await? else {
            return Ok(None);
        };
        let questions = cache.get_questions(id).await?;
        Ok(Some(ExamContent {
            exam_set,
            questions,
        }))
    }
}

#[async_trait]
impl ExamContentSource for HttpExamContent {
    async fn load(&self, id: ExamSetId) -> Result<ExamContent, ContentError> {
        match (self.fetch(id).await, &self.cache) {
            (Ok(content), Some(cache)) => {
                cache.upsert_exam_set(&content.exam_set).await?;
                cache.replace_questions(id, &content.questions).await?;
                Ok(content)
            }
            (Ok(content), None) => Ok(content),
            (Err(ContentError::Api(ApiError::Http(err))), Some(cache)) => {
                tracing::warn!(exam_set_id = %id, error = %err, "content fetch failed, trying cache");
                match Self::from_cache(cache.as_ref(), id).await? {
                    Some(content) => Ok(content),
                    None => Err(ContentError::Api(ApiError::Http(err))),
                }
            }
            (Err(err), _) => Err(err),
        }
    }
}

//
// ─── WIRE TYPES ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct ExamContentDto {
    exam_set: ExamSetDto,
    #[serde(default)]
    questions: Vec<QuestionDto>,
}

#[derive(Debug, Deserialize)]
struct ExamSetDto {
    id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    time_limit_secs: Option<u32>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    is_premium: bool,
}

#[derive(Debug, Deserialize)]
struct QuestionDto {
    id: u64,
    prompt: String,
    options: Vec<String>,
    correct_index: usize,
    #[serde(default)]
    explanation: Option<String>,
}

fn invalid(e: impl std::fmt::Display) -> ContentError {
    ContentError::Invalid(e.to_string())
}

impl ExamContentDto {
    fn into_domain(self) -> Result<ExamContent, ContentError> {
        let difficulty = match self.exam_set.difficulty.as_deref() {
            Some(raw) => raw.parse::<Difficulty>().map_err(invalid)?,
            None => Difficulty::Beginner,
        };
        let exam_set = ExamSet::new(
            ExamSetId::new(self.exam_set.id),
            self.exam_set.title,
            self.exam_set.description,
            self.exam_set.time_limit_secs,
            difficulty,
            self.exam_set.is_premium,
        )
        .map_err(invalid)?;

        let questions = self
            .questions
            .into_iter()
            .map(|q| {
                Question::new(
                    QuestionId::new(q.id),
                    q.prompt,
                    q.options,
                    q.correct_index,
                    q.explanation,
                )
                .map_err(invalid)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ExamContent {
            exam_set,
            questions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dto_maps_to_validated_domain() {
        let json = r#"{
            "exam_set": {"id": 4, "title": "TOPIK II", "time_limit_secs": 3000, "difficulty": "advanced"},
            "questions": [
                {"id": 41, "prompt": "Q1", "options": ["a", "b"], "correct_index": 1},
                {"id": 42, "prompt": "Q2", "options": ["a", "b", "c"], "correct_index": 0, "explanation": "because"}
            ]
        }"#;
        let dto: ExamContentDto = serde_json::from_str(json).unwrap();
        let content = dto.into_domain().unwrap();

        assert_eq!(content.exam_set.id(), ExamSetId::new(4));
        assert_eq!(content.exam_set.difficulty(), Difficulty::Advanced);
        assert_eq!(content.questions.len(), 2);
        assert_eq!(content.questions[1].explanation(), Some("because"));
    }

    #[test]
    fn invalid_question_is_rejected() {
        let json = r#"{
            "exam_set": {"id": 4, "title": "TOPIK II"},
            "questions": [{"id": 41, "prompt": "Q1", "options": ["a", "b"], "correct_index": 5}]
        }"#;
        let dto: ExamContentDto = serde_json::from_str(json).unwrap();
        assert!(matches!(dto.into_domain(), Err(ContentError::Invalid(_))));
    }
}
