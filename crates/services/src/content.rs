use std::sync::Arc;

use async_trait::async_trait;
use kwave_core::model::{ExamSet, ExamSetId, Question};
use storage::repository::ExamContentRepository;

use crate::error::ContentError;

/// An exam set together with its ordered questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamContent {
    pub exam_set: ExamSet,
    pub questions: Vec<Question>,
}

/// Where exam sessions get their questions from.
#[async_trait]
pub trait ExamContentSource: Send + Sync {
    /// Load an exam set and its questions.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::NotFound` for an unknown set, or the underlying
    /// storage or API failure.
    async fn load(&self, id: ExamSetId) -> Result<ExamContent, ContentError>;
}

/// Content source backed by the local repository.
#[derive(Clone)]
pub struct StoredExamContent {
    repo: Arc<dyn ExamContentRepository>,
}

impl StoredExamContent {
    #[must_use]
    pub fn new(repo: Arc<dyn ExamContentRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ExamContentSource for StoredExamContent {
    async fn load(&self, id: ExamSetId) -> Result<ExamContent, ContentError> {
        let exam_set = self
            .repo
            .get_exam_set(id)
            .await?
            .ok_or(ContentError::NotFound(id))?;
        let questions = self.repo.get_questions(id).await?;
        Ok(ExamContent {
            exam_set,
            questions,
        })
    }
}
