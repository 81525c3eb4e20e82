use serde::Serialize;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question needs at least two options, got {count}")]
    TooFewOptions { count: usize },

    #[error("option {index} is blank")]
    BlankOption { index: usize },

    #[error("correct option {index} is outside the {count} available options")]
    CorrectIndexOutOfRange { index: usize, count: usize },
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple-choice question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    options: Vec<String>,
    correct_index: usize,
    explanation: Option<String>,
}

impl Question {
    /// Builds a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, there are fewer than two
    /// options, an option is blank, or `correct_index` does not point at an option.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_index: usize,
        explanation: Option<String>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into().trim().to_owned();
        if prompt.is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions {
                count: options.len(),
            });
        }
        if let Some(index) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::BlankOption { index });
        }
        if correct_index >= options.len() {
            return Err(QuestionError::CorrectIndexOutOfRange {
                index: correct_index,
                count: options.len(),
            });
        }

        let explanation = explanation
            .map(|e| e.trim().to_owned())
            .filter(|e| !e.is_empty());

        Ok(Self {
            id,
            prompt,
            options,
            correct_index,
            explanation,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn correct_index(&self) -> usize {
        self.correct_index
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn is_correct(&self, option_index: usize) -> bool {
        option_index == self.correct_index
    }
}
