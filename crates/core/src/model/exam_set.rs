use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::ExamSetId;

/// Seconds granted per question when a real-mode session runs on an exam set
/// without its own time limit.
pub const DEFAULT_SECONDS_PER_QUESTION: u32 = 60;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamSetError {
    #[error("exam set title cannot be empty")]
    EmptyTitle,

    #[error("time limit must be > 0 seconds")]
    InvalidTimeLimit,

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ExamSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(ExamSetError::UnknownDifficulty(other.to_owned())),
        }
    }
}

//
// ─── EXAM SET ──────────────────────────────────────────────────────────────────
//

/// Metadata for a named, fixed collection of questions.
///
/// Questions are stored and loaded separately so listing exam sets stays cheap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExamSet {
    id: ExamSetId,
    title: String,
    description: Option<String>,
    time_limit_secs: Option<u32>,
    difficulty: Difficulty,
    is_premium: bool,
}

impl ExamSet {
    /// Builds a validated exam set.
    ///
    /// # Errors
    ///
    /// Returns `ExamSetError::EmptyTitle` for a blank title and
    /// `ExamSetError::InvalidTimeLimit` for a zero time limit.
    pub fn new(
        id: ExamSetId,
        title: impl Into<String>,
        description: Option<String>,
        time_limit_secs: Option<u32>,
        difficulty: Difficulty,
        is_premium: bool,
    ) -> Result<Self, ExamSetError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(ExamSetError::EmptyTitle);
        }
        if time_limit_secs == Some(0) {
            return Err(ExamSetError::InvalidTimeLimit);
        }

        Ok(Self {
            id,
            title,
            description: description
                .map(|d| d.trim().to_owned())
                .filter(|d| !d.is_empty()),
            time_limit_secs,
            difficulty,
            is_premium,
        })
    }

    #[must_use]
    pub fn id(&self) -> ExamSetId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.is_premium
    }

    /// Time limit a real-mode session should run with for `question_count` questions.
    #[must_use]
    pub fn effective_time_limit(&self, question_count: usize) -> u32 {
        self.time_limit_secs.unwrap_or_else(|| {
            let count = u32::try_from(question_count).unwrap_or(u32::MAX);
            count.saturating_mul(DEFAULT_SECONDS_PER_QUESTION).max(1)
        })
    }
}
