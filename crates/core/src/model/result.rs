use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{AnswerMap, ExamMode, ExamSetId, QuestionId, SessionId, SubmitTrigger};
use crate::scoring::{ScoreBreakdown, normalized_score, percentage};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("submitted_at is before started_at")]
    InvalidTimeRange,

    #[error("a result needs at least one question")]
    NoQuestions,

    #[error("correct ({correct}) + incorrect ({incorrect}) != total ({total})")]
    CountMismatch {
        total: u32,
        correct: u32,
        incorrect: u32,
    },

    #[error("percentage {actual} does not match {expected} for the stored counts")]
    PercentageMismatch { expected: u32, actual: u32 },

    #[error("score {actual} does not match {expected} for the stored counts")]
    ScoreMismatch { expected: u32, actual: u32 },

    #[error("{ids} question ids for {total} questions")]
    QuestionOrderMismatch { ids: usize, total: u32 },
}

/// Headline numbers of a submitted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultCounts {
    pub total_questions: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub percentage: u32,
    pub score: u32,
}

impl From<&ScoreBreakdown> for ResultCounts {
    fn from(b: &ScoreBreakdown) -> Self {
        Self {
            total_questions: b.total,
            correct_answers: b.correct,
            incorrect_answers: b.incorrect,
            percentage: b.percentage,
            score: b.score,
        }
    }
}

/// Timing of a submitted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultTiming {
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub elapsed_secs: u32,
    pub time_limit_secs: Option<u32>,
}

/// Final outcome of one exam session, computed once at submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamResult {
    session_id: SessionId,
    exam_set_id: ExamSetId,
    mode: ExamMode,
    trigger: SubmitTrigger,
    counts: ResultCounts,
    timing: ResultTiming,
    question_ids: Vec<QuestionId>,
    answers: AnswerMap,
}

impl ExamResult {
    /// Rehydrate a result from storage or the wire, re-checking its invariants.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if counts do not add up, the percentage or score
    /// disagree with the counts, the question order has the wrong length, or the
    /// timestamps are reversed.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        session_id: SessionId,
        exam_set_id: ExamSetId,
        mode: ExamMode,
        trigger: SubmitTrigger,
        counts: ResultCounts,
        timing: ResultTiming,
        question_ids: Vec<QuestionId>,
        answers: AnswerMap,
    ) -> Result<Self, ResultError> {
        if timing.submitted_at < timing.started_at {
            return Err(ResultError::InvalidTimeRange);
        }
        let ResultCounts {
            total_questions: total,
            correct_answers: correct,
            incorrect_answers: incorrect,
            ..
        } = counts;
        if total == 0 {
            return Err(ResultError::NoQuestions);
        }
        if correct.checked_add(incorrect) != Some(total) {
            return Err(ResultError::CountMismatch {
                total,
                correct,
                incorrect,
            });
        }
        let expected = percentage(correct, total);
        if counts.percentage != expected {
            return Err(ResultError::PercentageMismatch {
                expected,
                actual: counts.percentage,
            });
        }
        let expected = normalized_score(correct, total);
        if counts.score != expected {
            return Err(ResultError::ScoreMismatch {
                expected,
                actual: counts.score,
            });
        }
        if u32::try_from(question_ids.len()).ok() != Some(total) {
            return Err(ResultError::QuestionOrderMismatch {
                ids: question_ids.len(),
                total,
            });
        }

        Ok(Self {
            session_id,
            exam_set_id,
            mode,
            trigger,
            counts,
            timing,
            question_ids,
            answers,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn exam_set_id(&self) -> ExamSetId {
        self.exam_set_id
    }

    #[must_use]
    pub fn mode(&self) -> ExamMode {
        self.mode
    }

    #[must_use]
    pub fn trigger(&self) -> SubmitTrigger {
        self.trigger
    }

    #[must_use]
    pub fn counts(&self) -> ResultCounts {
        self.counts
    }

    #[must_use]
    pub fn timing(&self) -> ResultTiming {
        self.timing
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.counts.total_questions
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.counts.correct_answers
    }

    #[must_use]
    pub fn incorrect_answers(&self) -> u32 {
        self.counts.incorrect_answers
    }

    #[must_use]
    pub fn percentage(&self) -> u32 {
        self.counts.percentage
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.counts.score
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.timing.elapsed_secs
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.timing.time_limit_secs
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.timing.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.timing.submitted_at
    }

    /// Question ids in the order the session presented them. Answer keys index into this.
    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    /// Selected option per question id, in presentation order.
    pub fn answers_by_question(&self) -> impl Iterator<Item = (QuestionId, usize)> + '_ {
        self.answers
            .iter()
            .filter_map(|(index, option)| self.question_ids.get(index).map(|id| (*id, option)))
    }
}
