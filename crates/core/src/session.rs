use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::model::{
    AnswerMap, ExamMode, ExamResult, ExamSet, Question, ResultCounts, ResultError, ResultTiming,
    SessionId, SubmitTrigger,
};
use crate::scoring::{self, QuestionReview};
use crate::time::elapsed_secs;
use crate::timer::{CountdownTimer, TimerEvent, TimerState};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for session")]
    Empty,

    #[error("question {index} is out of range (session has {total})")]
    QuestionOutOfRange { index: usize, total: usize },

    #[error("option {option_index} is out of range for question {question_index} ({options} options)")]
    OptionOutOfRange {
        question_index: usize,
        option_index: usize,
        options: usize,
    },

    #[error("session already submitted")]
    AlreadySubmitted,

    #[error("confirmation was issued for another session")]
    ConfirmationMismatch,

    #[error(transparent)]
    Result(#[from] ResultError),
}

//
// ─── VIEW TYPES ────────────────────────────────────────────────────────────────
//

/// Immediate feedback shown in practice mode after a question is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub selected: usize,
    pub correct_index: usize,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// Aggregated view of session progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub unanswered: usize,
    pub current_index: usize,
    pub remaining_secs: Option<u32>,
    pub is_submitted: bool,
}

/// Summary shown before a manual submission is confirmed.
///
/// Only `ExamSession::prepare_submit` creates one, so a manual submission always
/// passes through the confirmation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitConfirmation {
    session_id: SessionId,
    total: usize,
    unanswered: Vec<usize>,
}

impl SubmitConfirmation {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Indices of questions still unanswered when the confirmation was prepared.
    #[must_use]
    pub fn unanswered(&self) -> &[usize] {
        &self.unanswered
    }

    #[must_use]
    pub fn unanswered_count(&self) -> usize {
        self.unanswered.len()
    }

    #[must_use]
    pub fn has_unanswered(&self) -> bool {
        !self.unanswered.is_empty()
    }
}

/// Result of asking the session to submit.
///
/// The first transition wins; every later request, through either path, gets the
/// stored result back without rescoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(ExamResult),
    AlreadySubmitted(ExamResult),
}

impl SubmitOutcome {
    #[must_use]
    pub fn result(&self) -> &ExamResult {
        match self {
            SubmitOutcome::Submitted(r) | SubmitOutcome::AlreadySubmitted(r) => r,
        }
    }

    #[must_use]
    pub fn into_result(self) -> ExamResult {
        match self {
            SubmitOutcome::Submitted(r) | SubmitOutcome::AlreadySubmitted(r) => r,
        }
    }

    /// True only for the call that actually closed the session.
    #[must_use]
    pub fn is_first(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted(_))
    }
}

/// What a one-second tick did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Untimed session, or the timer is no longer running.
    Idle,
    Running { remaining_secs: u32 },
    /// Time ran out and the session was force-submitted by this tick.
    Expired(SubmitOutcome),
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One learner's attempt at an exam set.
///
/// Holds the ordered questions, the answer map, the current-question pointer and,
/// for real mode, the countdown. Submission is one-way: once a result exists the
/// answer map is frozen and the stored result is returned on every later request.
/// Dropping an unsubmitted session discards it.
pub struct ExamSession {
    id: SessionId,
    exam_set: ExamSet,
    mode: ExamMode,
    questions: Vec<Question>,
    answers: AnswerMap,
    current: usize,
    started_at: DateTime<Utc>,
    time_limit_secs: Option<u32>,
    timer: CountdownTimer,
    result: Option<ExamResult>,
}

impl ExamSession {
    /// Starts a session. Real mode starts its countdown immediately.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if `questions` is empty.
    pub fn start(
        exam_set: ExamSet,
        questions: Vec<Question>,
        mode: ExamMode,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        Self::start_with_id(SessionId::new_random(), exam_set, questions, mode, started_at)
    }

    /// Same as [`ExamSession::start`] with a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if `questions` is empty.
    pub fn start_with_id(
        id: SessionId,
        exam_set: ExamSet,
        questions: Vec<Question>,
        mode: ExamMode,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }

        let mut timer = CountdownTimer::inactive();
        let time_limit_secs = if mode.is_timed() {
            let limit = exam_set.effective_time_limit(questions.len());
            timer.start(limit);
            Some(limit)
        } else {
            None
        };

        Ok(Self {
            id,
            exam_set,
            mode,
            questions,
            answers: AnswerMap::new(),
            current: 0,
            started_at,
            time_limit_secs,
            timer,
            result: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn exam_set(&self) -> &ExamSet {
        &self.exam_set
    }

    #[must_use]
    pub fn mode(&self) -> ExamMode {
        self.mode
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false: a session cannot be started without questions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    #[must_use]
    pub fn timer_state(&self) -> TimerState {
        self.timer.state()
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.timer.remaining_secs()
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.result.is_some()
    }

    #[must_use]
    pub fn result(&self) -> Option<&ExamResult> {
        self.result.as_ref()
    }

    //
    // ── answering ──────────────────────────────────────────────────────────────
    //

    /// Records `option_index` for `question_index`, returning the previous selection.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadySubmitted` after submission,
    /// `QuestionOutOfRange` or `OptionOutOfRange` for invalid indices.
    /// The answer map is untouched on every error.
    pub fn select_answer(
        &mut self,
        question_index: usize,
        option_index: usize,
    ) -> Result<Option<usize>, SessionError> {
        if self.is_submitted() {
            return Err(SessionError::AlreadySubmitted);
        }
        let question = self.question(question_index)?;
        if option_index >= question.option_count() {
            return Err(SessionError::OptionOutOfRange {
                question_index,
                option_index,
                options: question.option_count(),
            });
        }
        Ok(self.answers.select(question_index, option_index))
    }

    /// Answers the question under the pointer.
    ///
    /// # Errors
    ///
    /// See [`ExamSession::select_answer`].
    pub fn answer_current(&mut self, option_index: usize) -> Result<Option<usize>, SessionError> {
        self.select_answer(self.current, option_index)
    }

    /// Practice-mode feedback for an answered question; `None` in real mode or when unanswered.
    #[must_use]
    pub fn feedback(&self, question_index: usize) -> Option<AnswerFeedback> {
        if self.mode != ExamMode::Practice {
            return None;
        }
        let question = self.questions.get(question_index)?;
        let selected = self.answers.get(question_index)?;
        Some(AnswerFeedback {
            selected,
            correct_index: question.correct_index(),
            is_correct: question.is_correct(selected),
            explanation: question.explanation().map(str::to_owned),
        })
    }

    /// Per-question review, available once the session is submitted.
    #[must_use]
    pub fn review(&self) -> Option<Vec<QuestionReview>> {
        self.result
            .as_ref()
            .map(|_| scoring::score(&self.questions, &self.answers).reviews)
    }

    //
    // ── navigation ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.questions[self.current]
    }

    /// Moves to the next question, staying on the last one.
    pub fn next(&mut self) -> usize {
        self.go_to(self.current.saturating_add(1))
    }

    /// Moves to the previous question, staying on the first one.
    pub fn previous(&mut self) -> usize {
        self.go_to(self.current.saturating_sub(1))
    }

    /// Jumps to `index`, clamped to `[0, len - 1]`.
    pub fn go_to(&mut self, index: usize) -> usize {
        self.current = index.min(self.questions.len() - 1);
        self.current
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.questions.len();
        let answered = self.answers.answered_count(total);
        SessionProgress {
            total,
            answered,
            unanswered: total - answered,
            current_index: self.current,
            remaining_secs: self.timer.remaining_secs(),
            is_submitted: self.is_submitted(),
        }
    }

    //
    // ── submission ─────────────────────────────────────────────────────────────
    //

    /// First half of a manual submission: summarizes what is still unanswered.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadySubmitted` if the session is closed.
    pub fn prepare_submit(&self) -> Result<SubmitConfirmation, SessionError> {
        if self.is_submitted() {
            return Err(SessionError::AlreadySubmitted);
        }
        Ok(SubmitConfirmation {
            session_id: self.id,
            total: self.questions.len(),
            unanswered: self.answers.unanswered(self.questions.len()),
        })
    }

    /// Second half of a manual submission.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConfirmationMismatch` for a confirmation from another session.
    pub fn confirm_submit(
        &mut self,
        confirmation: SubmitConfirmation,
        at: DateTime<Utc>,
    ) -> Result<SubmitOutcome, SessionError> {
        if confirmation.session_id != self.id {
            return Err(SessionError::ConfirmationMismatch);
        }
        self.finalize(SubmitTrigger::Manual, at)
    }

    /// Forced submission used when time runs out. Skips confirmation.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` if the result cannot be built.
    pub fn force_submit(&mut self, at: DateTime<Utc>) -> Result<SubmitOutcome, SessionError> {
        self.finalize(SubmitTrigger::Expired, at)
    }

    /// Advances the countdown by one second, force-submitting on expiry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` if the forced result cannot be built.
    pub fn tick(&mut self, at: DateTime<Utc>) -> Result<TickOutcome, SessionError> {
        if self.is_submitted() {
            return Ok(TickOutcome::Idle);
        }
        match self.timer.tick() {
            TimerEvent::Idle => Ok(TickOutcome::Idle),
            TimerEvent::Tick { remaining_secs } => Ok(TickOutcome::Running { remaining_secs }),
            TimerEvent::Expired => Ok(TickOutcome::Expired(self.force_submit(at)?)),
        }
    }

    /// Tears the countdown down without submitting, e.g. when the exam view is dismissed.
    pub fn stop_timer(&mut self) {
        self.timer.stop();
    }

    fn finalize(
        &mut self,
        trigger: SubmitTrigger,
        at: DateTime<Utc>,
    ) -> Result<SubmitOutcome, SessionError> {
        if let Some(existing) = &self.result {
            return Ok(SubmitOutcome::AlreadySubmitted(existing.clone()));
        }

        self.timer.stop();

        let submitted_at = at.max(self.started_at);
        let mut elapsed = elapsed_secs(self.started_at, submitted_at);
        if let (SubmitTrigger::Expired, Some(limit)) = (trigger, self.time_limit_secs) {
            elapsed = elapsed.min(limit);
        }

        let breakdown = scoring::score(&self.questions, &self.answers);
        let result = ExamResult::from_persisted(
            self.id,
            self.exam_set.id(),
            self.mode,
            trigger,
            ResultCounts::from(&breakdown),
            ResultTiming {
                started_at: self.started_at,
                submitted_at,
                elapsed_secs: elapsed,
                time_limit_secs: self.time_limit_secs,
            },
            self.questions.iter().map(Question::id).collect(),
            self.answers.clone(),
        )?;

        self.result = Some(result.clone());
        Ok(SubmitOutcome::Submitted(result))
    }

    fn question(&self, index: usize) -> Result<&Question, SessionError> {
        self.questions
            .get(index)
            .ok_or(SessionError::QuestionOutOfRange {
                index,
                total: self.questions.len(),
            })
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("id", &self.id)
            .field("exam_set_id", &self.exam_set.id())
            .field("mode", &self.mode)
            .field("questions_len", &self.questions.len())
            .field("answered", &self.answers.len())
            .field("current", &self.current)
            .field("timer", &self.timer.state())
            .field("submitted", &self.is_submitted())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
