use std::sync::Arc;

use kwave_core::model::{ExamMode, ExamResult, ExamSetId};
use kwave_core::{Clock, ExamSession, SubmitConfirmation, SubmitOutcome};
use rand::seq::SliceRandom;
use storage::repository::{OutboxId, ResultOutboxRepository};

use crate::content::ExamContentSource;
use crate::delivery::{DeliveryOutcome, ResultDeliveryService};
use crate::error::ExamServiceError;

//
// ─── RECEIPT ───────────────────────────────────────────────────────────────────
//

/// Where a submitted result stands with the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    /// The backend has the result.
    Acknowledged { receipt_id: Option<String> },
    /// Saved locally; delivery will be retried.
    Queued {
        attempts: u32,
        last_error: Option<String>,
    },
    /// Saved locally; retries are exhausted.
    DeadLettered { attempts: u32, last_error: String },
}

impl DeliveryState {
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, DeliveryState::Acknowledged { .. })
    }
}

impl From<DeliveryOutcome> for DeliveryState {
    fn from(outcome: DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Delivered { receipt_id } => Self::Acknowledged { receipt_id },
            DeliveryOutcome::Retrying {
                attempts, error, ..
            } => Self::Queued {
                attempts,
                last_error: Some(error).filter(|e| !e.is_empty()),
            },
            DeliveryOutcome::DeadLettered { attempts, error } => Self::DeadLettered {
                attempts,
                last_error: error,
            },
        }
    }
}

/// What the user is told after submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub result: ExamResult,
    pub outbox_id: OutboxId,
    pub delivery: DeliveryState,
    /// `false` when the session had already been submitted by another path.
    pub first_submission: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Starts exam sessions and hands finished results to the outbox.
#[derive(Clone)]
pub struct ExamSessionService {
    clock: Clock,
    content: Arc<dyn ExamContentSource>,
    outbox: Arc<dyn ResultOutboxRepository>,
    delivery: Arc<ResultDeliveryService>,
    shuffle_practice: bool,
}

impl ExamSessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        content: Arc<dyn ExamContentSource>,
        outbox: Arc<dyn ResultOutboxRepository>,
        delivery: Arc<ResultDeliveryService>,
    ) -> Self {
        Self {
            clock,
            content,
            outbox,
            delivery,
            shuffle_practice: true,
        }
    }

    /// Shuffle question order in practice sessions (on by default).
    #[must_use]
    pub fn with_practice_shuffle(mut self, enabled: bool) -> Self {
        self.shuffle_practice = enabled;
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Loads `set_id` and opens a session. Real mode starts the countdown.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Content` if the set cannot be loaded and
    /// `ExamServiceError::Session` if it has no questions.
    pub async fn start(
        &self,
        set_id: ExamSetId,
        mode: ExamMode,
    ) -> Result<ExamSession, ExamServiceError> {
        let content = self.content.load(set_id).await?;
        let mut questions = content.questions;
        if mode == ExamMode::Practice && self.shuffle_practice {
            questions.shuffle(&mut rand::rng());
        }

        let session = ExamSession::start(content.exam_set, questions, mode, self.clock.now())?;
        tracing::info!(
            session_id = %session.id(),
            exam_set_id = %set_id,
            mode = %mode,
            questions = session.len(),
            time_limit_secs = ?session.time_limit_secs(),
            "exam session started"
        );
        Ok(session)
    }

    /// Manual submission after the user confirmed.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Session` for a confirmation from another session,
    /// or a storage error if the result cannot be queued. The session stays submitted
    /// in that case and [`Self::record_outcome`] can be retried.
    pub async fn submit(
        &self,
        session: &mut ExamSession,
        confirmation: SubmitConfirmation,
    ) -> Result<SubmissionReceipt, ExamServiceError> {
        let outcome = session.confirm_submit(confirmation, self.clock.now())?;
        self.record_outcome(outcome).await
    }

    /// Forced submission when time runs out.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the result cannot be queued.
    pub async fn submit_expired(
        &self,
        session: &mut ExamSession,
    ) -> Result<SubmissionReceipt, ExamServiceError> {
        let outcome = session.force_submit(self.clock.now())?;
        self.record_outcome(outcome).await
    }

    /// Queues a finalized result and, for a first submission, tries one immediate delivery.
    ///
    /// A repeated submission reports the existing outbox entry without sending again.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` or `ExamServiceError::Delivery` on outbox failures.
    pub async fn record_outcome(
        &self,
        outcome: SubmitOutcome,
    ) -> Result<SubmissionReceipt, ExamServiceError> {
        let first_submission = outcome.is_first();
        let result = outcome.into_result();
        let outbox_id = self.outbox.enqueue(&result, self.clock.now()).await?;

        let delivery = if first_submission {
            tracing::info!(
                session_id = %result.session_id(),
                trigger = %result.trigger(),
                score = result.score(),
                percentage = result.percentage(),
                "exam submitted"
            );
            self.delivery.deliver_entry(outbox_id).await?.into()
        } else {
            let entry = self.outbox.get(outbox_id).await?;
            DeliveryOutcome::from(&entry).into()
        };

        Ok(SubmissionReceipt {
            result,
            outbox_id,
            delivery,
            first_submission,
        })
    }
}
