use std::sync::Arc;
use std::time::Duration;

use kwave_core::{ExamSession, TickOutcome};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::ExamServiceError;
use crate::exam_service::{ExamSessionService, SubmissionReceipt};

type ExpiryResult = Result<SubmissionReceipt, ExamServiceError>;

/// Background countdown for a real-mode session.
///
/// Ticks the session once per `period`, publishes the remaining seconds and, when
/// time runs out, queues the forced result through [`ExamSessionService`]. The task
/// ends on expiry, on manual submission, or when the timer is stopped. Dropping the
/// handle aborts the task.
pub struct CountdownTask {
    handle: JoinHandle<()>,
    remaining: watch::Receiver<Option<u32>>,
    expired: Option<oneshot::Receiver<ExpiryResult>>,
}

impl CountdownTask {
    /// Spawns the countdown on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        session: Arc<Mutex<ExamSession>>,
        service: Arc<ExamSessionService>,
        period: Duration,
    ) -> Self {
        let initial = session
            .try_lock()
            .ok()
            .and_then(|s| s.remaining_secs());
        let (remaining_tx, remaining) = watch::channel(initial);
        let (expired_tx, expired) = oneshot::channel();

        let handle = tokio::spawn(run(session, service, period, remaining_tx, expired_tx));

        Self {
            handle,
            remaining,
            expired: Some(expired),
        }
    }

    /// Seconds left as of the last tick. `None` once the countdown is stopped.
    #[must_use]
    pub fn remaining(&self) -> watch::Receiver<Option<u32>> {
        self.remaining.clone()
    }

    /// Waits for the forced submission.
    ///
    /// Resolves to `None` if the countdown ended without expiring (manual submit or
    /// stop), or if the receipt was already taken.
    pub async fn expired(&mut self) -> Option<ExpiryResult> {
        let rx = self.expired.take()?;
        rx.await.ok()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CountdownTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    session: Arc<Mutex<ExamSession>>,
    service: Arc<ExamSessionService>,
    period: Duration,
    remaining_tx: watch::Sender<Option<u32>>,
    expired_tx: oneshot::Sender<ExpiryResult>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;

        let outcome = {
            let mut session = session.lock().await;
            session.tick(service.clock().now())
        };

        match outcome {
            Ok(TickOutcome::Running { remaining_secs }) => {
                remaining_tx.send_replace(Some(remaining_secs));
            }
            Ok(TickOutcome::Expired(outcome)) => {
                remaining_tx.send_replace(Some(0));
                tracing::info!("exam time expired, submitting");
                let receipt = service.record_outcome(outcome).await;
                if let Err(err) = &receipt {
                    tracing::error!(error = %err, "failed to queue expired result");
                }
                let _ = expired_tx.send(receipt);
                break;
            }
            Ok(TickOutcome::Idle) => {
                remaining_tx.send_replace(None);
                break;
            }
            Err(err) => {
                tracing::error!(error = %err, "countdown tick failed");
                let _ = expired_tx.send(Err(err.into()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StoredExamContent;
    use crate::delivery::{DeliveryPolicy, OfflineSink, ResultDeliveryService};
    use crate::exam_service::DeliveryState;
    use kwave_core::model::{
        Difficulty, ExamMode, ExamSet, ExamSetId, Question, QuestionId, SubmitTrigger,
    };
    use kwave_core::time::fixed_clock;
    use kwave_core::SubmitConfirmation;
    use storage::repository::{ExamContentRepository, InMemoryRepository};

    async fn service_with_set(limit: u32) -> Arc<ExamSessionService> {
        let repo = Arc::new(InMemoryRepository::new());
        let set = ExamSet::new(
            ExamSetId::new(1),
            "TOPIK I mock",
            None,
            Some(limit),
            Difficulty::Beginner,
            false,
        )
        .unwrap();
        repo.upsert_exam_set(&set).await.unwrap();
        let questions: Vec<Question> = (1..=2)
            .map(|i| {
                Question::new(
                    QuestionId::new(i),
                    format!("Q{i}"),
                    vec!["a".into(), "b".into()],
                    0,
                    None,
                )
                .unwrap()
            })
            .collect();
        repo.replace_questions(set.id(), &questions).await.unwrap();

        let clock = fixed_clock();
        let delivery = Arc::new(ResultDeliveryService::new(
            clock,
            repo.clone(),
            Arc::new(OfflineSink),
            DeliveryPolicy::default(),
        ));
        Arc::new(ExamSessionService::new(
            clock,
            Arc::new(StoredExamContent::new(repo.clone())),
            repo,
            delivery,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_force_submits_once() {
        let service = service_with_set(3).await;
        let session = service.start(ExamSetId::new(1), ExamMode::Real).await.unwrap();
        let session = Arc::new(Mutex::new(session));

        let mut task = CountdownTask::spawn(
            Arc::clone(&session),
            Arc::clone(&service),
            Duration::from_secs(1),
        );
        assert_eq!(*task.remaining().borrow(), Some(3));

        let receipt = task.expired().await.unwrap().unwrap();
        assert!(receipt.first_submission);
        assert_eq!(receipt.result.trigger(), SubmitTrigger::Expired);
        assert!(matches!(receipt.delivery, DeliveryState::Queued { attempts: 1, .. }));
        assert_eq!(*task.remaining().borrow(), Some(0));
        assert!(session.lock().await.is_submitted());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submit_ends_countdown_without_expiry() {
        let service = service_with_set(60).await;
        let session = service.start(ExamSetId::new(1), ExamMode::Real).await.unwrap();
        let session = Arc::new(Mutex::new(session));

        let mut task = CountdownTask::spawn(
            Arc::clone(&session),
            Arc::clone(&service),
            Duration::from_secs(1),
        );
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(*task.remaining().borrow(), Some(58));

        {
            let mut guard = session.lock().await;
            let confirmation: SubmitConfirmation = guard.prepare_submit().unwrap();
            let receipt = service.submit(&mut guard, confirmation).await.unwrap();
            assert_eq!(receipt.result.trigger(), SubmitTrigger::Manual);
        }

        assert!(task.expired().await.is_none());
        assert!(task.is_finished());
    }
}
