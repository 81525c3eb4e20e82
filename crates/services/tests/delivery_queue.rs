use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use kwave_core::model::{
    AnswerMap, ExamMode, ExamResult, ExamSetId, QuestionId, ResultCounts, ResultTiming, SessionId,
    SubmitTrigger,
};
use kwave_core::time::fixed_now;
use services::{
    Clock, DeliveryOutcome, DeliveryPolicy, ResultDeliveryService, ResultSink, SinkAck, SinkError,
};
use storage::repository::{DeliveryStatus, InMemoryRepository, ResultOutboxRepository};

/// Fails until switched on, counting every attempt.
#[derive(Default)]
struct SwitchableSink {
    up: AtomicBool,
    attempts: AtomicU32,
}

#[async_trait]
impl ResultSink for SwitchableSink {
    async fn deliver(&self, _result: &ExamResult) -> Result<SinkAck, SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.up.load(Ordering::SeqCst) {
            Ok(SinkAck::default())
        } else {
            Err(SinkError::Unavailable("503 from gateway".into()))
        }
    }
}

fn result() -> ExamResult {
    let answers: AnswerMap = [(0, 1)].into_iter().collect();
    ExamResult::from_persisted(
        SessionId::new_random(),
        ExamSetId::new(2),
        ExamMode::Real,
        SubmitTrigger::Manual,
        ResultCounts {
            total_questions: 1,
            correct_answers: 1,
            incorrect_answers: 0,
            percentage: 100,
            score: 180,
        },
        ResultTiming {
            started_at: fixed_now(),
            submitted_at: fixed_now(),
            elapsed_secs: 0,
            time_limit_secs: Some(60),
        },
        vec![QuestionId::new(1)],
        answers,
    )
    .unwrap()
}

fn policy() -> DeliveryPolicy {
    DeliveryPolicy {
        max_attempts: 3,
        base_backoff_secs: 10,
    }
}

#[tokio::test]
async fn failures_back_off_then_dead_letter() {
    let repo = Arc::new(InMemoryRepository::new());
    let sink = Arc::new(SwitchableSink::default());
    let mut clock = Clock::fixed(fixed_now());
    let id = repo.enqueue(&result(), clock.now()).await.unwrap();

    let service =
        |clock| ResultDeliveryService::new(clock, repo.clone(), sink.clone(), policy());

    let first = service(clock).deliver_entry(id).await.unwrap();
    assert_eq!(
        first,
        DeliveryOutcome::Retrying {
            attempts: 1,
            next_attempt_at: fixed_now() + Duration::seconds(10),
            error: "result delivery unavailable: 503 from gateway".into(),
        }
    );

    // Not due yet.
    clock.advance(Duration::seconds(5));
    assert!(!service(clock).run_once().await.unwrap());

    clock.advance(Duration::seconds(5));
    let second = service(clock).drain(10).await.unwrap();
    assert_eq!(second.retrying, 1);
    let entry = repo.get(id).await.unwrap();
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.next_attempt_at, clock.now() + Duration::seconds(20));

    clock.advance(Duration::seconds(20));
    let third = service(clock).drain(10).await.unwrap();
    assert_eq!(third.dead_lettered, 1);

    let entry = repo.get(id).await.unwrap();
    assert_eq!(entry.status, DeliveryStatus::Failed);
    assert_eq!(entry.attempts, 3);

    // Dead-lettered entries are never retried, even once the sink recovers.
    sink.up.store(true, Ordering::SeqCst);
    clock.advance(Duration::hours(2));
    assert_eq!(service(clock).drain(10).await.unwrap().attempted(), 0);
    assert!(matches!(
        service(clock).deliver_entry(id).await.unwrap(),
        DeliveryOutcome::DeadLettered { attempts: 3, .. }
    ));
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);

    let counts = repo.count_by_status().await.unwrap();
    assert_eq!((counts.pending, counts.delivered, counts.failed), (0, 0, 1));
}

#[tokio::test]
async fn drain_delivers_oldest_first_and_respects_limit() {
    let repo = Arc::new(InMemoryRepository::new());
    let sink = Arc::new(SwitchableSink::default());
    sink.up.store(true, Ordering::SeqCst);

    let first = repo.enqueue(&result(), fixed_now()).await.unwrap();
    let second = repo
        .enqueue(&result(), fixed_now() + Duration::seconds(1))
        .await
        .unwrap();
    let service = ResultDeliveryService::new(
        Clock::fixed(fixed_now() + Duration::seconds(5)),
        repo.clone(),
        sink.clone(),
        policy(),
    );

    let report = service.drain(1).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(repo.get(first).await.unwrap().status, DeliveryStatus::Delivered);
    assert_eq!(repo.get(second).await.unwrap().status, DeliveryStatus::Pending);

    let report = service.drain(10).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(!service.run_once().await.unwrap());
}

#[tokio::test]
async fn enqueue_is_idempotent_per_session() {
    let repo = InMemoryRepository::new();
    let result = result();
    let id = repo.enqueue(&result, fixed_now()).await.unwrap();
    let again = repo
        .enqueue(&result, fixed_now() + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(id, again);

    let counts = repo.count_by_status().await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(repo.get_by_session(result.session_id()).await.unwrap().id, id);
}
