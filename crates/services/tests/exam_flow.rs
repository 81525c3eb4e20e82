use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kwave_core::model::{
    Difficulty, ExamMode, ExamResult, ExamSet, ExamSetId, Question, QuestionId, SubmitTrigger,
};
use kwave_core::time::fixed_now;
use services::{
    Clock, DeliveryPolicy, DeliveryState, ExamSessionService, ResultDeliveryService, ResultSink,
    SinkAck, SinkError, StoredExamContent,
};
use storage::repository::{
    DeliveryStatus, ExamContentRepository, InMemoryRepository, ResultOutboxRepository,
};

#[derive(Default)]
struct ScriptedSink {
    failures_left: AtomicU32,
    received: Mutex<Vec<ExamResult>>,
}

impl ScriptedSink {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Self::default()
        }
    }

    fn received(&self) -> Vec<ExamResult> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for ScriptedSink {
    async fn deliver(&self, result: &ExamResult) -> Result<SinkAck, SinkError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(SinkError::Unavailable("connection refused".into()));
        }
        self.received.lock().unwrap().push(result.clone());
        Ok(SinkAck {
            receipt_id: Some(format!("rcpt-{}", result.session_id())),
        })
    }
}

async fn seed(repo: &InMemoryRepository) -> ExamSetId {
    let set_id = ExamSetId::new(10);
    let set = ExamSet::new(
        set_id,
        "TOPIK II reading 1",
        Some("Short passages".into()),
        Some(600),
        Difficulty::Advanced,
        false,
    )
    .unwrap();
    repo.upsert_exam_set(&set).await.unwrap();

    let questions: Vec<Question> = (0..4)
        .map(|i| {
            Question::new(
                QuestionId::new(100 + i),
                format!("질문 {i}"),
                vec!["①".into(), "②".into(), "③".into(), "④".into()],
                usize::try_from(i).unwrap(),
                Some(format!("Option {} is correct", i + 1)),
            )
            .unwrap()
        })
        .collect();
    repo.replace_questions(set_id, &questions).await.unwrap();
    set_id
}

fn build(
    repo: &InMemoryRepository,
    sink: Arc<ScriptedSink>,
    clock: Clock,
) -> ExamSessionService {
    let repo = Arc::new(repo.clone());
    let delivery = Arc::new(ResultDeliveryService::new(
        clock,
        repo.clone(),
        sink,
        DeliveryPolicy::default(),
    ));
    ExamSessionService::new(
        clock,
        Arc::new(StoredExamContent::new(repo.clone())),
        repo,
        delivery,
    )
}

#[tokio::test]
async fn real_exam_submits_scores_and_delivers_once() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo).await;
    let sink = Arc::new(ScriptedSink::default());
    let service = build(&repo, Arc::clone(&sink), Clock::fixed(fixed_now()));

    let mut session = service.start(set_id, ExamMode::Real).await.unwrap();
    assert_eq!(session.time_limit_secs(), Some(600));
    assert!(session.feedback(0).is_none());

    // Questions keep their stored order in real mode; question i is answered by option i.
    session.answer_current(0).unwrap();
    session.next();
    session.answer_current(1).unwrap();
    session.next();
    session.answer_current(3).unwrap();

    let confirmation = session.prepare_submit().unwrap();
    assert_eq!(confirmation.unanswered(), &[3]);

    let receipt = service.submit(&mut session, confirmation).await.unwrap();
    assert!(receipt.first_submission);
    assert_eq!(receipt.result.trigger(), SubmitTrigger::Manual);
    assert_eq!(receipt.result.correct_answers(), 2);
    assert_eq!(receipt.result.incorrect_answers(), 2);
    assert_eq!(receipt.result.percentage(), 50);
    assert_eq!(receipt.result.score(), 90);
    assert_eq!(
        receipt.delivery,
        DeliveryState::Acknowledged {
            receipt_id: Some(format!("rcpt-{}", session.id())),
        }
    );

    // The countdown firing after a manual submit changes nothing.
    let again = service.submit_expired(&mut session).await.unwrap();
    assert!(!again.first_submission);
    assert_eq!(again.result, receipt.result);
    assert_eq!(again.outbox_id, receipt.outbox_id);
    assert!(again.delivery.is_acknowledged());

    assert_eq!(sink.received().len(), 1);
    let entry = repo.get(receipt.outbox_id).await.unwrap();
    assert_eq!(entry.status, DeliveryStatus::Delivered);
    assert!(session.review().is_some());
}

#[tokio::test]
async fn practice_exam_gives_feedback_and_has_no_countdown() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo).await;
    let sink = Arc::new(ScriptedSink::default());
    let service =
        build(&repo, Arc::clone(&sink), Clock::fixed(fixed_now())).with_practice_shuffle(false);

    let mut session = service.start(set_id, ExamMode::Practice).await.unwrap();
    assert_eq!(session.time_limit_secs(), None);
    assert_eq!(session.remaining_secs(), None);

    session.go_to(2);
    session.answer_current(1).unwrap();
    let feedback = session.feedback(2).unwrap();
    assert!(!feedback.is_correct);
    assert_eq!(feedback.correct_index, 2);
    assert_eq!(feedback.explanation.as_deref(), Some("Option 3 is correct"));

    let confirmation = session.prepare_submit().unwrap();
    let receipt = service.submit(&mut session, confirmation).await.unwrap();
    assert_eq!(receipt.result.mode(), ExamMode::Practice);
    assert_eq!(receipt.result.correct_answers(), 0);
    assert_eq!(receipt.result.time_limit_secs(), None);
}

#[tokio::test]
async fn shuffled_practice_answers_still_map_to_question_ids() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo).await;
    let sink = Arc::new(ScriptedSink::default());
    let service = build(&repo, Arc::clone(&sink), Clock::fixed(fixed_now()));

    let mut session = service.start(set_id, ExamMode::Practice).await.unwrap();
    for index in 0..session.len() {
        let correct = session.questions()[index].correct_index();
        session.select_answer(index, correct).unwrap();
    }
    let confirmation = session.prepare_submit().unwrap();
    let receipt = service.submit(&mut session, confirmation).await.unwrap();
    assert_eq!(receipt.result.percentage(), 100);
    assert_eq!(receipt.result.score(), 180);

    let delivered = &sink.received()[0];
    for (question_id, selected) in delivered.answers_by_question() {
        assert_eq!(u64::try_from(selected).unwrap() + 100, question_id.value());
    }
}

#[tokio::test]
async fn failed_delivery_keeps_result_queued_for_a_later_drain() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo).await;
    let sink = Arc::new(ScriptedSink::failing(1));
    let mut clock = Clock::fixed(fixed_now());
    let service = build(&repo, Arc::clone(&sink), clock);

    let mut session = service.start(set_id, ExamMode::Real).await.unwrap();
    let receipt = service.submit_expired(&mut session).await.unwrap();
    assert_eq!(receipt.result.trigger(), SubmitTrigger::Expired);
    assert_eq!(receipt.result.correct_answers(), 0);
    match &receipt.delivery {
        DeliveryState::Queued {
            attempts,
            last_error,
        } => {
            assert_eq!(*attempts, 1);
            assert!(last_error.as_deref().unwrap().contains("connection refused"));
        }
        other => panic!("expected queued delivery, got {other:?}"),
    }

    clock.advance(chrono::Duration::seconds(31));
    let later = ResultDeliveryService::new(
        clock,
        Arc::new(repo.clone()),
        sink.clone(),
        DeliveryPolicy::default(),
    );
    let report = later.drain(10).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(sink.received().len(), 1);
    assert_eq!(
        repo.get(receipt.outbox_id).await.unwrap().status,
        DeliveryStatus::Delivered
    );
}
