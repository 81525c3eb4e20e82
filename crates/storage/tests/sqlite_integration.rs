use chrono::Duration;
use kwave_core::model::{
    AnswerMap, AuthUser, Difficulty, ExamMode, ExamResult, ExamSet, ExamSetId, Question,
    QuestionId, ResultCounts, ResultTiming, Role, SessionId, SubmitTrigger, UserId,
};
use kwave_core::time::fixed_now;
use storage::repository::{
    AuthRecord, AuthTokenRepository, DeliveryStatus, ExamContentRepository,
    ResultOutboxRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn build_question(id: u64, correct: usize) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Question {id}"),
        vec!["가".into(), "나".into(), "다".into(), "라".into()],
        correct,
        Some(format!("Explanation {id}")),
    )
    .unwrap()
}

fn build_result(correct: u32, total: u32) -> ExamResult {
    let answers: AnswerMap = (0..correct as usize).map(|i| (i, 0)).collect();
    ExamResult::from_persisted(
        SessionId::new_random(),
        ExamSetId::new(1),
        ExamMode::Real,
        SubmitTrigger::Expired,
        ResultCounts {
            total_questions: total,
            correct_answers: correct,
            incorrect_answers: total - correct,
            percentage: kwave_core::scoring::percentage(correct, total),
            score: kwave_core::scoring::normalized_score(correct, total),
        },
        ResultTiming {
            started_at: fixed_now(),
            submitted_at: fixed_now() + Duration::seconds(600),
            elapsed_secs: 600,
            time_limit_secs: Some(600),
        },
        (1..=u64::from(total)).map(QuestionId::new).collect(),
        answers,
    )
    .unwrap()
}

#[tokio::test]
async fn exam_content_roundtrip_keeps_question_order() {
    let repo = connect("memdb_content").await;

    let set = ExamSet::new(
        ExamSetId::new(7),
        "TOPIK I",
        Some("Reading".into()),
        Some(900),
        Difficulty::Intermediate,
        true,
    )
    .unwrap();
    repo.upsert_exam_set(&set).await.unwrap();

    let questions = vec![build_question(30, 2), build_question(10, 0), build_question(20, 3)];
    repo.replace_questions(set.id(), &questions).await.unwrap();

    let fetched = repo.get_exam_set(set.id()).await.unwrap().expect("exists");
    assert_eq!(fetched, set);

    let fetched_questions = repo.get_questions(set.id()).await.unwrap();
    assert_eq!(fetched_questions, questions);

    // Replacing drops the previous list.
    repo.replace_questions(set.id(), &questions[..1]).await.unwrap();
    assert_eq!(repo.get_questions(set.id()).await.unwrap().len(), 1);

    assert!(repo.get_exam_set(ExamSetId::new(8)).await.unwrap().is_none());
    assert_eq!(repo.list_exam_sets(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn replace_questions_for_unknown_set_is_not_found() {
    let repo = connect("memdb_unknown_set").await;
    let err = repo
        .replace_questions(ExamSetId::new(99), &[build_question(1, 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn outbox_persists_result_and_tracks_delivery() {
    let repo = connect("memdb_outbox").await;
    let result = build_result(3, 6);

    let id = repo.enqueue(&result, fixed_now()).await.unwrap();
    assert_eq!(repo.enqueue(&result, fixed_now()).await.unwrap(), id);

    let entry = repo.get(id).await.unwrap();
    assert_eq!(entry.result, result);
    assert_eq!(entry.status, DeliveryStatus::Pending);
    assert_eq!(entry.attempts, 0);

    let retry_at = fixed_now() + Duration::seconds(30);
    let entry = repo
        .record_failure(id, "connection refused", Some(retry_at))
        .await
        .unwrap();
    assert_eq!(entry.attempts, 1);
    assert_eq!(entry.last_error.as_deref(), Some("connection refused"));
    assert!(repo.due(fixed_now(), 10).await.unwrap().is_empty());
    assert_eq!(repo.due(retry_at, 10).await.unwrap().len(), 1);

    repo.mark_delivered(id, Some("rcpt-1"), retry_at).await.unwrap();
    let entry = repo.get_by_session(result.session_id()).await.unwrap();
    assert_eq!(entry.status, DeliveryStatus::Delivered);
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.receipt_id.as_deref(), Some("rcpt-1"));
    assert_eq!(entry.delivered_at, Some(retry_at));
    assert!(repo.due(retry_at, 10).await.unwrap().is_empty());

    let counts = repo.count_by_status().await.unwrap();
    assert_eq!((counts.pending, counts.delivered, counts.failed), (0, 1, 0));
}

#[tokio::test]
async fn outbox_dead_letters_and_orders_due_entries() {
    let repo = connect("memdb_outbox_order").await;
    let first = build_result(1, 2);
    let second = build_result(2, 2);

    let first_id = repo.enqueue(&first, fixed_now()).await.unwrap();
    let second_id = repo
        .enqueue(&second, fixed_now() + Duration::seconds(1))
        .await
        .unwrap();

    let due = repo.due(fixed_now() + Duration::seconds(5), 10).await.unwrap();
    let ids: Vec<_> = due.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![first_id, second_id]);

    let entry = repo.record_failure(first_id, "gone", None).await.unwrap();
    assert_eq!(entry.status, DeliveryStatus::Failed);

    let due = repo.due(fixed_now() + Duration::seconds(5), 10).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, second_id);

    assert!(matches!(
        repo.get(9_999).await.unwrap_err(),
        StorageError::NotFound
    ));
}

#[tokio::test]
async fn auth_state_save_load_clear() {
    let repo = connect("memdb_auth").await;
    assert!(repo.load_auth().await.unwrap().is_none());

    let record = AuthRecord {
        access_token: "token-abc".into(),
        user: AuthUser {
            id: UserId::new(42),
            name: "Minji".into(),
            role: Role::Student,
        },
        saved_at: fixed_now(),
    };
    repo.save_auth(&record).await.unwrap();
    assert_eq!(repo.load_auth().await.unwrap(), Some(record.clone()));

    let replaced = AuthRecord {
        access_token: "token-def".into(),
        ..record
    };
    repo.save_auth(&replaced).await.unwrap();
    assert_eq!(repo.load_auth().await.unwrap(), Some(replaced));

    repo.clear_auth().await.unwrap();
    assert!(repo.load_auth().await.unwrap().is_none());
}
