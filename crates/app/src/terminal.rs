//! Line-oriented exam loop on stdin/stdout.

use std::error::Error;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use kwave_core::ExamSession;
use kwave_core::model::{ExamMode, ExamSetId};
use services::{AppServices, CountdownTask, DeliveryState, SubmissionReceipt};
use tokio::sync::{Mutex, mpsc, watch};

const TICK: Duration = Duration::from_secs(1);
const INPUT_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// Zero-based option index.
    Answer(usize),
    Next,
    Previous,
    /// Zero-based question index.
    GoTo(usize),
    Submit,
    Quit,
    Help,
}

impl Action {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let head = parts.next()?;
        let action = match head {
            "n" => Self::Next,
            "p" => Self::Previous,
            "s" => Self::Submit,
            "q" => Self::Quit,
            "h" | "?" => Self::Help,
            "g" => Self::GoTo(parse_one_based(parts.next()?)?),
            other => Self::Answer(parse_one_based(other)?),
        };
        if parts.next().is_some() {
            return None;
        }
        Some(action)
    }
}

fn parse_one_based(raw: &str) -> Option<usize> {
    raw.parse::<usize>().ok()?.checked_sub(1)
}

fn print_help() {
    println!("  <n>    answer the current question with option n");
    println!("  n / p  next / previous question");
    println!("  g <k>  go to question k");
    println!("  s      submit");
    println!("  q      quit without saving");
}

/// Forwards stdin lines into a channel from a dedicated thread.
///
/// A blocking stdin read cannot be cancelled, so it stays off the runtime and the
/// thread is left behind at exit. The channel closes on EOF or a read error.
///
/// # Errors
///
/// Returns an error if the reader thread cannot be spawned.
pub fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Runs one exam session interactively until it is submitted or abandoned.
///
/// Returns the receipt, or `None` when the exam was abandoned.
pub async fn take_exam(
    services: &AppServices,
    set_id: ExamSetId,
    mode: ExamMode,
    input: &mut mpsc::Receiver<String>,
) -> Result<Option<SubmissionReceipt>, Box<dyn Error>> {
    let exams = services.exams();
    let session = exams.start(set_id, mode).await?;

    println!(
        "{} ({} questions, {mode} mode)",
        session.exam_set().title(),
        session.len()
    );
    if let Some(limit) = session.time_limit_secs() {
        println!("Time limit: {}", format_remaining(limit));
    }
    println!("Type h for help.");
    println!();

    let session = Arc::new(Mutex::new(session));
    let mut countdown = session_countdown(&session, &exams, mode);
    let mut remaining = countdown.as_ref().map(CountdownTask::remaining);

    render(&*session.lock().await);

    let receipt = loop {
        let line = tokio::select! {
            line = input.recv() => line,
            () = wait_for_expiry(remaining.as_mut()) => {
                println!();
                println!("Time is up. Your answers were submitted automatically.");
                match countdown.as_mut() {
                    Some(task) => match task.expired().await {
                        Some(receipt) => break receipt?,
                        None => return Ok(None),
                    },
                    None => return Ok(None),
                }
            }
        };

        let Some(line) = line else {
            session.lock().await.stop_timer();
            println!("Input closed; exam abandoned.");
            return Ok(None);
        };
        let Some(action) = Action::parse(line.trim()) else {
            if !line.trim().is_empty() {
                println!("Unrecognized command. Type h for help.");
            }
            continue;
        };

        match action {
            Action::Answer(option) => {
                let mut session = session.lock().await;
                match session.answer_current(option) {
                    Ok(_) => {
                        if let Some(feedback) = session.feedback(session.current_index()) {
                            if feedback.is_correct {
                                println!("Correct.");
                            } else {
                                println!("Incorrect. The answer is {}.", feedback.correct_index + 1);
                            }
                            if let Some(explanation) = &feedback.explanation {
                                println!("  {explanation}");
                            }
                        }
                    }
                    Err(err) => println!("{err}"),
                }
            }
            Action::Next => {
                let mut session = session.lock().await;
                session.next();
                render(&session);
            }
            Action::Previous => {
                let mut session = session.lock().await;
                session.previous();
                render(&session);
            }
            Action::GoTo(index) => {
                let mut session = session.lock().await;
                session.go_to(index);
                render(&session);
            }
            Action::Help => print_help(),
            Action::Quit => {
                session.lock().await.stop_timer();
                println!("Exam abandoned. Nothing was saved.");
                return Ok(None);
            }
            Action::Submit => {
                let confirmation = session.lock().await.prepare_submit();
                let confirmation = match confirmation {
                    Ok(confirmation) => confirmation,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                if confirmation.has_unanswered() {
                    println!(
                        "{} of {} questions are unanswered.",
                        confirmation.unanswered_count(),
                        confirmation.total()
                    );
                }
                println!("Submit now? [y/N]");
                let reply = input.recv().await.unwrap_or_default();
                if !matches!(reply.trim(), "y" | "Y" | "yes") {
                    render(&*session.lock().await);
                    continue;
                }

                let mut guard = session.lock().await;
                break exams.submit(&mut guard, confirmation).await?;
            }
        }
    };

    drop(countdown.take());
    print_receipt(&receipt);
    print_review(&*session.lock().await);
    Ok(Some(receipt))
}

fn session_countdown(
    session: &Arc<Mutex<ExamSession>>,
    exams: &Arc<services::ExamSessionService>,
    mode: ExamMode,
) -> Option<CountdownTask> {
    mode.is_timed()
        .then(|| CountdownTask::spawn(Arc::clone(session), Arc::clone(exams), TICK))
}

/// Resolves once the countdown reaches zero. Never resolves for untimed sessions.
async fn wait_for_expiry(remaining: Option<&mut watch::Receiver<Option<u32>>>) {
    let Some(remaining) = remaining else {
        return std::future::pending().await;
    };
    loop {
        if remaining.changed().await.is_err() {
            return std::future::pending().await;
        }
        match *remaining.borrow_and_update() {
            Some(0) => return,
            Some(secs) if secs % 60 == 0 || secs == 30 || secs <= 10 => {
                println!("[{} left]", format_remaining(secs));
            }
            _ => {}
        }
    }
}

fn render(session: &ExamSession) {
    let progress = session.progress();
    let question = session.current_question();
    let selected = session.answers().get(progress.current_index);

    let mut header = format!(
        "Question {}/{}  answered {}/{}",
        progress.current_index + 1,
        progress.total,
        progress.answered,
        progress.total
    );
    if let Some(secs) = progress.remaining_secs {
        header.push_str(&format!("  {} left", format_remaining(secs)));
    }
    println!("{header}");
    println!("{}", question.prompt());
    for (index, option) in question.options().iter().enumerate() {
        let marker = if selected == Some(index) { '*' } else { ' ' };
        println!(" {marker}{}) {option}", index + 1);
    }
}

fn print_receipt(receipt: &SubmissionReceipt) {
    let result = &receipt.result;
    println!();
    if !receipt.first_submission {
        println!("This exam was already submitted.");
    }
    println!(
        "Score {}/180  {}%  ({} correct, {} incorrect, {} elapsed)",
        result.score(),
        result.percentage(),
        result.correct_answers(),
        result.incorrect_answers(),
        format_remaining(result.elapsed_secs())
    );
    match &receipt.delivery {
        DeliveryState::Acknowledged { .. } => println!("Result saved."),
        DeliveryState::Queued { last_error, .. } => {
            println!("Result stored on this device and will be sent later.");
            if let Some(error) = last_error {
                println!("  last error: {error}");
            }
        }
        DeliveryState::DeadLettered { last_error, .. } => {
            println!("Result stored on this device but could not be sent: {last_error}");
        }
    }
}

fn print_review(session: &ExamSession) {
    let Some(review) = session.review() else {
        return;
    };
    println!();
    for (index, item) in review.iter().enumerate() {
        let mark = if item.is_correct { "o" } else { "x" };
        let selected = item
            .selected
            .map_or_else(|| "-".to_owned(), |s| (s + 1).to_string());
        println!(
            "{mark} {:>2}. chose {selected}, answer {}",
            index + 1,
            item.correct_index + 1
        );
    }
}

fn format_remaining(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwave_core::model::{Difficulty, ExamSet, Question, QuestionId, SubmitTrigger};
    use kwave_core::time::fixed_clock;
    use services::ServiceConfig;
    use storage::repository::Storage;

    async fn services_with_set(limit: u32) -> AppServices {
        let storage = Storage::in_memory();
        let set = ExamSet::new(
            ExamSetId::new(1),
            "TOPIK I mock",
            None,
            Some(limit),
            Difficulty::Beginner,
            false,
        )
        .unwrap();
        storage.content.upsert_exam_set(&set).await.unwrap();
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
        storage
            .content
            .replace_questions(set.id(), &questions)
            .await
            .unwrap();
        AppServices::from_storage(storage, fixed_clock(), &ServiceConfig::default())
            .await
            .unwrap()
    }

    /// A line source preloaded with `lines` that stays open until the sender drops.
    fn scripted(lines: &[&str]) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(INPUT_BUFFER);
        for line in lines {
            tx.try_send((*line).to_owned()).unwrap();
        }
        (tx, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_ends_the_exam_while_input_is_idle() {
        let services = services_with_set(2).await;
        let (_keep_open, mut input) = scripted(&["1"]);

        let receipt = tokio::time::timeout(
            Duration::from_secs(60),
            take_exam(&services, ExamSetId::new(1), ExamMode::Real, &mut input),
        )
        .await
        .expect("expiry should end the exam")
        .unwrap()
        .unwrap();

        assert_eq!(receipt.result.trigger(), SubmitTrigger::Expired);
        assert_eq!(receipt.result.correct_answers(), 1);
        assert!(receipt.first_submission);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_submit_returns_a_manual_receipt() {
        let services = services_with_set(60).await;
        let (_keep_open, mut input) = scripted(&["1", "n", "2", "s", "y"]);

        let receipt = take_exam(&services, ExamSetId::new(1), ExamMode::Real, &mut input)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(receipt.result.trigger(), SubmitTrigger::Manual);
        assert_eq!(receipt.result.correct_answers(), 1);
        assert_eq!(receipt.result.incorrect_answers(), 1);
        let counts = services.outbox().count_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quitting_or_closing_input_saves_nothing() {
        let services = services_with_set(60).await;

        let (_keep_open, mut input) = scripted(&["1", "q"]);
        let quit = take_exam(&services, ExamSetId::new(1), ExamMode::Real, &mut input)
            .await
            .unwrap();
        assert!(quit.is_none());

        let (tx, mut input) = scripted(&["s", "n"]);
        drop(tx);
        let closed = take_exam(&services, ExamSetId::new(1), ExamMode::Real, &mut input)
            .await
            .unwrap();
        assert!(closed.is_none());

        let counts = services.outbox().count_by_status().await.unwrap();
        assert_eq!(counts.pending, 0);
    }

    #[test]
    fn parses_commands_one_based() {
        assert_eq!(Action::parse("3"), Some(Action::Answer(2)));
        assert_eq!(Action::parse("g 1"), Some(Action::GoTo(0)));
        assert_eq!(Action::parse("n"), Some(Action::Next));
        assert_eq!(Action::parse("s"), Some(Action::Submit));
    }

    #[test]
    fn rejects_zero_and_junk() {
        assert_eq!(Action::parse("0"), None);
        assert_eq!(Action::parse("g"), None);
        assert_eq!(Action::parse("g 0"), None);
        assert_eq!(Action::parse("n 2"), None);
        assert_eq!(Action::parse("abc"), None);
        assert_eq!(Action::parse(""), None);
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(65), "01:05");
        assert_eq!(format_remaining(3600), "60:00");
    }
}
