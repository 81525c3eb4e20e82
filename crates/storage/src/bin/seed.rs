use std::fmt;

use kwave_core::model::{Difficulty, ExamSet, ExamSetId, Question, QuestionId};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    set_id: ExamSetId,
    title: String,
    time_limit_secs: Option<u32>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidSetId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidTimeLimit { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSetId { raw } => write!(f, "invalid --set-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidTimeLimit { raw } => {
                write!(f, "invalid --time-limit value (seconds, > 0): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("KWAVE_DB_URL").unwrap_or_else(|_| "sqlite://kwave.sqlite3".into());
        let mut set_id = std::env::var("KWAVE_SET_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| ExamSetId::new(1), ExamSetId::new);
        let mut title = "TOPIK I Reading Practice".to_string();
        let mut time_limit_secs = Some(600);

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--set-id" => {
                    let value = require_value(&mut args, "--set-id")?;
                    set_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSetId { raw: value.clone() })?;
                }
                "--title" => {
                    title = require_value(&mut args, "--title")?;
                }
                "--time-limit" => {
                    let value = require_value(&mut args, "--time-limit")?;
                    let parsed = value
                        .parse::<u32>()
                        .ok()
                        .filter(|v| *v > 0)
                        .ok_or_else(|| ArgsError::InvalidTimeLimit { raw: value.clone() })?;
                    time_limit_secs = Some(parsed);
                }
                "--untimed" => time_limit_secs = None,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            set_id,
            title,
            time_limit_secs,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://kwave.sqlite3)");
    eprintln!("  --set-id <id>             Exam set id to upsert (default: 1)");
    eprintln!("  --title <text>            Exam set title");
    eprintln!("  --time-limit <secs>       Time limit for real mode (default: 600)");
    eprintln!("  --untimed                 Store no time limit (real mode uses 60s per question)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  KWAVE_DB_URL, KWAVE_SET_ID");
}

/// (prompt, options, correct option, explanation)
const SAMPLES: [(&str, [&str; 4], usize, &str); 6] = [
    (
        "빈칸에 알맞은 것을 고르십시오. 저는 매일 아침 ( ) 마십니다.",
        ["커피를", "빵을", "책을", "버스를"],
        0,
        "마시다 takes a drink as its object.",
    ),
    (
        "다음은 무엇에 대한 내용입니까? 사과가 있습니다. 배도 있습니다.",
        ["과일", "날씨", "가족", "취미"],
        0,
        "사과 and 배 are both fruit.",
    ),
    (
        "밑줄 친 부분과 의미가 비슷한 것을 고르십시오. 방이 아주 넓습니다.",
        ["좁습니다", "큽니다", "작습니다", "깨끗합니다"],
        1,
        "넓다 (spacious) is closest to 크다 (big).",
    ),
    (
        "빈칸에 알맞은 것을 고르십시오. 어제 친구를 ( ) 영화를 봤습니다.",
        ["만나고", "만나서", "만나면", "만나지만"],
        1,
        "-아서/어서 links a sequence where the first action enables the second.",
    ),
    (
        "다음 글의 내용과 같은 것을 고르십시오. 도서관은 월요일에 쉽니다.",
        [
            "도서관은 매일 엽니다.",
            "월요일에 도서관에 갈 수 없습니다.",
            "도서관은 주말에 쉽니다.",
            "월요일에 책을 빌릴 수 있습니다.",
        ],
        1,
        "The library is closed on Mondays.",
    ),
    (
        "무엇에 대한 이야기입니까? 저는 주말마다 산에 갑니다. 등산이 좋습니다.",
        ["직업", "취미", "음식", "계절"],
        1,
        "Going hiking every weekend is a hobby.",
    ),
];

fn sample_questions(set_id: ExamSetId) -> Result<Vec<Question>, Box<dyn std::error::Error>> {
    let base = set_id.value().saturating_mul(100);
    SAMPLES
        .iter()
        .enumerate()
        .map(|(i, (prompt, options, correct, explanation))| {
            let id = QuestionId::new(base + i as u64 + 1);
            let options = options.iter().map(ToString::to_string).collect();
            Question::new(id, *prompt, options, *correct, Some((*explanation).to_string()))
                .map_err(Into::into)
        })
        .collect()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let exam_set = ExamSet::new(
        args.set_id,
        args.title.clone(),
        Some("Six-question sample in the style of the TOPIK I reading section.".into()),
        args.time_limit_secs,
        Difficulty::Beginner,
        false,
    )?;
    storage.content.upsert_exam_set(&exam_set).await?;

    let questions = sample_questions(args.set_id)?;
    storage
        .content
        .replace_questions(args.set_id, &questions)
        .await?;

    println!(
        "Seeded exam set {} ({}) with {} questions into {}",
        args.set_id,
        exam_set.title(),
        questions.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
