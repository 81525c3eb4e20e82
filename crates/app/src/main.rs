mod terminal;

use std::fmt;
use std::path::{Path, PathBuf};

use kwave_core::model::{ExamMode, ExamSetId};
use services::{AppServices, Clock, ServiceConfig};
use tracing_subscriber::EnvFilter;

const DEFAULT_DB_URL: &str = "sqlite://kwave.sqlite3";
const MEMORY_DB_URL: &str = "sqlite::memory:";
const DEFAULT_LOG_FILTER: &str = "kwave=info,services=info,storage=warn";
const DRAIN_LIMIT: u32 = 100;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingSet,
    UnknownArg(String),
    InvalidSetId { raw: String },
    InvalidMode { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingSet => write!(f, "take requires --set <id>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSetId { raw } => write!(f, "invalid --set value: {raw}"),
            ArgsError::InvalidMode { raw } => {
                write!(f, "invalid --mode value: {raw} (expected practice or real)")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  kwave take --set <id> [--mode practice|real] [--db <sqlite_url>]");
    eprintln!("  kwave deliver [--db <sqlite_url>]");
    eprintln!("  kwave pending [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --mode real");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  KWAVE_DB_URL, KWAVE_API_BASE_URL, KWAVE_API_TIMEOUT_SECS,");
    eprintln!("  KWAVE_DELIVERY_MAX_ATTEMPTS, KWAVE_DELIVERY_BACKOFF_SECS,");
    eprintln!("  KWAVE_SHUFFLE_PRACTICE, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    Deliver,
    Pending,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "deliver" => Some(Self::Deliver),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    set_id: Option<ExamSetId>,
    mode: ExamMode,
}

impl Args {
    fn parse(
        cmd: Command,
        args: &mut impl Iterator<Item = String>,
        env_db_url: Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = env_db_url
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| DEFAULT_DB_URL.into(), |value| sqlite_url(&value));
        let mut set_id = None;
        let mut mode = ExamMode::Real;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = sqlite_url(&value);
                }
                "--set" if cmd == Command::Take => {
                    let value = require_value(args, "--set")?;
                    let parsed = value
                        .parse::<ExamSetId>()
                        .map_err(|_| ArgsError::InvalidSetId { raw: value.clone() })?;
                    set_id = Some(parsed);
                }
                "--mode" if cmd == Command::Take => {
                    let value = require_value(args, "--mode")?;
                    mode = value
                        .parse::<ExamMode>()
                        .map_err(|_| ArgsError::InvalidMode { raw: value.clone() })?;
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if cmd == Command::Take && set_id.is_none() {
            return Err(ArgsError::MissingSet);
        }

        Ok(Self {
            db_url,
            set_id,
            mode,
        })
    }
}

/// Accepts a full `sqlite://` URL, `sqlite::memory:`, or a plain file path
/// (optionally `sqlite:`-prefixed), which is anchored to the working directory.
fn sqlite_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw == MEMORY_DB_URL || raw.starts_with("sqlite://") {
        return raw.to_owned();
    }
    let path = PathBuf::from(raw.strip_prefix("sqlite:").unwrap_or(raw));
    let path = std::path::absolute(&path).unwrap_or(path);
    format!("sqlite://{}", path.display())
}

fn prepare_sqlite_dir(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == MEMORY_DB_URL {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| format!("failed to initialize logging: {err}"))?;
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next().as_deref() {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            print_usage();
            ArgsError::UnknownArg(first.to_owned())
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv, std::env::var("KWAVE_DB_URL").ok()).map_err(|e| {
        print_usage();
        e
    })?;

    let config = ServiceConfig::from_env()?;
    prepare_sqlite_dir(&parsed.db_url)?;
    let services = AppServices::new_sqlite(&parsed.db_url, Clock::default_clock(), &config).await?;

    match cmd {
        Command::Take => {
            let set_id = parsed.set_id.ok_or(ArgsError::MissingSet)?;
            let mut input = terminal::spawn_stdin_reader()?;
            terminal::take_exam(&services, set_id, parsed.mode, &mut input).await?;
            if services.is_online() {
                // Catch up on anything an earlier offline session left behind.
                let report = services.delivery().drain(DRAIN_LIMIT).await?;
                if report.attempted() > 0 {
                    tracing::info!(
                        delivered = report.delivered,
                        retrying = report.retrying,
                        dead_lettered = report.dead_lettered,
                        "flushed queued results"
                    );
                }
            }
            Ok(())
        }
        Command::Deliver => {
            if !services.is_online() {
                eprintln!("KWAVE_API_BASE_URL is not set; results stay queued.");
            }
            let report = services.delivery().drain(DRAIN_LIMIT).await?;
            println!(
                "attempted {}: {} delivered, {} will retry, {} dead-lettered",
                report.attempted(),
                report.delivered,
                report.retrying,
                report.dead_lettered
            );
            Ok(())
        }
        Command::Pending => {
            let counts = services.outbox().count_by_status().await?;
            println!("pending:   {}", counts.pending);
            println!("delivered: {}", counts.delivered);
            println!("failed:    {}", counts.failed);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
