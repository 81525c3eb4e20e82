#![forbid(unsafe_code)]

//! Domain core for timed and practice exam sessions: questions, answer maps,
//! the countdown, scoring and the one-way submission gate. No I/O.

pub mod error;
pub mod model;
pub mod recording;
pub mod scoring;
pub mod session;
pub mod time;
pub mod timer;

pub use error::Error;
pub use session::{
    AnswerFeedback, ExamSession, SessionError, SessionProgress, SubmitConfirmation,
    SubmitOutcome, TickOutcome,
};
pub use time::Clock;
