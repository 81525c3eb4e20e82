use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {raw}")]
pub struct ParseModeError {
    kind: &'static str,
    raw: String,
}

impl ParseModeError {
    pub(crate) fn new(kind: &'static str, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_owned(),
        }
    }
}

/// How a session is run.
///
/// `Practice` is untimed and reveals explanations as soon as a question is answered.
/// `Real` is timed, hides explanations, and is submitted automatically when time runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamMode {
    Practice,
    Real,
}

impl ExamMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExamMode::Practice => "practice",
            ExamMode::Real => "real",
        }
    }

    #[must_use]
    pub fn is_timed(self) -> bool {
        matches!(self, ExamMode::Real)
    }
}

impl fmt::Display for ExamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "practice" => Ok(Self::Practice),
            "real" => Ok(Self::Real),
            other => Err(ParseModeError::new("exam mode", other)),
        }
    }
}

/// What closed a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitTrigger {
    /// The learner confirmed submission.
    Manual,
    /// The countdown reached zero.
    Expired,
}

impl SubmitTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::Expired => "expired",
        }
    }
}

impl fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmitTrigger {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "manual" => Ok(Self::Manual),
            "expired" => Ok(Self::Expired),
            other => Err(ParseModeError::new("submit trigger", other)),
        }
    }
}
