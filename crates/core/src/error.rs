use thiserror::Error;

use crate::model::{ExamSetError, QuestionError, ResultError};
use crate::recording::RecordingError;
use crate::session::SessionError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    ExamSet(#[from] ExamSetError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
}
