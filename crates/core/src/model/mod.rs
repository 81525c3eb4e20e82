mod answers;
mod exam_set;
mod ids;
mod mode;
mod question;
mod result;
mod user;

pub use answers::AnswerMap;
pub use exam_set::{DEFAULT_SECONDS_PER_QUESTION, Difficulty, ExamSet, ExamSetError};
pub use ids::{ExamSetId, ParseIdError, QuestionId, SessionId, UserId};
pub use mode::{ExamMode, ParseModeError, SubmitTrigger};
pub use question::{Question, QuestionError};
pub use result::{ExamResult, ResultCounts, ResultError, ResultTiming};
pub use user::{AuthUser, Role};
