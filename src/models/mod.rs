pub mod hint;
pub mod progress;
pub mod session;
pub mod student;
pub mod submission;
pub mod task;

pub use hint::{HintLevel, HintMessage, HintStatus};
pub use progress::{ProgressStatus, SubmitRejection, TaskProgress};
pub use session::{FinishReason, Session, SessionStatus, StudentSession};
pub use student::{ClassGroup, Student};
pub use submission::{Submission, Verdict};
pub use task::{Task, TestCase};
