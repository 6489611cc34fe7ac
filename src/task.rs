use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Final disposition of a task after it has flowed through a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub enum TaskResultCode {
    #[default]
    Unknown,
    Success,
    /// The caller supplied bad input; recorded on the task, never returned
    /// from a plugin run.
    BadInput,
    InternalError,
    ServiceUnavailable,
    /// The requester went away before a response could be delivered.
    RequesterGone,
    TaskCancelled,
}

impl fmt::Display for TaskResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskResultCode::Unknown => "Unknown",
            TaskResultCode::Success => "Success",
            TaskResultCode::BadInput => "BadInput",
            TaskResultCode::InternalError => "InternalError",
            TaskResultCode::ServiceUnavailable => "ServiceUnavailable",
            TaskResultCode::RequesterGone => "RequesterGone",
            TaskResultCode::TaskCancelled => "TaskCancelled",
        };
        f.write_str(s)
    }
}

pub type TaskError = Arc<dyn std::error::Error + Send + Sync>;

/// The unit of work flowing through a pipeline.
///
/// The core is opaque to the task's payload; it only reads and records the
/// result code and error. Errors caused by user input belong here, set via
/// `set_error`, rather than being returned from `Plugin::run`.
pub trait Task: Send {
    fn result_code(&self) -> TaskResultCode;

    fn set_result_code(&mut self, code: TaskResultCode);

    fn error(&self) -> Option<TaskError>;

    fn set_error(&mut self, error: TaskError, code: TaskResultCode);

    /// Cancellation view of the task. Plugins select on this while blocking
    /// so a cancelled task never wedges a worker.
    fn cancellation(&self) -> CancellationToken;
}

/// In-memory task used by tests and demo plugins.
pub struct BasicTask {
    result_code: TaskResultCode,
    error: Option<TaskError>,
    cancel: CancellationToken,
}

impl BasicTask {
    pub fn new() -> Self {
        Self {
            result_code: TaskResultCode::Unknown,
            error: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.result_code = TaskResultCode::TaskCancelled;
    }
}

impl Default for BasicTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for BasicTask {
    fn result_code(&self) -> TaskResultCode {
        self.result_code
    }

    fn set_result_code(&mut self, code: TaskResultCode) {
        self.result_code = code;
    }

    fn error(&self) -> Option<TaskError> {
        self.error.clone()
    }

    fn set_error(&mut self, error: TaskError, code: TaskResultCode) {
        self.error = Some(error);
        self.result_code = code;
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_records_user_input_error() {
        let mut task = BasicTask::new();
        assert_eq!(task.result_code(), TaskResultCode::Unknown);
        assert!(task.error().is_none());

        let err: TaskError = Arc::new(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "malformed body",
        ));
        task.set_error(err, TaskResultCode::BadInput);

        assert_eq!(task.result_code(), TaskResultCode::BadInput);
        assert!(task.error().is_some());
    }

    #[test]
    fn test_task_cancellation_is_observable() {
        let mut task = BasicTask::new();
        let token = task.cancellation();
        assert!(!token.is_cancelled());

        task.cancel();
        assert!(token.is_cancelled());
        assert_eq!(task.result_code(), TaskResultCode::TaskCancelled);
    }
}
