use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tag carried by every streamed output unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CrawlTask,
    Stream,
    Report,
    Done,
    Error,
}

/// The tagged unit agents emit. The streaming endpoint wraps it with the
/// request's identifiers before it goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub task_type: TaskType,
    pub content: Value,
}

impl Envelope {
    pub fn new(task_type: TaskType, content: Value) -> Self {
        Envelope { task_type, content }
    }

    /// A successful capability result.
    pub fn crawl_task(content: Value) -> Self {
        Self::new(TaskType::CrawlTask, content)
    }

    /// One incremental text delta.
    pub fn stream_text<S: Into<String>>(text: S) -> Self {
        Self::new(TaskType::Stream, json!({ "content": text.into() }))
    }

    pub fn error<S: Into<String>>(error: S) -> Self {
        Self::new(TaskType::Error, json!({ "error": error.into() }))
    }

    pub fn error_with_details<S: Into<String>, D: Into<String>>(error: S, details: D) -> Self {
        Self::new(
            TaskType::Error,
            json!({ "error": error.into(), "details": details.into() }),
        )
    }

    pub fn is_error(&self) -> bool {
        self.task_type == TaskType::Error
    }
}
