use thiserror::Error;

/// Errors produced by the LLM gateway.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream server error: {0}")]
    Upstream(u16),

    #[error("request rejected by upstream ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unknown model alias: {0}")]
    UnknownModel(String),

    #[error("no structured output in response: {0}")]
    NoStructuredOutput(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Whether the failure is worth retrying. Rate limits, 5xx responses and
    /// transport-level timeouts are transient; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::RateLimited | GatewayError::Upstream(_) => true,
            GatewayError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Errors produced by capability registration and dispatch.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("capability not found: {0}")]
    NotFound(String),

    #[error("duplicate capability name: {0}")]
    DuplicateName(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("capability execution failed: {0}")]
    Execution(String),
}

/// Errors produced while planning an analysis run.
#[derive(Error, Debug)]
pub enum PlanningError {
    /// The model returned no tool calls at all. Silence means "nothing
    /// applicable", not "run everything".
    #[error("planner selected no analysis tasks")]
    Empty,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors produced by the atomic-insights pipeline.
#[derive(Error, Debug)]
pub enum InsightsError {
    /// A JSON-string-encoded input field held something unparseable. Empty
    /// strings are fine (they decode to the empty collection); garbage is
    /// a caller error.
    #[error("field '{field}' holds invalid JSON: {source}")]
    BadEncodedField {
        field: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("failed to write pipeline output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize pipeline output: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

