/// Error types for the chat HTTP/streaming daemon
use pinion_core::WorkflowError;
use thiserror::Error;

pub type DaemonResult<T> = Result<T, DaemonError>;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("authentication error: {0}")]
    AuthError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("metrics error: {0}")]
    MetricsError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DaemonError {
    /// HTTP status code this error should be reported under.
    pub fn status_code(&self) -> u16 {
        match self {
            DaemonError::ConfigError(_) | DaemonError::ServerError(_) | DaemonError::MetricsError(_) => 500,
            DaemonError::AuthError(_) => 401,
            DaemonError::InvalidRequest(_) | DaemonError::SerializationError(_) => 400,
            DaemonError::IoError(_) => 500,
            DaemonError::Workflow(e) => match e {
                WorkflowError::NotFound(_) => 404,
                WorkflowError::NotPaused(_) | WorkflowError::AlreadyTerminal(_) => 409,
                WorkflowError::InvalidRequest(_) => 400,
                _ => 500,
            },
        }
    }
}

impl From<serde_json::Error> for DaemonError {
    fn from(e: serde_json::Error) -> Self {
        DaemonError::SerializationError(e.to_string())
    }
}
