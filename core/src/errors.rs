//! Error types for the workflow orchestration system.
use thiserror::Error;

/// Errors from loading, parsing or validating [`crate::config::AppConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadFailed(String),

    #[error("failed to parse config file: {0}")]
    ParseFailed(String),

    #[error("failed to save config file: {0}")]
    SaveFailed(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by adapter calls to external systems (issue tracker,
/// source forge, wiki).
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("adapter request failed: {0}")]
    RequestFailed(String),

    #[error("adapter authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("adapter request timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors from the crash-safe on-disk workflow state store.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("workflow snapshot not found: {0}")]
    NotFound(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors from building or validating a graph definition.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("no route out of node: {0}")]
    NoRoute(String),

    #[error("graph has no entry point")]
    NoEntryPoint,

    #[error("node execution failed: {0}")]
    NodeFailed(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Errors from running or controlling a workflow through the manager.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("workflow {0} is not paused, cannot resume")]
    NotPaused(String),

    #[error("workflow {0} is already terminal")]
    AlreadyTerminal(String),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors from the LLM-assisted workflow-kind classifier.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("llm request failed: {0}")]
    LlmFailed(String),

    #[error("malformed classification response: {0}")]
    MalformedResponse(String),
}

pub type ClassifierResult<T> = Result<T, ClassifierError>;
