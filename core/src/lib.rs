//! Pinion: a durable, resumable, graph-based workflow engine for
//! release-automation and QA pipelines.

pub mod adapters;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod graph;
pub mod html_doc;
pub mod manager;
pub mod message;
pub mod persistence;
pub mod qa_pipeline;
pub mod registry;
pub mod release_pipeline;
pub mod runtime;
pub mod state;
pub mod version;
pub mod workflow_store;

pub use config::{AppConfig, ConfigManager};
pub use errors::{
    AdapterError, AdapterResult, ClassifierError, ClassifierResult, ConfigError, ConfigResult,
    GraphError, GraphResult, PersistenceError, PersistenceResult, WorkflowError, WorkflowResult,
};
pub use graph::{Graph, GraphBuilder, NodeFn, RouteFn};
pub use manager::WorkflowManager;
pub use message::{AdditionalKwargs, Message, ToolCallRequest};
pub use registry::WorkflowRegistry;
pub use state::{Partial, WorkflowMetadata, WorkflowState, WorkflowStatus};
pub use workflow_store::WorkflowStateStore;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
