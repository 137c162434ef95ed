/// Pinion Daemon: HTTP and streaming front-end over the release/QA workflow engine.
pub mod auth;
pub mod chat_stream;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod types;
pub mod ws_upgrade;

pub use auth::{AuthContext, AuthManager};
pub use config::DaemonConfig;
pub use errors::{DaemonError, DaemonResult};
pub use server::RpcServer;
pub use types::{ChatRequest, ChatResponse, StatusResponse};

/// Daemon version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
