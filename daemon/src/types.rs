/// Wire types for the chat HTTP/streaming boundary over `WorkflowRegistry`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /chat` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub repositories: Option<Vec<String>>,
    #[serde(default)]
    pub fix_version: Option<String>,
    #[serde(default)]
    pub sprint_name: Option<String>,
    #[serde(default)]
    pub release_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatData {
    pub workflow_id: String,
    pub session_id: String,
    pub current_step: String,
    pub messages: Vec<Value>,
}

/// `POST /chat` response body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub message_type: String,
    pub workflow_status: String,
    pub data: ChatData,
    pub requires_approval: bool,
}

/// `GET /chat/status/{id}` response body.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub workflow_id: String,
    pub status: String,
    pub current_step: String,
    pub execution_time: f64,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub messages: Vec<Value>,
    pub is_running: bool,
    pub steps_completed: Vec<String>,
    pub steps_failed: Vec<String>,
}

/// A frame forwarded over `/chat/stream-sse/{id}` and `/chat/ws/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    pub content: String,
    pub workflow_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub message: String,
    pub workflow_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowListEntry {
    pub workflow_id: String,
    pub kind: String,
    pub status: String,
    pub current_step: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub workflows: Vec<WorkflowListEntry>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub workflow_id: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

/// Authentication token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub scope: Vec<String>,
}
