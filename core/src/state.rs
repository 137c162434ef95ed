//! Workflow state, metadata and the flat/channel partial-update discriminator.
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which graph a workflow id was started against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Release,
    Qa,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Release => "release",
            WorkflowKind::Qa => "qa",
        }
    }
}

/// Lifecycle status tracked in [`WorkflowMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// `{workflow_id, created_at, updated_at, status, current_step, error_count,
/// last_error, execution_time_seconds}` — the record observers poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub workflow_id: String,
    pub kind: WorkflowKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: WorkflowStatus,
    pub current_step: String,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub execution_time_seconds: f64,
}

impl WorkflowMetadata {
    pub fn new(workflow_id: impl Into<String>, kind: WorkflowKind, entry_step: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            kind,
            created_at: now,
            updated_at: now,
            status: WorkflowStatus::Running,
            current_step: entry_step.into(),
            error_count: 0,
            last_error: None,
            execution_time_seconds: 0.0,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.execution_time_seconds = (self.updated_at - self.created_at).num_milliseconds() as f64 / 1000.0;
    }
}

/// State carried by the release-automation pipeline (§3, *Release state*).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseState {
    pub workflow_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub fix_version: String,
    #[serde(default)]
    pub sprint_name: String,
    #[serde(default)]
    pub release_type: String,

    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub workflow_complete: bool,
    #[serde(default)]
    pub workflow_paused: bool,

    #[serde(default)]
    pub jira_tickets: Vec<serde_json::Value>,
    #[serde(default)]
    pub feature_branches: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub merge_status: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub pull_requests: Vec<String>,
    #[serde(default)]
    pub release_branches: Vec<String>,
    #[serde(default)]
    pub rollback_branches: Vec<String>,
    #[serde(default)]
    pub confluence_url: String,

    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_step: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_true")]
    pub can_continue: bool,

    #[serde(default)]
    pub steps_completed: Vec<String>,
    #[serde(default)]
    pub steps_failed: Vec<String>,

    /// Test/fault-injection hook (§4.H rule 5, §8 scenarios 4-5): when set,
    /// the named step raises an uncaught error instead of running its body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_fault: Option<FaultInjection>,
}

fn default_true() -> bool {
    true
}

/// Names a step that should fail instead of executing, and whether the
/// failure persists across `error_handler` retries or fires only once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultInjection {
    pub step: String,
    #[serde(default)]
    pub persistent: bool,
}

impl ReleaseState {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            messages: Vec::new(),
            repositories: Vec::new(),
            fix_version: String::new(),
            sprint_name: String::new(),
            release_type: String::new(),
            current_step: "start".to_string(),
            workflow_complete: false,
            workflow_paused: false,
            jira_tickets: Vec::new(),
            feature_branches: HashMap::new(),
            merge_status: HashMap::new(),
            pull_requests: Vec::new(),
            release_branches: Vec::new(),
            rollback_branches: Vec::new(),
            confluence_url: String::new(),
            error: String::new(),
            error_step: String::new(),
            retry_count: 0,
            can_continue: true,
            steps_completed: Vec::new(),
            steps_failed: Vec::new(),
            inject_fault: None,
        }
    }
}

/// State carried by the QA ReAct pipeline (§3, *QA state*).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaState {
    pub workflow_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub workflow_complete: bool,
    #[serde(default)]
    pub workflow_paused: bool,
}

impl QaState {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            messages: Vec::new(),
            current_step: "chatbot".to_string(),
            workflow_complete: false,
            workflow_paused: false,
        }
    }
}

/// Tagged union over the two workflow state shapes this engine drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowState {
    Release(ReleaseState),
    Qa(QaState),
}

impl WorkflowState {
    pub fn workflow_id(&self) -> &str {
        match self {
            WorkflowState::Release(s) => &s.workflow_id,
            WorkflowState::Qa(s) => &s.workflow_id,
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            WorkflowState::Release(s) => &s.messages,
            WorkflowState::Qa(s) => &s.messages,
        }
    }

    pub fn current_step(&self) -> &str {
        match self {
            WorkflowState::Release(s) => &s.current_step,
            WorkflowState::Qa(s) => &s.current_step,
        }
    }

    pub fn set_current_step(&mut self, step: impl Into<String>) {
        match self {
            WorkflowState::Release(s) => s.current_step = step.into(),
            WorkflowState::Qa(s) => s.current_step = step.into(),
        }
    }

    pub fn workflow_complete(&self) -> bool {
        match self {
            WorkflowState::Release(s) => s.workflow_complete,
            WorkflowState::Qa(s) => s.workflow_complete,
        }
    }

    pub fn workflow_paused(&self) -> bool {
        match self {
            WorkflowState::Release(s) => s.workflow_paused,
            WorkflowState::Qa(s) => s.workflow_paused,
        }
    }

    pub fn set_workflow_paused(&mut self, paused: bool) {
        match self {
            WorkflowState::Release(s) => s.workflow_paused = paused,
            WorkflowState::Qa(s) => s.workflow_paused = paused,
        }
    }

    /// Release-pipeline error set without `can_continue` — invariant 4's terminal-failure trigger.
    pub fn error_without_recovery(&self) -> bool {
        match self {
            WorkflowState::Release(s) => !s.error.is_empty() && !s.can_continue,
            WorkflowState::Qa(_) => false,
        }
    }

    pub fn has_error(&self) -> bool {
        match self {
            WorkflowState::Release(s) => !s.error.is_empty(),
            WorkflowState::Qa(_) => false,
        }
    }

    pub fn as_release(&self) -> Option<&ReleaseState> {
        match self {
            WorkflowState::Release(s) => Some(s),
            WorkflowState::Qa(_) => None,
        }
    }

    pub fn as_release_mut(&mut self) -> Option<&mut ReleaseState> {
        match self {
            WorkflowState::Release(s) => Some(s),
            WorkflowState::Qa(_) => None,
        }
    }

    pub fn as_qa(&self) -> Option<&QaState> {
        match self {
            WorkflowState::Qa(s) => Some(s),
            WorkflowState::Release(_) => None,
        }
    }
}

/// A partial update a node returns, to be merged into the accumulated state.
///
/// Replaces the source's implicit key-probing with an explicit discriminator
/// (§9 design note): callers choose `Flat` or `Channels` rather than the
/// merge function guessing from key names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialFields {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_paused: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_tickets: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_branches: Option<HashMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_status: Option<HashMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_requests: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confluence_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_continue: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps_completed_add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps_failed_add: Vec<String>,
}

impl PartialFields {
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// `Flat(fields)` applies directly to the accumulated state; `Channels(map)`
/// applies per named channel (`chatbot`, `tools`, ...) as used by the QA graph.
#[derive(Debug, Clone)]
pub enum Partial {
    Flat(PartialFields),
    Channels(HashMap<String, PartialFields>),
}

impl Partial {
    pub fn flat(fields: PartialFields) -> Self {
        Partial::Flat(fields)
    }

    pub fn channel(name: impl Into<String>, fields: PartialFields) -> Self {
        let mut map = HashMap::new();
        map.insert(name.into(), fields);
        Partial::Channels(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_state_round_trips() {
        let s = ReleaseState::new("wf-1");
        let json = serde_json::to_string(&WorkflowState::Release(s.clone())).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.workflow_id(), "wf-1");
        assert_eq!(back.current_step(), "start");
    }

    #[test]
    fn qa_state_round_trips() {
        let s = QaState::new("wf-2");
        let json = serde_json::to_string(&WorkflowState::Qa(s)).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.workflow_id(), "wf-2");
        assert!(back.as_qa().is_some());
    }
}
