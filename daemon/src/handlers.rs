/// Chat endpoint handlers: classify, start/continue/control a workflow.
use crate::errors::{DaemonError, DaemonResult};
use crate::types::*;
use pinion_core::classifier::fallback_classify;
use pinion_core::qa_pipeline::initial_qa_state;
use pinion_core::release_pipeline::initial_release_state;
use pinion_core::state::WorkflowKind;
use pinion_core::{WorkflowRegistry, WorkflowState, WorkflowStatus};
use std::time::Duration;
use uuid::Uuid;

/// How long `handle_chat` polls a freshly-started workflow for its first
/// observable progress before returning, so the response isn't just the
/// entry step with an empty message log.
const CHAT_SETTLE_TIMEOUT: Duration = Duration::from_millis(500);
const CHAT_SETTLE_POLL: Duration = Duration::from_millis(20);

pub async fn handle_chat(registry: &WorkflowRegistry, req: ChatRequest) -> DaemonResult<ChatResponse> {
    let message_type;
    let workflow_id = if let Some(session_id) = req.session_id.as_deref().filter(|id| !id.is_empty()) {
        match registry.manager_for_id(session_id) {
            Some(manager) => {
                let status = manager.status(session_id)?;
                if status.status == WorkflowStatus::Paused {
                    manager.resume(session_id)?;
                }
                message_type = "continuation";
                session_id.to_string()
            }
            None => {
                message_type = "started";
                start_fresh(registry, &req)?
            }
        }
    } else {
        message_type = "started";
        start_fresh(registry, &req)?
    };

    let manager = registry
        .manager_for_id(&workflow_id)
        .ok_or_else(|| DaemonError::ServerError("workflow vanished immediately after start".to_string()))?;

    settle(&manager, &workflow_id).await;

    let (state, metadata) = manager.current(&workflow_id)?;
    Ok(ChatResponse {
        message: last_ai_text(&state),
        message_type: message_type.to_string(),
        workflow_status: status_str(&metadata.status),
        data: ChatData {
            workflow_id: workflow_id.clone(),
            session_id: workflow_id,
            current_step: metadata.current_step,
            messages: state.messages().iter().map(|m| serde_json::to_value(m).unwrap_or_default()).collect(),
        },
        requires_approval: false,
    })
}

fn start_fresh(registry: &WorkflowRegistry, req: &ChatRequest) -> DaemonResult<String> {
    let classification = fallback_classify(&req.message, 0.7);
    let workflow_id = Uuid::new_v4().to_string();
    match classification.kind {
        WorkflowKind::Release => {
            let manager = registry.manager_for_kind(WorkflowKind::Release);
            let state = initial_release_state(
                workflow_id.clone(),
                req.repositories.clone().unwrap_or_default(),
                req.fix_version.clone().unwrap_or_default(),
                req.sprint_name.clone().unwrap_or_default(),
                req.release_type.clone().unwrap_or_else(|| "release".to_string()),
            );
            manager.start(WorkflowState::Release(state))?;
        }
        WorkflowKind::Qa => {
            let manager = registry.manager_for_kind(WorkflowKind::Qa);
            let state = initial_qa_state(workflow_id.clone(), req.message.clone());
            manager.start(WorkflowState::Qa(state))?;
        }
    }
    Ok(workflow_id)
}

async fn settle(manager: &pinion_core::WorkflowManager, id: &str) {
    let deadline = tokio::time::Instant::now() + CHAT_SETTLE_TIMEOUT;
    loop {
        match manager.status(id) {
            Ok(status) if status.status != WorkflowStatus::Running => return,
            Err(_) => return,
            _ => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(CHAT_SETTLE_POLL).await;
    }
}

fn last_ai_text(state: &WorkflowState) -> String {
    state
        .messages()
        .iter()
        .rev()
        .find(|m| m.is_ai())
        .map(|m| m.content().to_string())
        .unwrap_or_default()
}

fn status_str(status: &WorkflowStatus) -> String {
    match status {
        WorkflowStatus::Running => "running",
        WorkflowStatus::Paused => "paused",
        WorkflowStatus::Completed => "completed",
        WorkflowStatus::Failed => "failed",
        WorkflowStatus::Cancelled => "cancelled",
    }
    .to_string()
}

pub fn handle_status(registry: &WorkflowRegistry, id: &str) -> DaemonResult<StatusResponse> {
    let manager = registry.manager_for_id(id).ok_or_else(|| DaemonError::from(pinion_core::errors::WorkflowError::NotFound(id.to_string())))?;
    let (state, metadata) = manager.current(id)?;
    Ok(StatusResponse {
        workflow_id: id.to_string(),
        status: status_str(&metadata.status),
        current_step: metadata.current_step,
        execution_time: metadata.execution_time_seconds,
        error_count: metadata.error_count,
        last_error: metadata.last_error,
        messages: state.messages().iter().map(|m| serde_json::to_value(m).unwrap_or_default()).collect(),
        is_running: metadata.status == WorkflowStatus::Running,
        steps_completed: state.as_release().map(|s| s.steps_completed.clone()).unwrap_or_default(),
        steps_failed: state.as_release().map(|s| s.steps_failed.clone()).unwrap_or_default(),
    })
}

pub fn handle_pause(registry: &WorkflowRegistry, id: &str) -> DaemonResult<ControlResponse> {
    let manager = registry.manager_for_id(id).ok_or_else(|| DaemonError::from(pinion_core::errors::WorkflowError::NotFound(id.to_string())))?;
    manager.pause(id)?;
    Ok(ControlResponse { message: "workflow paused".to_string(), workflow_id: id.to_string() })
}

pub fn handle_cancel(registry: &WorkflowRegistry, id: &str) -> DaemonResult<ControlResponse> {
    let manager = registry.manager_for_id(id).ok_or_else(|| DaemonError::from(pinion_core::errors::WorkflowError::NotFound(id.to_string())))?;
    manager.cancel(id)?;
    Ok(ControlResponse { message: "workflow cancelled".to_string(), workflow_id: id.to_string() })
}

pub fn handle_list(registry: &WorkflowRegistry) -> ListResponse {
    let workflows: Vec<WorkflowListEntry> = registry
        .all()
        .into_iter()
        .map(|summary| WorkflowListEntry {
            workflow_id: summary.workflow_id,
            kind: summary.metadata.kind.as_str().to_string(),
            status: status_str(&summary.metadata.status),
            current_step: summary.metadata.current_step,
            updated_at: summary.metadata.updated_at,
        })
        .collect();
    let total = workflows.len();
    ListResponse { workflows, total }
}

pub fn handle_delete(registry: &WorkflowRegistry, id: &str) -> DaemonResult<DeleteResponse> {
    let manager = registry.manager_for_id(id).ok_or_else(|| DaemonError::from(pinion_core::errors::WorkflowError::NotFound(id.to_string())))?;
    manager.delete(id)?;
    Ok(DeleteResponse { message: "workflow deleted".to_string(), workflow_id: id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_core::AppConfig;

    fn test_registry() -> WorkflowRegistry {
        WorkflowRegistry::init(&AppConfig::default())
    }

    #[tokio::test]
    async fn chat_classifies_and_starts_a_qa_workflow() {
        let registry = test_registry();
        let req = ChatRequest {
            message: "show me the tickets for this sprint".to_string(),
            session_id: None,
            repositories: None,
            fix_version: None,
            sprint_name: None,
            release_type: None,
        };
        let response = handle_chat(&registry, req).await.unwrap();
        assert_eq!(response.message_type, "started");
        assert!(!response.data.workflow_id.is_empty());
        assert!(!response.data.messages.is_empty());
    }

    #[tokio::test]
    async fn chat_classifies_and_starts_a_release_workflow() {
        let registry = test_registry();
        let req = ChatRequest {
            message: "please cut a release and deploy the sprint branch".to_string(),
            session_id: None,
            repositories: Some(vec!["api-service".to_string()]),
            fix_version: Some("v3.0.0".to_string()),
            sprint_name: Some("sprint-9".to_string()),
            release_type: Some("release".to_string()),
        };
        let response = handle_chat(&registry, req).await.unwrap();
        let status = handle_status(&registry, &response.data.workflow_id).unwrap();
        assert_eq!(status.status, "completed");
    }

    #[tokio::test]
    async fn status_of_unknown_workflow_is_not_found() {
        let registry = test_registry();
        assert!(handle_status(&registry, "ghost").is_err());
    }

    #[tokio::test]
    async fn list_reports_zero_workflows_on_a_fresh_registry() {
        let registry = test_registry();
        let response = handle_list(&registry);
        assert_eq!(response.total, 0);
    }
}
