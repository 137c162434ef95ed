//! The ten release-pipeline steps plus `error_handler`/`complete`, and the
//! graph + shared routing function that wire them together (§4.H, §4.J).
use crate::adapters::AdapterBundle;
use crate::graph::{Graph, GraphBuilder, NodeFn, RouteFn, END};
use crate::message::Message;
use crate::state::{PartialFields, ReleaseState, WorkflowState};
use crate::version;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

pub const STEP_START: &str = "start";
pub const STEP_JIRA_COLLECTION: &str = "jira_collection";
pub const STEP_BRANCH_DISCOVERY: &str = "branch_discovery";
pub const STEP_MERGE_VALIDATION: &str = "merge_validation";
pub const STEP_SPRINT_MERGING: &str = "sprint_merging";
pub const STEP_RELEASE_CREATION: &str = "release_creation";
pub const STEP_PR_GENERATION: &str = "pr_generation";
pub const STEP_RELEASE_TAGGING: &str = "release_tagging";
pub const STEP_ROLLBACK_PREPARATION: &str = "rollback_preparation";
pub const STEP_DOCUMENTATION: &str = "documentation";
pub const STEP_ERROR_HANDLER: &str = "error_handler";
pub const STEP_COMPLETE: &str = "complete";
pub const STEP_ERROR: &str = "error";

const MAX_AUTO_RETRIES: u32 = 3;

/// Ordered list of the ten load-bearing pipeline steps (§4.H).
pub const PIPELINE_STEPS: &[&str] = &[
    STEP_START,
    STEP_JIRA_COLLECTION,
    STEP_BRANCH_DISCOVERY,
    STEP_MERGE_VALIDATION,
    STEP_SPRINT_MERGING,
    STEP_RELEASE_CREATION,
    STEP_PR_GENERATION,
    STEP_RELEASE_TAGGING,
    STEP_ROLLBACK_PREPARATION,
    STEP_DOCUMENTATION,
];

fn static_successor(step: &str) -> String {
    match step {
        STEP_START => STEP_JIRA_COLLECTION,
        STEP_JIRA_COLLECTION => STEP_BRANCH_DISCOVERY,
        STEP_BRANCH_DISCOVERY => STEP_MERGE_VALIDATION,
        STEP_MERGE_VALIDATION => STEP_SPRINT_MERGING,
        STEP_SPRINT_MERGING => STEP_RELEASE_CREATION,
        STEP_RELEASE_CREATION => STEP_PR_GENERATION,
        STEP_PR_GENERATION => STEP_RELEASE_TAGGING,
        STEP_RELEASE_TAGGING => STEP_ROLLBACK_PREPARATION,
        STEP_ROLLBACK_PREPARATION => STEP_DOCUMENTATION,
        STEP_DOCUMENTATION => STEP_COMPLETE,
        STEP_ERROR => STEP_ERROR_HANDLER,
        STEP_COMPLETE => END,
        _ => STEP_ERROR_HANDLER,
    }
    .to_string()
}

/// The routing function shared by every release-pipeline node (§4.J).
///
/// The "skip forward if already completed" override collapses into the same
/// table lookup used for ordinary advancement: idempotence is enforced at
/// the node level (rule 1 of §4.H), so the router only ever needs to ask
/// "what comes after `current_step`", regardless of why it is being asked.
pub fn release_route() -> RouteFn {
    Arc::new(|state: &WorkflowState| {
        let s = match state.as_release() {
            Some(s) => s,
            None => return STEP_COMPLETE.to_string(),
        };
        if s.workflow_paused {
            return s.current_step.clone();
        }
        if s.workflow_complete {
            return STEP_COMPLETE.to_string();
        }
        if !s.error.is_empty() && !s.can_continue {
            return STEP_ERROR_HANDLER.to_string();
        }
        // `error_handler`'s retry branch points `current_step` directly at the
        // step to re-run (not the step that just completed); dispatch there
        // verbatim instead of asking the table for its successor.
        if s.error.is_empty() && !s.error_step.is_empty() && !s.steps_completed.contains(&s.error_step) {
            return s.error_step.clone();
        }
        static_successor(&s.current_step)
    })
}

/// Business logic for one pipeline step: reads the release state, returns
/// either a successful partial update or an error message.
type StepBody = Arc<dyn Fn(ReleaseState, AdapterBundle) -> BoxFuture<'static, Result<PartialFields, String>> + Send + Sync>;

/// Wraps `body` with the shared node-body contract (§4.H): idempotence on
/// resume, step stamping, and error capture into `{error, error_step,
/// current_step:"error", steps_failed}`.
fn step_node(name: &'static str, adapters: AdapterBundle, body: StepBody) -> NodeFn {
    Arc::new(move |state: WorkflowState| {
        let adapters = adapters.clone();
        let body = body.clone();
        Box::pin(async move {
            let release = state
                .as_release()
                .cloned()
                .ok_or_else(|| crate::errors::GraphError::NodeFailed(format!("{name}: not a release state")))?;

            if release.steps_completed.iter().any(|s| s == name) {
                info!(step = name, "step already completed, skipping on resume");
                return Ok(crate::state::Partial::flat(PartialFields::with_messages(vec![
                    Message::ai(format!("Resumed: skipping already-completed step '{name}'")),
                ])));
            }

            let injected = release.inject_fault.as_ref().is_some_and(|f| {
                f.step == name && (f.persistent || !release.steps_failed.iter().any(|s| s == name))
            });

            let result = if injected {
                Err(format!("injected fault in '{name}'"))
            } else {
                body(release, adapters).await
            };

            match result {
                Ok(mut fields) => {
                    fields.current_step = Some(name.to_string());
                    fields.steps_completed_add.push(name.to_string());
                    Ok(crate::state::Partial::flat(fields))
                }
                Err(e) => Ok(crate::state::Partial::flat(PartialFields {
                    current_step: Some(STEP_ERROR.to_string()),
                    error: Some(e),
                    error_step: Some(name.to_string()),
                    can_continue: Some(true),
                    steps_failed_add: vec![name.to_string()],
                    ..Default::default()
                })),
            }
        })
    })
}

#[instrument(skip_all)]
async fn start_body(state: ReleaseState, _adapters: AdapterBundle) -> Result<PartialFields, String> {
    Ok(PartialFields {
        error: Some(String::new()),
        workflow_paused: Some(false),
        messages: vec![Message::ai(format!(
            "Starting release workflow for {}",
            if state.fix_version.is_empty() {
                "unspecified version".to_string()
            } else {
                state.fix_version.clone()
            }
        ))],
        ..Default::default()
    })
}

#[instrument(skip_all)]
async fn jira_collection_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let tickets = match adapters.issue_tracker.tickets_by_fix_version(&state.fix_version).await {
        Ok(tickets) => tickets,
        Err(e) => {
            return Ok(PartialFields {
                jira_tickets: Some(Vec::new()),
                messages: vec![Message::ai(format!(
                    "Issue tracker unavailable ({e}); continuing with an empty ticket set"
                ))],
                ..Default::default()
            });
        }
    };

    let values: Vec<serde_json::Value> = tickets
        .iter()
        .map(|t| serde_json::json!({"key": t.key, "summary": t.summary, "status": t.status}))
        .collect();

    Ok(PartialFields {
        jira_tickets: Some(values),
        messages: vec![Message::ai(format!("Collected {} tickets for {}", tickets.len(), state.fix_version))],
        ..Default::default()
    })
}

fn ticket_ids(state: &ReleaseState) -> Vec<String> {
    state
        .jira_tickets
        .iter()
        .filter_map(|v| v.get("key").and_then(|k| k.as_str()).map(str::to_string))
        .collect()
}

#[instrument(skip_all)]
async fn branch_discovery_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let ticket_ids = ticket_ids(&state);
    let mut found = HashMap::new();
    let mut messages = Vec::new();

    for repo in &state.repositories {
        match adapters.source_forge.find_feature_branches(repo, &ticket_ids).await {
            Ok(branches) => {
                found.insert(repo.clone(), branches);
            }
            Err(e) => {
                let mock: Vec<String> = ticket_ids.iter().map(|id| format!("feature/{id}")).collect();
                messages.push(Message::ai(format!(
                    "Branch discovery failed for {repo} ({e}); substituting mock feature branches"
                )));
                found.insert(repo.clone(), mock);
            }
        }
    }

    Ok(PartialFields {
        feature_branches: Some(found),
        messages,
        ..Default::default()
    })
}

#[instrument(skip_all)]
async fn merge_validation_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let mut unmerged = HashMap::new();
    let mut messages = Vec::new();

    for repo in &state.repositories {
        let mut repo_unmerged = Vec::new();
        if let Some(branches) = state.feature_branches.get(repo) {
            for branch in branches {
                match adapters
                    .source_forge
                    .check_merge_status(repo, branch, &state.sprint_name)
                    .await
                {
                    Ok(crate::adapters::MergeStatus::Merged) => {}
                    Ok(_) => repo_unmerged.push(branch.clone()),
                    Err(e) => {
                        messages.push(Message::ai(format!(
                            "Merge status check failed for {repo}/{branch} ({e}); assuming merged"
                        )));
                    }
                }
            }
        }
        unmerged.insert(repo.clone(), repo_unmerged);
    }

    Ok(PartialFields {
        merge_status: Some(unmerged),
        messages,
        ..Default::default()
    })
}

#[instrument(skip_all)]
async fn sprint_merging_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let mut pull_requests = Vec::new();
    let mut messages = Vec::new();

    for repo in &state.repositories {
        let title = format!("Merge {} into develop", state.sprint_name);
        match adapters
            .source_forge
            .create_pr(repo, &title, "Automated sprint merge", &state.sprint_name, "develop")
            .await
        {
            Ok(pr) => {
                pull_requests.push(pr.url.clone());
                match adapters.source_forge.merge_branches(repo, &state.sprint_name, "develop").await {
                    Ok(_) => {}
                    Err(e) => messages.push(Message::ai(format!("Merge of {repo} sprint branch failed ({e}); PR left open"))),
                }
            }
            Err(e) => messages.push(Message::ai(format!("Failed to open sprint-merge PR for {repo} ({e})"))),
        }
    }

    Ok(PartialFields {
        pull_requests: Some(pull_requests),
        messages,
        ..Default::default()
    })
}

#[instrument(skip_all)]
async fn release_creation_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let mut existing_tags = Vec::new();
    for repo in &state.repositories {
        if let Ok(tags) = adapters.source_forge.tags(repo).await {
            existing_tags.extend(tags.into_iter().map(|t| t.name));
        }
    }
    let computed_version = version::next_release_version(&state.fix_version, &existing_tags);

    let mut release_branches = Vec::new();
    let mut messages = Vec::new();
    let branch_name = format!("release/{computed_version}");

    for repo in &state.repositories {
        let existing = adapters.source_forge.branches(repo).await.unwrap_or_default();
        if !existing.contains(&branch_name) {
            if let Err(e) = adapters.source_forge.create_branch(repo, &branch_name, "develop").await {
                messages.push(Message::ai(format!("Failed to create {branch_name} for {repo} ({e})")));
                continue;
            }
        }
        release_branches.push(format!("{repo}:{branch_name}"));
    }

    Ok(PartialFields {
        release_branches: Some(release_branches),
        messages,
        ..Default::default()
    })
}

#[instrument(skip_all)]
async fn pr_generation_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let mut pull_requests = Vec::new();
    let mut messages = Vec::new();

    for release_branch in &state.release_branches {
        let (repo, branch) = match release_branch.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        match adapters
            .source_forge
            .create_pr(repo, &format!("Release {branch}"), "Automated release PR", branch, "master")
            .await
        {
            Ok(pr) => pull_requests.push(pr.url),
            Err(e) => messages.push(Message::ai(format!("Failed to create release PR for {repo} ({e})"))),
        }
    }

    Ok(PartialFields {
        pull_requests: Some(pull_requests),
        messages,
        ..Default::default()
    })
}

#[instrument(skip_all)]
async fn release_tagging_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let tickets: Vec<String> = state
        .jira_tickets
        .iter()
        .filter_map(|v| v.get("key").and_then(|k| k.as_str()).map(str::to_string))
        .collect();
    let mut messages = Vec::new();

    for release_branch in &state.release_branches {
        let (repo, branch) = match release_branch.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        let version = branch.trim_start_matches("release/");
        let tag_message = format!("Release {version} — includes: {}", tickets.join(", "));
        if let Err(e) = adapters.source_forge.create_tag(repo, version, branch, &tag_message).await {
            messages.push(Message::ai(format!("Failed to tag {repo}/{branch} ({e})")));
        }
    }

    Ok(PartialFields {
        messages,
        ..Default::default()
    })
}

#[instrument(skip_all)]
async fn rollback_preparation_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let mut rollback_branches = Vec::new();
    let mut messages = Vec::new();

    for release_branch in &state.release_branches {
        let (repo, branch) = match release_branch.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        let version = branch.trim_start_matches("release/").trim_start_matches('v');
        let rollback_name = format!("rollback/v-{version}");
        if let Err(e) = adapters.source_forge.create_branch(repo, &rollback_name, "master").await {
            messages.push(Message::ai(format!("Failed to create {rollback_name} for {repo} ({e})")));
            continue;
        }
        rollback_branches.push(format!("{repo}:{rollback_name}"));
    }

    Ok(PartialFields {
        rollback_branches: Some(rollback_branches),
        messages,
        ..Default::default()
    })
}

#[instrument(skip_all)]
async fn documentation_body(state: ReleaseState, adapters: AdapterBundle) -> Result<PartialFields, String> {
    let version = state
        .release_branches
        .first()
        .and_then(|rb| rb.split_once(':').map(|(_, b)| b.trim_start_matches("release/").to_string()))
        .unwrap_or_else(|| state.fix_version.clone());

    let tickets: Vec<crate::adapters::Ticket> = state
        .jira_tickets
        .iter()
        .filter_map(|v| {
            Some(crate::adapters::Ticket {
                key: v.get("key")?.as_str()?.to_string(),
                summary: v.get("summary").and_then(|s| s.as_str()).unwrap_or_default().to_string(),
                status: v.get("status").and_then(|s| s.as_str()).unwrap_or_default().to_string(),
                fix_version: state.fix_version.clone(),
            })
        })
        .collect();

    let html = crate::html_doc::render_release_page(&version, &state.sprint_name, &tickets, &state.repositories);
    let title = crate::html_doc::page_title(&version);

    let page = if let Some(existing) = adapters.wiki.search_pages("RELEASES", Some(&title)).await.unwrap_or_default().into_iter().next() {
        adapters.wiki.update_page(&existing.id, &title, &html, existing.version).await
    } else {
        adapters.wiki.create_page("RELEASES", &title, &html, None).await
    };

    match page {
        Ok(page) => Ok(PartialFields {
            confluence_url: Some(format!("https://wiki.local/pages/{}", page.id)),
            messages: vec![Message::ai(format!("Published release documentation: {title}"))],
            ..Default::default()
        }),
        Err(e) => Ok(PartialFields {
            confluence_url: Some(String::new()),
            messages: vec![Message::ai(format!("Failed to publish release documentation ({e})"))],
            ..Default::default()
        }),
    }
}

/// `error_handler`: auto-retries up to three times, then marks the
/// workflow fatally failed (§4.H, §4.J).
fn error_handler_node() -> NodeFn {
    Arc::new(|state: WorkflowState| {
        Box::pin(async move {
            let s = state
                .as_release()
                .ok_or_else(|| crate::errors::GraphError::NodeFailed("error_handler: not a release state".into()))?;

            if s.retry_count < MAX_AUTO_RETRIES {
                let target = if s.error_step.is_empty() { STEP_START.to_string() } else { s.error_step.clone() };
                Ok(crate::state::Partial::flat(PartialFields {
                    error: Some(String::new()),
                    retry_count: Some(s.retry_count + 1),
                    current_step: Some(target.clone()),
                    messages: vec![Message::ai(format!(
                        "Auto-recovering from error, retrying step '{target}' (attempt {})",
                        s.retry_count + 1
                    ))],
                    ..Default::default()
                }))
            } else {
                Ok(crate::state::Partial::flat(PartialFields {
                    can_continue: Some(false),
                    workflow_complete: Some(true),
                    messages: vec![Message::ai("Workflow failed after repeated errors; giving up".to_string())],
                    ..Default::default()
                }))
            }
        })
    })
}

/// `complete`: writes the final summary message and marks the workflow done.
fn complete_node() -> NodeFn {
    Arc::new(|state: WorkflowState| {
        Box::pin(async move {
            let s = state
                .as_release()
                .ok_or_else(|| crate::errors::GraphError::NodeFailed("complete: not a release state".into()))?;
            let summary = format!(
                "Release workflow complete: {} repositories, {} release branches, {} rollback branches",
                s.repositories.len(),
                s.release_branches.len(),
                s.rollback_branches.len()
            );
            Ok(crate::state::Partial::flat(PartialFields {
                workflow_complete: Some(true),
                messages: vec![Message::ai(summary)],
                ..Default::default()
            }))
        })
    })
}

/// Builds the compiled release-pipeline graph (§4.C, §4.H).
pub fn build_release_graph(adapters: AdapterBundle) -> crate::errors::GraphResult<Graph> {
    let route = release_route();
    let mut targets = HashMap::new();
    for step in PIPELINE_STEPS {
        targets.insert(step.to_string(), step.to_string());
    }
    targets.insert(STEP_ERROR.to_string(), STEP_ERROR_HANDLER.to_string());
    targets.insert(STEP_ERROR_HANDLER.to_string(), STEP_ERROR_HANDLER.to_string());
    targets.insert(STEP_COMPLETE.to_string(), STEP_COMPLETE.to_string());

    let mut builder = GraphBuilder::new()
        .add_node(STEP_START, step_node(STEP_START, adapters.clone(), Arc::new(|s, a| Box::pin(start_body(s, a)))))
        .add_node(
            STEP_JIRA_COLLECTION,
            step_node(STEP_JIRA_COLLECTION, adapters.clone(), Arc::new(|s, a| Box::pin(jira_collection_body(s, a)))),
        )
        .add_node(
            STEP_BRANCH_DISCOVERY,
            step_node(STEP_BRANCH_DISCOVERY, adapters.clone(), Arc::new(|s, a| Box::pin(branch_discovery_body(s, a)))),
        )
        .add_node(
            STEP_MERGE_VALIDATION,
            step_node(STEP_MERGE_VALIDATION, adapters.clone(), Arc::new(|s, a| Box::pin(merge_validation_body(s, a)))),
        )
        .add_node(
            STEP_SPRINT_MERGING,
            step_node(STEP_SPRINT_MERGING, adapters.clone(), Arc::new(|s, a| Box::pin(sprint_merging_body(s, a)))),
        )
        .add_node(
            STEP_RELEASE_CREATION,
            step_node(STEP_RELEASE_CREATION, adapters.clone(), Arc::new(|s, a| Box::pin(release_creation_body(s, a)))),
        )
        .add_node(
            STEP_PR_GENERATION,
            step_node(STEP_PR_GENERATION, adapters.clone(), Arc::new(|s, a| Box::pin(pr_generation_body(s, a)))),
        )
        .add_node(
            STEP_RELEASE_TAGGING,
            step_node(STEP_RELEASE_TAGGING, adapters.clone(), Arc::new(|s, a| Box::pin(release_tagging_body(s, a)))),
        )
        .add_node(
            STEP_ROLLBACK_PREPARATION,
            step_node(
                STEP_ROLLBACK_PREPARATION,
                adapters.clone(),
                Arc::new(|s, a| Box::pin(rollback_preparation_body(s, a))),
            ),
        )
        .add_node(
            STEP_DOCUMENTATION,
            step_node(STEP_DOCUMENTATION, adapters.clone(), Arc::new(|s, a| Box::pin(documentation_body(s, a)))),
        )
        .add_node(STEP_ERROR_HANDLER, error_handler_node())
        .add_node(STEP_COMPLETE, complete_node())
        .set_entry(STEP_START);

    for step in PIPELINE_STEPS {
        builder = builder.add_conditional_edge(*step, route.clone(), targets.clone());
    }
    builder = builder.add_conditional_edge(STEP_ERROR_HANDLER, route.clone(), targets.clone());
    builder = builder.add_conditional_edge(STEP_COMPLETE, route, targets);

    builder.build()
}

/// Builds the initial release state from an HTTP `/chat` request (§6).
pub fn initial_release_state(
    workflow_id: impl Into<String>,
    repositories: Vec<String>,
    fix_version: String,
    sprint_name: String,
    release_type: String,
) -> ReleaseState {
    let mut state = ReleaseState::new(workflow_id);
    state.repositories = repositories;
    state.fix_version = fix_version;
    state.sprint_name = sprint_name;
    state.release_type = release_type;
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MergeStatus, MockSourceForge, PullRequest, Repository, SourceForge, TagInfo};
    use crate::errors::AdapterResult;
    use crate::runtime::astream;
    use async_trait::async_trait;
    use futures::StreamExt;
    use tokio::sync::watch;

    /// Delegates to [`MockSourceForge`] except `find_feature_branches` for
    /// one named repository, which always errors — for exercising the
    /// per-repository mock-fallback path (§4.H rule 3).
    struct FlakySourceForge {
        inner: MockSourceForge,
        failing_repo: &'static str,
    }

    #[async_trait]
    impl SourceForge for FlakySourceForge {
        async fn repository(&self, name: &str) -> AdapterResult<Repository> {
            self.inner.repository(name).await
        }
        async fn branches(&self, repo: &str) -> AdapterResult<Vec<String>> {
            self.inner.branches(repo).await
        }
        async fn find_feature_branches(&self, repo: &str, ticket_ids: &[String]) -> AdapterResult<Vec<String>> {
            if repo == self.failing_repo {
                return Err(crate::errors::AdapterError::RequestFailed(format!("{repo} is unreachable")));
            }
            self.inner.find_feature_branches(repo, ticket_ids).await
        }
        async fn check_merge_status(&self, repo: &str, src: &str, dst: &str) -> AdapterResult<MergeStatus> {
            self.inner.check_merge_status(repo, src, dst).await
        }
        async fn create_pr(&self, repo: &str, title: &str, body: &str, head: &str, base: &str) -> AdapterResult<PullRequest> {
            self.inner.create_pr(repo, title, body, head, base).await
        }
        async fn merge_branches(&self, repo: &str, src: &str, dst: &str) -> AdapterResult<MergeStatus> {
            self.inner.merge_branches(repo, src, dst).await
        }
        async fn create_branch(&self, repo: &str, name: &str, source: &str) -> AdapterResult<()> {
            self.inner.create_branch(repo, name, source).await
        }
        async fn create_tag(&self, repo: &str, name: &str, sha: &str, message: &str) -> AdapterResult<TagInfo> {
            self.inner.create_tag(repo, name, sha, message).await
        }
        async fn tags(&self, repo: &str) -> AdapterResult<Vec<TagInfo>> {
            self.inner.tags(repo).await
        }
        async fn validate(&self) -> AdapterResult<bool> {
            self.inner.validate().await
        }
    }

    #[tokio::test]
    async fn per_repo_adapter_failure_falls_back_to_mock_branches_for_that_repo() {
        let mut adapters = AdapterBundle::mock();
        adapters.source_forge = std::sync::Arc::new(FlakySourceForge {
            inner: MockSourceForge::new(),
            failing_repo: "frontend-app",
        });
        let graph = build_release_graph(adapters).unwrap();
        let state = WorkflowState::Release(initial_release_state(
            "wf-partial-failure",
            vec!["api-service".to_string(), "frontend-app".to_string()],
            "v2.0.0".to_string(),
            "sprint-2024-01".to_string(),
            "release".to_string(),
        ));

        let (_tx, rx) = watch::channel(false);
        let mut stream = Box::pin(astream(graph, state, None, rx));
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event.unwrap().accumulated);
        }
        let final_state = last.unwrap();
        assert!(final_state.workflow_complete());
        let release = final_state.as_release().unwrap();
        assert_eq!(
            release.feature_branches["api-service"],
            vec!["feature/PROJ-101".to_string(), "feature/PROJ-102".to_string()]
        );
        assert_eq!(
            release.feature_branches["frontend-app"],
            vec!["feature/PROJ-101".to_string(), "feature/PROJ-102".to_string()]
        );
        assert!(release
            .messages
            .iter()
            .any(|m| m.content().contains("frontend-app") && m.content().contains("substituting mock feature branches")));
        assert!(!release.messages.iter().any(|m| m.content().contains("Branch discovery failed for api-service")));
    }

    #[tokio::test]
    async fn happy_path_release_reaches_completed_with_all_steps() {
        let adapters = AdapterBundle::mock();
        let graph = build_release_graph(adapters).unwrap();
        let state = WorkflowState::Release(initial_release_state(
            "wf-1",
            vec!["api-service".to_string(), "frontend-app".to_string()],
            "v2.0.0".to_string(),
            "sprint-2024-01".to_string(),
            "release".to_string(),
        ));

        let (_tx, rx) = watch::channel(false);
        let mut stream = Box::pin(astream(graph, state, None, rx));
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event.unwrap().accumulated);
        }
        let final_state = last.unwrap();
        assert!(final_state.workflow_complete());
        let release = final_state.as_release().unwrap();
        for step in PIPELINE_STEPS {
            assert!(release.steps_completed.contains(&step.to_string()), "missing step {step}");
        }
        assert_eq!(
            release.release_branches,
            vec!["api-service:release/v2.0.0".to_string(), "frontend-app:release/v2.0.0".to_string()]
        );
        assert_eq!(
            release.rollback_branches,
            vec!["api-service:rollback/v-2.0.0".to_string(), "frontend-app:rollback/v-2.0.0".to_string()]
        );
        assert!(!release.confluence_url.is_empty());
        assert!(release.error.is_empty());
    }

    #[tokio::test]
    async fn node_exception_triggers_error_handler_with_auto_recovery() {
        let adapters = AdapterBundle::mock();
        let graph = build_release_graph(adapters).unwrap();
        let mut initial = initial_release_state(
            "wf-fault-once",
            vec!["api-service".to_string()],
            "v2.1.0".to_string(),
            "sprint-2024-02".to_string(),
            "release".to_string(),
        );
        initial.inject_fault = Some(crate::state::FaultInjection {
            step: STEP_MERGE_VALIDATION.to_string(),
            persistent: false,
        });
        let state = WorkflowState::Release(initial);

        let (_tx, rx) = watch::channel(false);
        let mut stream = Box::pin(astream(graph, state, None, rx));
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event.unwrap().accumulated);
        }
        let final_state = last.unwrap();
        assert!(final_state.workflow_complete());
        let release = final_state.as_release().unwrap();
        assert_eq!(release.retry_count, 1);
        assert_eq!(release.steps_failed, vec![STEP_MERGE_VALIDATION.to_string()]);
        assert!(release.error.is_empty());
    }

    #[tokio::test]
    async fn persistent_node_exception_is_fatal_after_four_errors() {
        let adapters = AdapterBundle::mock();
        let graph = build_release_graph(adapters).unwrap();
        let mut initial = initial_release_state(
            "wf-fault-persistent",
            vec!["api-service".to_string()],
            "v2.1.0".to_string(),
            "sprint-2024-02".to_string(),
            "release".to_string(),
        );
        initial.inject_fault = Some(crate::state::FaultInjection {
            step: STEP_MERGE_VALIDATION.to_string(),
            persistent: true,
        });
        let state = WorkflowState::Release(initial);

        let (_tx, rx) = watch::channel(false);
        let mut stream = Box::pin(astream(graph, state, None, rx));
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event.unwrap().accumulated);
        }
        let final_state = last.unwrap();
        let release = final_state.as_release().unwrap();
        assert_eq!(release.retry_count, MAX_AUTO_RETRIES);
        assert!(!release.can_continue);
        assert!(final_state.workflow_complete());
        assert_eq!(crate::runtime::terminal_status(&final_state), Some("failed"));
    }

    #[tokio::test]
    async fn empty_repositories_still_completes() {
        let adapters = AdapterBundle::mock();
        let graph = build_release_graph(adapters).unwrap();
        let state = WorkflowState::Release(initial_release_state(
            "wf-empty",
            vec![],
            "v1.0.0".to_string(),
            "sprint-x".to_string(),
            "release".to_string(),
        ));

        let (_tx, rx) = watch::channel(false);
        let mut stream = Box::pin(astream(graph, state, None, rx));
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event.unwrap().accumulated);
        }
        let final_state = last.unwrap();
        assert!(final_state.workflow_complete());
        assert!(final_state.as_release().unwrap().release_branches.is_empty());
    }
}
