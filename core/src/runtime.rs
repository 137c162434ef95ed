//! Graph runtime: drives a compiled [`Graph`](crate::graph::Graph) node by
//! node, merging partial updates and emitting one event per completion (§4.D).
use crate::errors::{GraphError, GraphResult};
use crate::graph::{Graph, END};
use crate::state::{Partial, PartialFields, WorkflowState};
use async_stream::try_stream;
use futures::Stream;
use tokio::sync::watch;
use tracing::{debug, info_span, Instrument};

/// One step of the driven graph: the node that just ran and the merged
/// accumulated state after applying its partial.
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub node: String,
    pub accumulated: WorkflowState,
}

/// Applies `partial` onto `accumulated` per the flat/channel merge rule (§4.D step 3).
pub fn merge(accumulated: &mut WorkflowState, partial: Partial) {
    match partial {
        Partial::Flat(fields) => apply_fields(accumulated, fields),
        Partial::Channels(channels) => {
            let mut names: Vec<_> = channels.into_iter().collect();
            names.sort_by(|a, b| a.0.cmp(&b.0));
            for (_channel, fields) in names {
                apply_fields(accumulated, fields);
            }
        }
    }
}

fn apply_fields(accumulated: &mut WorkflowState, fields: PartialFields) {
    for msg in fields.messages {
        let messages = match accumulated {
            WorkflowState::Release(s) => &mut s.messages,
            WorkflowState::Qa(s) => &mut s.messages,
        };
        if messages.last() != Some(&msg) {
            messages.push(msg);
        }
    }
    if let Some(step) = fields.current_step {
        accumulated.set_current_step(step);
    }
    if let Some(complete) = fields.workflow_complete {
        match accumulated {
            WorkflowState::Release(s) => s.workflow_complete = complete,
            WorkflowState::Qa(s) => s.workflow_complete = complete,
        }
    }
    if let Some(paused) = fields.workflow_paused {
        accumulated.set_workflow_paused(paused);
    }

    if let WorkflowState::Release(s) = accumulated {
        if let Some(tickets) = fields.jira_tickets {
            s.jira_tickets = tickets;
        }
        if let Some(branches) = fields.feature_branches {
            for (repo, found) in branches {
                s.feature_branches.insert(repo, found);
            }
        }
        if let Some(status) = fields.merge_status {
            for (repo, val) in status {
                s.merge_status.insert(repo, val);
            }
        }
        if let Some(prs) = fields.pull_requests {
            s.pull_requests.extend(prs);
        }
        if let Some(branches) = fields.release_branches {
            s.release_branches.extend(branches);
        }
        if let Some(branches) = fields.rollback_branches {
            s.rollback_branches.extend(branches);
        }
        if let Some(url) = fields.confluence_url {
            s.confluence_url = url;
        }
        if let Some(error) = fields.error {
            s.error = error;
        }
        if let Some(error_step) = fields.error_step {
            s.error_step = error_step;
        }
        if let Some(retry) = fields.retry_count {
            s.retry_count = retry;
        }
        if let Some(can_continue) = fields.can_continue {
            s.can_continue = can_continue;
        }
        for step in fields.steps_completed_add {
            if !s.steps_completed.contains(&step) {
                s.steps_completed.push(step);
            }
        }
        for step in fields.steps_failed_add {
            s.steps_failed.push(step);
        }
    }
}

/// Detects the channel-workflow-completion heuristic: for a QA state, the
/// last message is a non-tool-calling AI message. Release states set
/// `workflow_complete` explicitly instead, since they emit plain AI
/// messages at intermediate steps too.
pub fn is_channel_workflow_complete(state: &WorkflowState) -> bool {
    if state.as_qa().is_none() {
        return false;
    }
    match state.messages().last() {
        Some(m) if m.is_ai() => !m.has_tool_calls(),
        _ => false,
    }
}

/// Resolves the terminal status implied by `accumulated` (§4.D step 6).
/// An unrecoverable error takes priority over `workflow_complete`: the
/// error_handler's fatal branch (§4.H `error_handler`, fourth entry) sets
/// both flags at once to signal "done, but failed", and that must resolve
/// to `"failed"` rather than `"completed"`. Returns `None` if the workflow
/// is not (yet) terminal.
pub fn terminal_status(accumulated: &WorkflowState) -> Option<&'static str> {
    if accumulated.error_without_recovery() && !accumulated.workflow_paused() {
        return Some("failed");
    }
    if accumulated.workflow_complete() {
        return Some("completed");
    }
    if is_channel_workflow_complete(accumulated) {
        return Some("completed");
    }
    None
}

/// Drives `graph` from `start_node` (defaulting to the graph's entry) over
/// `initial_state`, yielding one [`RuntimeEvent`] per node completion.
///
/// Cancellation is cooperative: the loop checks `cancel` only between node
/// completions (§4.D Cancellation), never interrupting a running node.
pub fn astream(
    graph: Graph,
    initial_state: WorkflowState,
    start_node: Option<String>,
    cancel: watch::Receiver<bool>,
) -> impl Stream<Item = GraphResult<RuntimeEvent>> {
    try_stream! {
        let mut accumulated = initial_state;
        let mut current = start_node.unwrap_or_else(|| graph.entry().to_string());

        loop {
            if *cancel.borrow() {
                debug!(node = %current, "runtime observed cooperative cancellation before dispatch");
                break;
            }

            let node_fn = graph
                .node(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?
                .clone();

            let span = info_span!("graph_node", node = %current);
            let partial = node_fn(accumulated.clone()).instrument(span).await?;
            merge(&mut accumulated, partial);

            yield RuntimeEvent {
                node: current.clone(),
                accumulated: accumulated.clone(),
            };

            if terminal_status(&accumulated).is_some() {
                break;
            }

            let next = graph.route(&current, &accumulated)?;
            if next == END {
                break;
            }
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::message::Message;
    use crate::state::QaState;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn node_ai_reply(content: &'static str) -> crate::graph::NodeFn {
        Arc::new(move |_state| {
            Box::pin(async move { Ok(Partial::flat(PartialFields::with_messages(vec![Message::ai(content)]))) })
        })
    }

    #[tokio::test]
    async fn drives_two_node_graph_to_natural_completion() {
        let graph = GraphBuilder::new()
            .add_node("a", node_ai_reply("hello"))
            .set_entry("a")
            .build()
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let initial = WorkflowState::Qa(QaState::new("wf-1"));
        let mut stream = Box::pin(astream(graph, initial, None, rx));
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.node, "a");
        assert_eq!(event.accumulated.messages().len(), 1);
    }

    #[test]
    fn merge_appends_messages_without_duplication() {
        let mut state = WorkflowState::Qa(QaState::new("wf-1"));
        merge(&mut state, Partial::flat(PartialFields::with_messages(vec![Message::ai("hi")])));
        merge(&mut state, Partial::flat(PartialFields::with_messages(vec![Message::ai("hi")])));
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn merge_applies_channel_shaped_partial() {
        let mut state = WorkflowState::Qa(QaState::new("wf-1"));
        let mut channels = HashMap::new();
        channels.insert(
            "chatbot".to_string(),
            PartialFields::with_messages(vec![Message::ai("first")]),
        );
        merge(&mut state, Partial::Channels(channels));
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].content(), "first");
    }

    #[test]
    fn channel_completion_heuristic_requires_non_tool_ai_message() {
        let mut state = WorkflowState::Qa(QaState::new("wf-1"));
        state.as_qa();
        if let WorkflowState::Qa(s) = &mut state {
            s.messages.push(Message::ai("done"));
        }
        assert!(is_channel_workflow_complete(&state));
    }
}
