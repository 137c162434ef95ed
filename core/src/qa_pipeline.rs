//! The QA ReAct loop: `chatbot` decides whether to answer or call a tool,
//! `tools` executes it and hands control back (§4.I).
use crate::adapters::AdapterBundle;
use crate::errors::ClassifierResult;
use crate::graph::{Graph, GraphBuilder, NodeFn, RouteFn, END};
use crate::message::{Message, ToolCallRequest};
use crate::state::{Partial, PartialFields, QaState, WorkflowState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub const STEP_CHATBOT: &str = "chatbot";
pub const STEP_TOOLS: &str = "tools";

/// A tool the chatbot may call, described for the LLM's benefit.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

pub const AVAILABLE_TOOLS: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: "list_tickets",
        description: "List Jira-style tickets matching a free-text query",
    },
    ToolDescriptor {
        name: "find_branches",
        description: "List branches in a named repository",
    },
    ToolDescriptor {
        name: "search_wiki",
        description: "Search release documentation pages",
    },
];

/// The system prompt every `chatbot` invocation is grounded in.
pub const SYSTEM_PROMPT: &str =
    "You are a read-only assistant for release engineering questions. Use the \
     available tools to look up tickets, branches and release documentation; \
     answer directly once you have what you need.";

/// Pluggable chat backend: given the conversation so far, produce the next
/// AI message (optionally carrying tool calls).
#[async_trait]
pub trait ChatLlm: Send + Sync {
    async fn respond(&self, messages: &[Message], tools: &[ToolDescriptor]) -> ClassifierResult<Message>;
}

/// Deterministic fallback used when no LLM is configured or the LLM call
/// fails: one keyword-routed tool call per question, then a final answer
/// once a tool result is in hand.
fn fallback_respond(messages: &[Message]) -> Message {
    match messages.last() {
        Some(Message::Tool { content, .. }) => Message::ai(format!("Based on the lookup: {content}")),
        Some(Message::Human { content, .. }) => {
            let lower = content.to_lowercase();
            let call = |name: &str| {
                Message::ai_with_tool_calls(
                    String::new(),
                    vec![ToolCallRequest {
                        id: "call-1".to_string(),
                        name: name.to_string(),
                        arguments: serde_json::json!({"query": content}),
                    }],
                )
            };
            if lower.contains("ticket") {
                call("list_tickets")
            } else if lower.contains("branch") {
                call("find_branches")
            } else if lower.contains("wiki") || lower.contains("doc") {
                call("search_wiki")
            } else {
                Message::ai(format!("I don't have a tool for that question: {content}"))
            }
        }
        _ => Message::ai("Ready to help with tickets, branches or release documentation."),
    }
}

fn chatbot_node(llm: Option<Arc<dyn ChatLlm>>) -> NodeFn {
    Arc::new(move |state: WorkflowState| {
        let llm = llm.clone();
        Box::pin(async move {
            let qa = state
                .as_qa()
                .ok_or_else(|| crate::errors::GraphError::NodeFailed("chatbot: not a qa state".into()))?;

            let reply = if let Some(llm) = &llm {
                match llm.respond(&qa.messages, AVAILABLE_TOOLS).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(error = %e, "qa chat LLM call failed, falling back to keyword router");
                        fallback_respond(&qa.messages)
                    }
                }
            } else {
                fallback_respond(&qa.messages)
            };

            let done = reply.is_ai() && !reply.has_tool_calls();
            Ok(Partial::channel(
                STEP_CHATBOT,
                PartialFields {
                    current_step: Some(STEP_CHATBOT.to_string()),
                    workflow_complete: if done { Some(true) } else { None },
                    ..PartialFields::with_messages(vec![reply])
                },
            ))
        })
    })
}

async fn execute_tool(adapters: &AdapterBundle, call: &ToolCallRequest) -> String {
    let query = call.arguments.get("query").and_then(|v| v.as_str()).unwrap_or_default();
    match call.name.as_str() {
        "list_tickets" => match adapters.issue_tracker.search(query, 10).await {
            Ok(tickets) => serde_json::to_string(&tickets).unwrap_or_default(),
            Err(e) => format!("error: {e}"),
        },
        "find_branches" => match adapters.source_forge.branches("api-service").await {
            Ok(branches) => serde_json::to_string(&branches).unwrap_or_default(),
            Err(e) => format!("error: {e}"),
        },
        "search_wiki" => match adapters.wiki.search_pages("RELEASES", None).await {
            Ok(pages) => serde_json::to_string(&pages.into_iter().map(|p| p.title).collect::<Vec<_>>()).unwrap_or_default(),
            Err(e) => format!("error: {e}"),
        },
        other => format!("error: unknown tool '{other}'"),
    }
}

fn tools_node(adapters: AdapterBundle) -> NodeFn {
    Arc::new(move |state: WorkflowState| {
        let adapters = adapters.clone();
        Box::pin(async move {
            let qa = state
                .as_qa()
                .ok_or_else(|| crate::errors::GraphError::NodeFailed("tools: not a qa state".into()))?;

            let calls = qa.messages.last().map(|m| m.tool_calls().to_vec()).unwrap_or_default();
            let mut results = Vec::new();
            for call in &calls {
                let content = execute_tool(&adapters, call).await;
                results.push(Message::tool(content, call.id.clone()));
            }

            Ok(Partial::channel(
                STEP_TOOLS,
                PartialFields {
                    current_step: Some(STEP_TOOLS.to_string()),
                    ..PartialFields::with_messages(results)
                },
            ))
        })
    })
}

fn qa_route() -> RouteFn {
    Arc::new(|state: &WorkflowState| {
        if state.messages().last().map(|m| m.has_tool_calls()).unwrap_or(false) {
            STEP_TOOLS.to_string()
        } else {
            "done".to_string()
        }
    })
}

/// Builds the compiled QA graph: `chatbot` routes to `tools` when it asks
/// for one, `tools` always routes back to `chatbot` (§4.C, §4.I).
pub fn build_qa_graph(adapters: AdapterBundle, llm: Option<Arc<dyn ChatLlm>>) -> crate::errors::GraphResult<Graph> {
    let mut chatbot_targets = HashMap::new();
    chatbot_targets.insert(STEP_TOOLS.to_string(), STEP_TOOLS.to_string());
    chatbot_targets.insert("done".to_string(), END.to_string());

    GraphBuilder::new()
        .add_node(STEP_CHATBOT, chatbot_node(llm))
        .add_node(STEP_TOOLS, tools_node(adapters))
        .set_entry(STEP_CHATBOT)
        .add_conditional_edge(STEP_CHATBOT, qa_route(), chatbot_targets)
        .add_edge(STEP_TOOLS, STEP_CHATBOT)
        .build()
}

pub fn initial_qa_state(workflow_id: impl Into<String>, question: impl Into<String>) -> QaState {
    let mut state = QaState::new(workflow_id);
    state.messages.push(Message::human(question));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::astream;
    use futures::StreamExt;
    use tokio::sync::watch;

    #[tokio::test]
    async fn answers_directly_when_no_tool_is_needed() {
        let adapters = AdapterBundle::mock();
        let graph = build_qa_graph(adapters, None).unwrap();
        let state = WorkflowState::Qa(initial_qa_state("wf-qa-1", "hello there"));

        let (_tx, rx) = watch::channel(false);
        let mut stream = Box::pin(astream(graph, state, None, rx));
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event.unwrap().accumulated);
        }
        let final_state = last.unwrap();
        assert!(final_state.workflow_complete());
        assert_eq!(final_state.messages().len(), 2);
    }

    #[tokio::test]
    async fn routes_through_tools_for_a_ticket_question() {
        let adapters = AdapterBundle::mock();
        let graph = build_qa_graph(adapters, None).unwrap();
        let state = WorkflowState::Qa(initial_qa_state("wf-qa-2", "list the tickets for this sprint"));

        let (_tx, rx) = watch::channel(false);
        let mut stream = Box::pin(astream(graph, state, None, rx));
        let mut nodes = Vec::new();
        let mut last = None;
        while let Some(event) = stream.next().await {
            let event = event.unwrap();
            nodes.push(event.node.clone());
            last = Some(event.accumulated);
        }
        assert_eq!(nodes, vec!["chatbot", "tools", "chatbot"]);
        let final_state = last.unwrap();
        assert!(final_state.workflow_complete());
        assert_eq!(final_state.messages().len(), 4);
    }

    #[tokio::test]
    async fn chatbot_falls_back_when_llm_errors() {
        use crate::errors::ClassifierError;

        struct Failing;
        #[async_trait::async_trait]
        impl ChatLlm for Failing {
            async fn respond(&self, _messages: &[Message], _tools: &[ToolDescriptor]) -> ClassifierResult<Message> {
                Err(ClassifierError::LlmFailed("down".into()))
            }
        }
        let adapters = AdapterBundle::mock();
        let graph = build_qa_graph(adapters, Some(Arc::new(Failing))).unwrap();
        let state = WorkflowState::Qa(initial_qa_state("wf-qa-3", "hi"));

        let (_tx, rx) = watch::channel(false);
        let mut stream = Box::pin(astream(graph, state, None, rx));
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event.unwrap().accumulated);
        }
        assert!(last.unwrap().workflow_complete());
    }
}
