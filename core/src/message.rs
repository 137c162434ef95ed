//! Conversation messages: the append-only log carried by every workflow state.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tool call a model requested, carried in an `AI` message's sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Sidecar attributes attached to a message, notably `tool_calls` on AI messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AdditionalKwargs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// `Tool` messages carry the id of the call they answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Extra fields not otherwise modeled, kept for round-trip fidelity.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single entry in a workflow's append-only conversation log.
///
/// Unknown `type` tags round-trip through `Opaque` rather than being dropped,
/// mirroring the source system's tolerant message deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "human")]
    Human {
        content: String,
        #[serde(default)]
        additional_kwargs: AdditionalKwargs,
    },
    #[serde(rename = "ai")]
    AI {
        content: String,
        #[serde(default)]
        additional_kwargs: AdditionalKwargs,
    },
    #[serde(rename = "tool")]
    Tool {
        content: String,
        #[serde(default)]
        additional_kwargs: AdditionalKwargs,
    },
    /// Preserves an unrecognized tag verbatim instead of failing to parse.
    #[serde(other)]
    Opaque,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
            additional_kwargs: AdditionalKwargs::default(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Message::AI {
            content: content.into(),
            additional_kwargs: AdditionalKwargs::default(),
        }
    }

    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Message::AI {
            content: content.into(),
            additional_kwargs: AdditionalKwargs {
                tool_calls,
                ..Default::default()
            },
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            additional_kwargs: AdditionalKwargs {
                tool_call_id: Some(tool_call_id.into()),
                ..Default::default()
            },
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::Human { content, .. } | Message::AI { content, .. } | Message::Tool { content, .. } => content,
            Message::Opaque => "",
        }
    }

    /// Pending tool calls carried by this message, if any (only `AI` carries them).
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Message::AI { additional_kwargs, .. } => &additional_kwargs.tool_calls,
            _ => &[],
        }
    }

    pub fn is_ai(&self) -> bool {
        matches!(self, Message::AI { .. })
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_variants() {
        let msgs = vec![
            Message::human("hello"),
            Message::ai("hi there"),
            Message::tool("42", "call-1"),
        ];
        for m in msgs {
            let json = serde_json::to_string(&m).unwrap();
            let back: Message = serde_json::from_str(&json).unwrap();
            assert_eq!(m, back);
        }
    }

    #[test]
    fn unknown_tag_round_trips_as_opaque() {
        let json = r#"{"type":"system","content":"ignored"}"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m, Message::Opaque);
    }

    #[test]
    fn ai_message_carries_tool_calls() {
        let m = Message::ai_with_tool_calls(
            "",
            vec![ToolCallRequest {
                id: "1".into(),
                name: "get_branches".into(),
                arguments: serde_json::json!({"repo": "frontend-app"}),
            }],
        );
        assert!(m.has_tool_calls());
        assert!(m.is_ai());
    }
}
