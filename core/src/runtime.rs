use anyhow::Result;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::pipeline::AgentSpec;

// 1. Events
// What the runtime reports back while it works. An event carries text, a
// tool call, or (rarely) both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentEvent {
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl AgentEvent {
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: Some(text.into()),
            tool_call: None,
        }
    }

    pub fn tool_call(author: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            author: author.into(),
            text: None,
            tool_call: Some(ToolCall {
                name: name.into(),
                arguments,
            }),
        }
    }
}

/// Finite, in-order events of a single invocation. An `Err` item ends it.
pub type EventStream = BoxStream<'static, Result<AgentEvent>>;

// 2. The Runtime Seam
// Whatever actually runs the agents. One `invoke` is one fresh session; an
// implementation keeps nothing between calls and is shared across requests.
pub trait AgentRuntime: Send + Sync {
    fn invoke(&self, root: Arc<AgentSpec>, input: String) -> EventStream;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_event_serializes_without_tool_call() {
        let event = AgentEvent::text("coordinator", "hello");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"author": "coordinator", "text": "hello"})
        );
    }

    #[test]
    fn tool_call_event_carries_arguments() {
        let event = AgentEvent::tool_call("coordinator", "researcher", json!({"request": "tides"}));
        let call = event.tool_call.as_ref().unwrap();
        assert_eq!(call.name, "researcher");
        assert_eq!(call.arguments["request"], "tides");
        assert!(event.text.is_none());
    }
}
