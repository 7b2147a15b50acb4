use super::tool::{ToolInvocation, ToolOutcome};
use serde::{Deserialize, Serialize};

/// Canonical, provider independent stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Text { content: String },
    ToolCall { invocation: ToolInvocation },
    Done,
}

impl StreamEvent {
    pub fn text<S: Into<String>>(content: S) -> Self {
        StreamEvent::Text {
            content: content.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StreamEvent::Text { content } => Some(content),
            _ => None,
        }
    }
}

/// Everything the orchestrator hands to its caller while a task runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A canonical event forwarded from the provider stream
    Stream { event: StreamEvent },
    /// One executed tool invocation, for display
    ToolResult { outcome: ToolOutcome },
    /// The in-flight request was aborted; `user_text` can repopulate the input
    Aborted { user_text: String },
    /// The task finished and the agent is idle again
    Finished,
}

impl From<StreamEvent> for AgentEvent {
    fn from(event: StreamEvent) -> Self {
        AgentEvent::Stream { event }
    }
}

/// Result of a single non-streaming round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    pub finished: bool,
}
