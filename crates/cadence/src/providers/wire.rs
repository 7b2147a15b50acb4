//! Per-line parsers for the two wire format families providers stream in.
//!
//! Each parser looks at exactly one line and keeps no state; malformed lines parse to an
//! empty [`LineDelta`] so a single bad chunk never ends a response.
use serde_json::{Map, Value};

use crate::models::tool::ToolInvocation;

pub const SSE_DATA_PREFIX: &str = "data:";
pub const SSE_DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Server-sent events carrying JSON deltas after a `data:` prefix
    Sse,
    /// One raw JSON object per line with a boolean `done` field
    JsonLines,
}

impl WireFormat {
    /// Classify a response from its first non-empty line
    pub fn detect(line: &str) -> Self {
        let line = line.trim();
        if line.starts_with(SSE_DATA_PREFIX) {
            return WireFormat::Sse;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(object)) if object.get("done").is_some_and(Value::is_boolean) => {
                WireFormat::JsonLines
            }
            _ => WireFormat::Sse,
        }
    }

    pub fn parse_line(&self, line: &str) -> LineDelta {
        match self {
            WireFormat::Sse => parse_sse_line(line),
            WireFormat::JsonLines => parse_json_line(line),
        }
    }
}

/// A piece of a tool call streamed incrementally, joined by its index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// What one line contributed to the response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineDelta {
    pub thinking: Option<String>,
    pub content: Option<String>,
    pub is_done: bool,
    pub fragments: Vec<ToolCallFragment>,
    /// Fully formed calls from formats that do not stream arguments
    pub tool_calls: Vec<ToolInvocation>,
}

impl LineDelta {
    fn done() -> Self {
        Self {
            is_done: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.thinking.is_none()
            && self.content.is_none()
            && !self.is_done
            && self.fragments.is_empty()
            && self.tool_calls.is_empty()
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse_object(payload: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, line = payload, "skipping malformed stream line");
            None
        }
    }
}

/// Parse one line of an SSE framed response
pub fn parse_sse_line(line: &str) -> LineDelta {
    let payload = match line.trim().strip_prefix(SSE_DATA_PREFIX) {
        Some(payload) => payload.trim(),
        // event:, id: and comment lines carry nothing we use
        None => return LineDelta::default(),
    };

    if payload == SSE_DONE_MARKER {
        return LineDelta::done();
    }

    let Some(json) = parse_object(payload) else {
        return LineDelta::default();
    };

    match json.get("type").and_then(Value::as_str) {
        Some(event_type) if json.get("choices").is_none() => parse_envelope_event(event_type, &json),
        _ => parse_chat_delta(&json),
    }
}

/// Chat completion chunks: `choices[0].delta.{content, reasoning_content, tool_calls}`
fn parse_chat_delta(json: &Value) -> LineDelta {
    let Some(delta) = json.pointer("/choices/0/delta") else {
        return LineDelta::default();
    };

    let thinking = non_empty_str(delta.get("reasoning_content"))
        .or_else(|| non_empty_str(delta.get("reasoning")))
        .or_else(|| non_empty_str(delta.get("thinking")));

    let fragments = delta
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(position, call)| ToolCallFragment {
                    index: call
                        .get("index")
                        .and_then(Value::as_u64)
                        .map(|i| i as usize)
                        .unwrap_or(position),
                    id: non_empty_str(call.get("id")),
                    name: non_empty_str(call.pointer("/function/name")),
                    arguments: non_empty_str(call.pointer("/function/arguments")),
                })
                .collect()
        })
        .unwrap_or_default();

    LineDelta {
        thinking,
        content: non_empty_str(delta.get("content")),
        is_done: false,
        fragments,
        tool_calls: Vec::new(),
    }
}

/// Typed envelope events: `content_block_start`, `content_block_delta`, `message_stop`
fn parse_envelope_event(event_type: &str, json: &Value) -> LineDelta {
    let index = json
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as usize)
        .unwrap_or(0);

    match event_type {
        "content_block_start" => {
            let block = &json["content_block"];
            if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                return LineDelta::default();
            }
            LineDelta {
                fragments: vec![ToolCallFragment {
                    index,
                    id: non_empty_str(block.get("id")),
                    name: non_empty_str(block.get("name")),
                    arguments: None,
                }],
                ..Default::default()
            }
        }
        "content_block_delta" => {
            let delta = &json["delta"];
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => LineDelta {
                    content: non_empty_str(delta.get("text")),
                    ..Default::default()
                },
                Some("thinking_delta") => LineDelta {
                    thinking: non_empty_str(delta.get("thinking")),
                    ..Default::default()
                },
                Some("input_json_delta") => LineDelta {
                    fragments: vec![ToolCallFragment {
                        index,
                        arguments: non_empty_str(delta.get("partial_json")),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                _ => LineDelta::default(),
            }
        }
        "message_stop" => LineDelta::done(),
        "error" => {
            tracing::warn!(error = %json["error"], "provider reported a stream error");
            LineDelta::default()
        }
        _ => LineDelta::default(),
    }
}

/// Parse one line of a line-delimited JSON response
pub fn parse_json_line(line: &str) -> LineDelta {
    let line = line.trim();
    if line.is_empty() {
        return LineDelta::default();
    }
    let Some(json) = parse_object(line) else {
        return LineDelta::default();
    };

    let message = json.get("message");
    let content = message
        .and_then(|m| non_empty_str(m.get("content")))
        .or_else(|| non_empty_str(json.get("response")));
    let thinking = message
        .and_then(|m| non_empty_str(m.get("thinking")))
        .or_else(|| non_empty_str(json.get("thinking")));

    let tool_calls = message
        .and_then(|m| m.get("tool_calls"))
        .and_then(Value::as_array)
        .map(|calls| calls.iter().filter_map(single_shot_tool_call).collect())
        .unwrap_or_default();

    LineDelta {
        thinking,
        content,
        is_done: json.get("done").and_then(Value::as_bool).unwrap_or(false),
        fragments: Vec::new(),
        tool_calls,
    }
}

fn single_shot_tool_call(call: &Value) -> Option<ToolInvocation> {
    let function = call.get("function")?;
    let name = non_empty_str(function.get("name"))?;
    let arguments = match function.get("arguments") {
        Some(Value::Object(arguments)) => arguments.clone(),
        // Some servers still send the arguments as an encoded string
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(arguments)) => arguments,
            _ => {
                tracing::warn!(tool = %name, "dropping tool call with unparseable arguments");
                return None;
            }
        },
        None | Some(Value::Null) => Map::new(),
        Some(_) => return None,
    };
    Some(match non_empty_str(call.get("id")) {
        Some(id) => ToolInvocation::new(id, name, arguments),
        None => ToolInvocation::generated(name, arguments),
    })
}
