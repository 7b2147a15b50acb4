use futures::StreamExt;
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};

use super::base::EventStream;
use super::composer::StreamComposer;
use super::wire::WireFormat;
use crate::errors::{ProviderError, ProviderResult};
use crate::markup::is_tag_name;
use crate::models::message::Message;
use crate::models::stream::StreamEvent;
use crate::models::tool::ToolInvocation;

/// Convert the conversation to chat-completion messages with the system prompt first.
///
/// Messages without content are skipped, which drops the assistant placeholder that is
/// still empty while its request is in flight.
pub fn messages_to_openai_spec(system: &str, messages: &[Message]) -> Vec<Value> {
    let mut spec = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        spec.push(json!({"role": "system", "content": system}));
    }
    spec.extend(messages_to_plain_spec(messages));
    spec
}

/// Role and content pairs without a system entry, for APIs that take it separately
pub fn messages_to_plain_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .filter(|message| !message.content.is_empty())
        .map(|message| json!({"role": message.role, "content": message.content}))
        .collect()
}

/// Insert optional sampling parameters into a request payload
pub fn with_sampling(mut payload: Value, temperature: Option<f32>, max_tokens: Option<i32>) -> Value {
    if let Some(object) = payload.as_object_mut() {
        if let Some(temp) = temperature {
            object.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = max_tokens {
            object.insert("max_tokens".to_string(), json!(tokens));
        }
    }
    payload
}

/// Send a request and turn any non-success status into an error
pub async fn send_checked(request: RequestBuilder) -> ProviderResult<Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Status { status, body })
    }
}

/// Send a request and parse the whole body as one JSON document
pub async fn post_json(request: RequestBuilder) -> ProviderResult<Value> {
    let response = send_checked(request).await?;
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Err(ProviderError::MissingBody);
    }
    serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// Splits a byte stream into lines, holding partial lines across chunks
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to hold no newline
    scanned: usize,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
            from = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// The trailing line of a body that did not end with a newline
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        self.scanned = 0;
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

/// Decodes the lines of one response into canonical events
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    format: Option<WireFormat>,
    composer: StreamComposer,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(&self) -> Option<WireFormat> {
        self.format
    }

    pub fn is_finished(&self) -> bool {
        self.composer.is_finished()
    }

    pub fn line(&mut self, line: &str) -> Vec<StreamEvent> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        let format = *self.format.get_or_insert_with(|| {
            let detected = WireFormat::detect(line);
            tracing::debug!(format = ?detected, "detected response wire format");
            detected
        });
        self.composer.push(format.parse_line(line))
    }

    pub fn finish(&mut self) -> Vec<StreamEvent> {
        self.composer.finish()
    }
}

/// Turn a successful streaming response into the canonical event stream
pub fn decode_event_stream(response: Response) -> EventStream {
    let mut body = response.bytes_stream();
    Box::pin(async_stream::try_stream! {
        let mut lines = LineBuffer::default();
        let mut decoder = ResponseDecoder::new();
        let mut received = false;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(ProviderError::from)?;
            received |= !chunk.is_empty();
            for line in lines.push(&chunk) {
                for event in decoder.line(&line) {
                    yield event;
                }
            }
            if decoder.is_finished() {
                break;
            }
        }

        if !received {
            Err::<(), _>(ProviderError::MissingBody)?;
        }
        if let Some(line) = lines.flush() {
            for event in decoder.line(&line) {
                yield event;
            }
        }
        for event in decoder.finish() {
            yield event;
        }
    })
}

/// Tool names must be usable as markup tags
pub fn is_valid_function_name(name: &str) -> bool {
    is_tag_name(name)
}

/// Read `tool_calls` from a chat-completion message, dropping any that cannot be used
pub fn openai_tool_calls(message: &Value) -> Vec<ToolInvocation> {
    let Some(calls) = message.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };

    calls
        .iter()
        .filter_map(|call| {
            let id = call["id"].as_str().unwrap_or_default().to_string();
            let name = call["function"]["name"].as_str().unwrap_or_default();
            if !is_valid_function_name(name) {
                tracing::warn!(tool = name, "dropping tool call with invalid name");
                return None;
            }
            let arguments = match &call["function"]["arguments"] {
                Value::String(encoded) if encoded.trim().is_empty() => serde_json::Map::new(),
                Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
                    Ok(Value::Object(arguments)) => arguments,
                    _ => {
                        tracing::warn!(tool = name, "dropping tool call with unparseable arguments");
                        return None;
                    }
                },
                Value::Object(arguments) => arguments.clone(),
                _ => serde_json::Map::new(),
            };
            Some(if id.is_empty() {
                ToolInvocation::generated(name, arguments)
            } else {
                ToolInvocation::new(id, name, arguments)
            })
        })
        .collect()
}
