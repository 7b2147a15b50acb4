use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{EventStream, Provider};
use super::configs::AnthropicProviderConfig;
use super::utils::{
    decode_event_stream, is_valid_function_name, messages_to_plain_spec, post_json, send_checked,
};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::stream::Completion;
use crate::models::tool::ToolInvocation;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The messages API requires an explicit output budget
pub const DEFAULT_MAX_TOKENS: i32 = 4096;

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, system: &str, messages: &[Message], stream: bool) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_plain_spec(messages),
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": stream,
        });
        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if let Some(temperature) = self.config.temperature {
            payload["temperature"] = json!(temperature);
        }
        payload
    }

    fn post(&self, payload: &Value) -> RequestBuilder {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        self.client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload)
    }
}

fn content_blocks(response: &Value) -> (String, Vec<ToolInvocation>) {
    let mut text = String::new();
    let mut calls = Vec::new();

    let blocks = response
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => {
                let name = block["name"].as_str().unwrap_or_default();
                if !is_valid_function_name(name) {
                    tracing::warn!(tool = name, "dropping tool call with invalid name");
                    continue;
                }
                let arguments = block["input"].as_object().cloned().unwrap_or_default();
                calls.push(match block["id"].as_str() {
                    Some(id) if !id.is_empty() => ToolInvocation::new(id, name, arguments),
                    _ => ToolInvocation::generated(name, arguments),
                });
            }
            _ => {}
        }
    }
    (text, calls)
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream(&self, system: &str, messages: &[Message]) -> ProviderResult<EventStream> {
        let payload = self.payload(system, messages, true);
        tracing::debug!(model = %self.config.model, messages = messages.len(), "anthropic stream request");
        let response = send_checked(self.post(&payload)).await?;
        Ok(decode_event_stream(response))
    }

    async fn complete(&self, system: &str, messages: &[Message]) -> ProviderResult<Completion> {
        let payload = self.payload(system, messages, false);
        let response = post_json(self.post(&payload)).await?;

        if response.get("type").and_then(Value::as_str) == Some("error") {
            return Err(ProviderError::InvalidResponse(format!(
                "Anthropic API error: {}",
                response["error"]
            )));
        }

        let (content, tool_calls) = content_blocks(&response);
        Ok(Completion {
            content,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            finished: response["stop_reason"].as_str() != Some("max_tokens"),
        })
    }
}
