use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{EventStream, Provider};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    decode_event_stream, messages_to_openai_spec, openai_tool_calls, post_json, send_checked,
    with_sampling,
};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::stream::Completion;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, system: &str, messages: &[Message], stream: bool) -> Value {
        let payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(system, messages),
            "stream": stream,
        });
        with_sampling(payload, self.config.temperature, self.config.max_tokens)
    }

    fn post(&self, payload: &Value) -> RequestBuilder {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(&self, system: &str, messages: &[Message]) -> ProviderResult<EventStream> {
        let payload = self.payload(system, messages, true);
        tracing::debug!(model = %self.config.model, messages = messages.len(), "openai stream request");
        let response = send_checked(self.post(&payload)).await?;
        Ok(decode_event_stream(response))
    }

    async fn complete(&self, system: &str, messages: &[Message]) -> ProviderResult<Completion> {
        let payload = self.payload(system, messages, false);
        let response = post_json(self.post(&payload)).await?;

        if let Some(error) = response.get("error") {
            return Err(ProviderError::InvalidResponse(format!(
                "OpenAI API error: {}",
                error
            )));
        }

        let choice = &response["choices"][0];
        let message = &choice["message"];
        let tool_calls = openai_tool_calls(message);

        Ok(Completion {
            content: message["content"].as_str().unwrap_or_default().to_string(),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            finished: choice["finish_reason"].as_str() != Some("length"),
        })
    }
}
