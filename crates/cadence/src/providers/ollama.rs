use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{EventStream, Provider};
use super::configs::OllamaProviderConfig;
use super::utils::{
    decode_event_stream, messages_to_openai_spec, openai_tool_calls, post_json, send_checked,
};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::stream::Completion;

pub const OLLAMA_HOST: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "qwen2.5";

pub struct OllamaProvider {
    client: Client,
    config: OllamaProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, system: &str, messages: &[Message], stream: bool) -> Value {
        let mut options = serde_json::Map::new();
        if let Some(temperature) = self.config.temperature {
            options.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = self.config.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(system, messages),
            "stream": stream,
        });
        if !options.is_empty() {
            payload["options"] = Value::Object(options);
        }
        payload
    }

    fn post(&self, payload: &Value) -> RequestBuilder {
        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));
        self.client.post(&url).json(payload)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream(&self, system: &str, messages: &[Message]) -> ProviderResult<EventStream> {
        let payload = self.payload(system, messages, true);
        tracing::debug!(model = %self.config.model, messages = messages.len(), "ollama stream request");
        let response = send_checked(self.post(&payload)).await?;
        Ok(decode_event_stream(response))
    }

    async fn complete(&self, system: &str, messages: &[Message]) -> ProviderResult<Completion> {
        let payload = self.payload(system, messages, false);
        let response = post_json(self.post(&payload)).await?;

        if let Some(error) = response.get("error") {
            return Err(ProviderError::InvalidResponse(format!(
                "Ollama error: {}",
                error
            )));
        }

        let message = &response["message"];
        let tool_calls = openai_tool_calls(message);
        Ok(Completion {
            content: message["content"].as_str().unwrap_or_default().to_string(),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            finished: response["done_reason"].as_str() != Some("length"),
        })
    }
}
