use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::ProviderResult;
use crate::models::message::Message;
use crate::models::stream::{Completion, StreamEvent};

/// Canonical events of one response, pulled lazily by the consumer
pub type EventStream = BoxStream<'static, ProviderResult<StreamEvent>>;

/// Base trait for AI providers (OpenAI, Anthropic, Ollama)
///
/// Implementations differ only in endpoint, authentication and request shape; every
/// response body goes through the same format detection and decoding.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Start a streaming request. Transport failures (non-success status, no body)
    /// are returned here or as an error item of the stream.
    async fn stream(&self, system: &str, messages: &[Message]) -> ProviderResult<EventStream>;

    /// Perform one request/response round trip without incremental output
    async fn complete(&self, system: &str, messages: &[Message]) -> ProviderResult<Completion>;
}
