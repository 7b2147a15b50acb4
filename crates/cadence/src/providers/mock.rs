use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::stream::{Completion, StreamEvent};
use crate::providers::base::{EventStream, Provider};

/// One scripted reply for a streaming request
pub enum MockReply {
    Events(Vec<ProviderResult<StreamEvent>>),
    /// The request itself fails, before any event
    Error(ProviderError),
}

impl MockReply {
    /// Text chunks followed by `Done`
    pub fn text(chunks: &[&str]) -> Self {
        let mut events: Vec<_> = chunks.iter().map(|c| Ok(StreamEvent::text(*c))).collect();
        events.push(Ok(StreamEvent::Done));
        MockReply::Events(events)
    }
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Clone, Default)]
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    completions: Arc<Mutex<VecDeque<Completion>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of streamed replies
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Default::default()
        }
    }

    pub fn with_completions(self, completions: Vec<Completion>) -> Self {
        *self.completions.lock().unwrap() = completions.into();
        self
    }

    /// Number of requests made, streaming or not
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The conversation snapshots each request was sent with
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, messages: &[Message]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, _system: &str, messages: &[Message]) -> ProviderResult<EventStream> {
        self.record(messages);
        // Return an empty answer if no more pre-configured replies
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::text(&[]));
        match reply {
            MockReply::Events(events) => Ok(Box::pin(stream::iter(events))),
            MockReply::Error(err) => Err(err),
        }
    }

    async fn complete(&self, _system: &str, messages: &[Message]) -> ProviderResult<Completion> {
        self.record(messages);
        Ok(self
            .completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Completion {
                content: String::new(),
                tool_calls: None,
                finished: true,
            }))
    }
}
