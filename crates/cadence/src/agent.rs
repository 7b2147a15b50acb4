use futures::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::configuration::AgentSettings;
use crate::conversation::Conversation;
use crate::errors::{AgentError, AgentResult, ProviderError};
use crate::markup::actionable_blocks;
use crate::models::message::MessageId;
use crate::models::role::Role;
use crate::models::stream::{AgentEvent, StreamEvent};
use crate::models::tool::ToolOutcome;
use crate::providers::base::{EventStream, Provider};
use crate::providers::composer::completion_events;
use crate::tools::ToolExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AgentState {
    Idle,
    Streaming,
    ToolDispatch,
}

/// Whether the current task should keep feeding tool results back to the model.
///
/// Raised by `submit`; cleared when an answer has nothing left to run, or by anyone
/// holding a clone who wants the task to end after the running batch.
#[derive(Debug, Clone, Default)]
pub struct WorkingFlag(Arc<AtomicBool>);

impl WorkingFlag {
    fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn stand_down(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Requests cancellation of the task it was issued for. Honored before the next event
/// is processed; a network read or tool run already under way is left to finish.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Supplies the system prompt, rendered fresh for every request
pub trait SystemPrompt: Send + Sync {
    fn render(&self) -> String;
}

impl<F> SystemPrompt for F
where
    F: Fn() -> String + Send + Sync,
{
    fn render(&self) -> String {
        self()
    }
}

/// A system prompt that never changes
#[derive(Debug, Clone, Default)]
pub struct StaticPrompt(pub String);

impl SystemPrompt for StaticPrompt {
    fn render(&self) -> String {
        self.0.clone()
    }
}

/// The user and assistant messages of the request in flight
#[derive(Debug)]
struct Turn {
    user_id: MessageId,
    assistant_id: MessageId,
    user_text: String,
}

/// Agent drives one conversation through a provider and a tool executor.
///
/// Work happens only while the caller pulls [`Agent::next_event`]: each pull processes at
/// most one provider event or one tool block, so the caller sets the pace and can abort
/// between any two events.
pub struct Agent {
    provider: Box<dyn Provider>,
    executor: Arc<dyn ToolExecutor>,
    system_prompt: Box<dyn SystemPrompt>,
    settings: AgentSettings,
    conversation: Conversation,
    state: AgentState,
    state_tx: watch::Sender<AgentState>,
    working: WorkingFlag,
    cancel: CancellationToken,
    turn: Option<Turn>,
    stream: Option<EventStream>,
    pending_blocks: VecDeque<String>,
    pending_outcomes: VecDeque<ToolOutcome>,
    results: Vec<String>,
    turns: usize,
    announce_finish: bool,
}

impl Agent {
    pub fn new<P: SystemPrompt + 'static>(
        provider: Box<dyn Provider>,
        executor: Arc<dyn ToolExecutor>,
        system_prompt: P,
    ) -> Self {
        Self {
            provider,
            executor,
            system_prompt: Box::new(system_prompt),
            settings: AgentSettings::default(),
            conversation: Conversation::new(),
            state: AgentState::Idle,
            state_tx: watch::channel(AgentState::Idle).0,
            working: WorkingFlag::default(),
            cancel: CancellationToken::new(),
            turn: None,
            stream: None,
            pending_blocks: VecDeque::new(),
            pending_outcomes: VecDeque::new(),
            results: Vec::new(),
            turns: 0,
            announce_finish: false,
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Follows the state while `next_event` holds the agent, e.g. to learn whether a
    /// tool is running when an interrupt arrives
    pub fn watch_state(&self) -> watch::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// A handle on the working-task flag, e.g. to let a task end after its current batch
    pub fn working_flag(&self) -> WorkingFlag {
        self.working.clone()
    }

    pub fn is_working(&self) -> bool {
        self.working.is_set()
    }

    /// Start a task from user text. Only valid while idle.
    pub async fn submit<S: Into<String>>(&mut self, text: S) -> AgentResult<AbortHandle> {
        if self.state != AgentState::Idle {
            return Err(AgentError::Busy {
                action: "submit".to_string(),
                state: self.state.to_string(),
            });
        }

        self.announce_finish = false;
        self.cancel = CancellationToken::new();
        self.working.raise();
        self.turns = 0;
        self.begin_turn(text.into());

        match self.open_stream().await {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(AbortHandle {
                    token: self.cancel.clone(),
                })
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Pull the next event of the running task; `None` once the agent is idle.
    pub async fn next_event(&mut self) -> Option<AgentResult<AgentEvent>> {
        loop {
            if self.state != AgentState::Idle && self.cancel.is_cancelled() {
                return Some(Ok(self.cancelled()));
            }

            match self.state {
                AgentState::Idle => {
                    return std::mem::take(&mut self.announce_finish)
                        .then_some(Ok(AgentEvent::Finished));
                }
                AgentState::Streaming => {
                    let Some(stream) = self.stream.as_mut() else {
                        match self.open_stream().await {
                            Ok(stream) => self.stream = Some(stream),
                            Err(err) => return Some(Err(self.fail(err))),
                        }
                        continue;
                    };

                    let item = stream.next().await;
                    if self.cancel.is_cancelled() {
                        return Some(Ok(self.cancelled()));
                    }

                    match item {
                        Some(Ok(event)) => return Some(Ok(self.on_stream_event(event))),
                        Some(Err(err)) => return Some(Err(self.fail(err))),
                        // A stream that ends without `Done` is complete all the same
                        None => self.end_of_response(),
                    }
                }
                AgentState::ToolDispatch => {
                    if let Some(outcome) = self.pending_outcomes.pop_front() {
                        self.results.push(outcome.summary());
                        return Some(Ok(AgentEvent::ToolResult { outcome }));
                    }

                    match self.pending_blocks.pop_front() {
                        Some(block) => {
                            let outcomes = self.run_block(&block).await;
                            self.pending_outcomes.extend(outcomes);
                        }
                        None => self.end_of_batch(),
                    }
                }
            }
        }
    }

    /// Cancel the task in flight.
    ///
    /// While streaming, the in-flight user and assistant messages are removed and the user
    /// text is returned so it can be offered for editing. During tool dispatch the task
    /// stands down and the remaining blocks are dropped; the messages stay. Does nothing
    /// when idle.
    pub fn abort(&mut self) -> Option<String> {
        match self.state {
            AgentState::Idle => None,
            AgentState::Streaming => {
                self.cancel.cancel();
                self.working.stand_down();
                let turn = self.turn.take();
                if let Some(turn) = &turn {
                    self.conversation.remove_message(&turn.assistant_id);
                    self.conversation.remove_message(&turn.user_id);
                }
                self.reset();
                tracing::info!(provider = self.provider.name(), "aborted streaming request");
                turn.map(|turn| turn.user_text)
            }
            AgentState::ToolDispatch => {
                self.cancel.cancel();
                self.working.stand_down();
                tracing::info!(
                    dropped = self.pending_blocks.len(),
                    "aborted during tool dispatch"
                );
                self.reset();
                None
            }
        }
    }

    /// Like [`Agent::abort`], but an error when there is nothing to abort
    pub fn try_abort(&mut self) -> AgentResult<String> {
        if self.state == AgentState::Idle {
            return Err(AgentError::NothingInFlight);
        }
        Ok(self.abort().unwrap_or_default())
    }

    fn begin_turn(&mut self, user_text: String) {
        let user_id = self.conversation.add_message(Role::User, user_text.clone());
        let assistant_id = self.conversation.add_message(Role::Assistant, "");
        self.turn = Some(Turn {
            user_id,
            assistant_id,
            user_text,
        });
        self.turns += 1;
        self.stream = None;
        self.transition(AgentState::Streaming);
    }

    async fn open_stream(&self) -> Result<EventStream, ProviderError> {
        let system = self.system_prompt.render();
        let messages = self.conversation.snapshot();
        tracing::debug!(
            provider = self.provider.name(),
            messages = messages.len(),
            streaming = self.settings.streaming,
            turn = self.turns,
            "requesting response"
        );

        if self.settings.streaming {
            return self.provider.stream(&system, &messages).await;
        }
        let completion = self.provider.complete(&system, &messages).await?;
        let events = completion_events(&completion).into_iter().map(Ok);
        Ok(Box::pin(stream::iter(events)))
    }

    fn on_stream_event(&mut self, event: StreamEvent) -> AgentEvent {
        match &event {
            StreamEvent::Text { content } => {
                if let Some(turn) = &self.turn {
                    if let Err(err) = self
                        .conversation
                        .append_to_message(&turn.assistant_id, content)
                    {
                        tracing::warn!(error = %err, "in-flight message is gone");
                    }
                }
            }
            StreamEvent::ToolCall { invocation } => {
                tracing::debug!(tool = %invocation.name, id = %invocation.id, "tool call in response");
            }
            StreamEvent::Done => {
                self.end_of_response();
            }
        }
        event.into()
    }

    /// Decide what follows a completed answer
    fn end_of_response(&mut self) {
        self.stream = None;
        let text = self
            .turn
            .as_ref()
            .and_then(|turn| self.conversation.find(&turn.assistant_id))
            .map(|message| message.content.clone())
            .unwrap_or_default();

        let blocks = actionable_blocks(&text);
        if blocks.is_empty() {
            self.working.stand_down();
            self.finish();
            return;
        }

        tracing::info!(blocks = blocks.len(), "dispatching tool calls");
        self.pending_blocks = blocks.into_iter().map(|block| block.raw).collect();
        self.pending_outcomes.clear();
        self.results.clear();
        self.transition(AgentState::ToolDispatch);
    }

    async fn run_block(&self, block: &str) -> Vec<ToolOutcome> {
        match self.executor.execute(block).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                let name = actionable_blocks(block)
                    .into_iter()
                    .next()
                    .map(|found| found.name)
                    .unwrap_or_default();
                tracing::warn!(tool = %name, error = %err, "tool execution failed");
                vec![ToolOutcome::failure(name, err.to_string())]
            }
        }
    }

    /// Feed the batch results back, unless the task has been stood down
    fn end_of_batch(&mut self) {
        if self.working.is_set() && self.turns >= self.settings.max_turns {
            tracing::warn!(
                max_turns = self.settings.max_turns,
                "turn limit reached, ending task"
            );
            self.working.stand_down();
        }

        let combined = std::mem::take(&mut self.results).join("\n\n");
        if !self.working.is_set() {
            tracing::debug!("task stood down, discarding tool results");
            self.finish();
            return;
        }
        self.begin_turn(combined);
    }

    fn cancelled(&mut self) -> AgentEvent {
        match self.state {
            AgentState::Streaming => AgentEvent::Aborted {
                user_text: self.abort().unwrap_or_default(),
            },
            _ => {
                self.abort();
                AgentEvent::Finished
            }
        }
    }

    /// Record a transport failure in place of the in-flight answer and end the task
    fn fail(&mut self, err: ProviderError) -> AgentError {
        let err = AgentError::from(err);
        tracing::error!(provider = self.provider.name(), error = %err, "request failed");
        if let Some(turn) = &self.turn {
            let _ = self
                .conversation
                .update_message(&turn.assistant_id, format!("Error: {}", err));
        }
        self.working.stand_down();
        self.reset();
        err
    }

    fn finish(&mut self) {
        self.reset();
        self.announce_finish = true;
    }

    fn reset(&mut self) {
        self.turn = None;
        self.stream = None;
        self.pending_blocks.clear();
        self.pending_outcomes.clear();
        self.results.clear();
        self.transition(AgentState::Idle);
    }

    fn transition(&mut self, state: AgentState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "agent state");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }
}
