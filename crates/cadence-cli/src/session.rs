use anyhow::Result;

use cadence::agent::{Agent, AgentState};
use cadence::errors::AgentResult;
use cadence::models::stream::AgentEvent;

use crate::prompt::{InputType, Prompt};

/// Outcome of waiting for the next agent event
enum Step {
    Event(Option<AgentResult<AgentEvent>>),
    Interrupt,
}

pub struct Session {
    agent: Agent,
    prompt: Box<dyn Prompt>,
    /// Text of an interrupted message, offered again at the next prompt
    restore: Option<String>,
}

impl Session {
    pub fn new(agent: Agent, prompt: Box<dyn Prompt>) -> Self {
        Session {
            agent,
            prompt,
            restore: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.notice(&format!(
            "Starting session with {}. Type /help for commands.",
            self.agent.provider_name()
        ));

        loop {
            let restore = self.restore.take();
            let input = self.prompt.get_input(restore.as_deref())?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = input.content {
                        self.run_task(content).await;
                    }
                }
                InputType::Exit => break,
                InputType::AskAgain => continue,
            }
        }

        self.prompt.close();
        Ok(())
    }

    pub async fn headless_start(&mut self, message: String) -> Result<()> {
        self.run_task(message).await;
        self.prompt.close();
        Ok(())
    }

    async fn run_task(&mut self, text: String) {
        if let Err(e) = self.agent.submit(text).await {
            self.prompt.error(&e.to_string());
            return;
        }

        loop {
            match self.next_step().await {
                Step::Event(Some(Ok(event))) => {
                    if let AgentEvent::Aborted { user_text } = &event {
                        self.restore = Some(user_text.clone());
                    }
                    self.prompt.render(&event);
                }
                Step::Event(Some(Err(e))) => self.prompt.error(&e.to_string()),
                Step::Event(None) => break,
                Step::Interrupt => {
                    // Resets the interaction to before the interrupted user request
                    if let Some(user_text) = self.agent.abort() {
                        self.prompt.render(&AgentEvent::Aborted {
                            user_text: user_text.clone(),
                        });
                        self.restore = Some(user_text);
                    }
                    break;
                }
            }
        }
    }

    /// Pull one event, racing it against Ctrl-C.
    ///
    /// A running tool is never cut short: Ctrl-C during dispatch only stands the task
    /// down, so the batch completes and nothing more is sent to the model. The state is
    /// read when the interrupt arrives, since a single pull can move into dispatch.
    async fn next_step(&mut self) -> Step {
        let states = self.agent.watch_state();
        let flag = self.agent.working_flag();
        let mut stood_down = false;

        let next = self.agent.next_event();
        tokio::pin!(next);

        loop {
            tokio::select! {
                event = &mut next => return Step::Event(event),
                _ = tokio::signal::ctrl_c(), if !stood_down => {
                    if interrupt_aborts(*states.borrow()) {
                        return Step::Interrupt;
                    }
                    flag.stand_down();
                    stood_down = true;
                    tracing::info!("interrupt during tool dispatch, finishing the current batch");
                }
            }
        }
    }
}

/// Whether an interrupt may drop the pull in progress rather than stand the task down
fn interrupt_aborts(state: AgentState) -> bool {
    state != AgentState::ToolDispatch
}
