use anyhow::Result;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::path::PathBuf;

use cadence::models::stream::{AgentEvent, StreamEvent};
use cadence::models::tool::ToolOutcome;

const PROMPT: &str = "\x1b[1m\x1b[38;5;30m( > \x1b[0m";
const MAX_RESULT_LINES: usize = 12;

pub trait Prompt {
    fn render(&mut self, event: &AgentEvent);
    fn notice(&mut self, text: &str);
    fn error(&mut self, text: &str);
    /// Read the next input, optionally pre-filled with text to edit
    fn get_input(&mut self, initial: Option<&str>) -> Result<Input>;
    fn close(&mut self);
}

#[derive(Debug, PartialEq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

#[derive(Debug, PartialEq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // User wants to exit the session
}

impl Input {
    fn control(input_type: InputType) -> Self {
        Self {
            input_type,
            content: None,
        }
    }
}

/// Interpret one line typed at the prompt
pub fn parse_input(line: &str) -> Input {
    let text = line.trim();
    if text.is_empty() {
        return Input::control(InputType::AskAgain);
    }
    if text.eq_ignore_ascii_case("/exit") || text.eq_ignore_ascii_case("/quit") {
        return Input::control(InputType::Exit);
    }
    if text.eq_ignore_ascii_case("/?") || text.eq_ignore_ascii_case("/help") {
        println!("Commands:");
        println!("/exit - Exit the session");
        println!("/? | /help - Display this help message");
        println!("Ctrl+C - Interrupt the answer in progress (your message comes back for editing)");
        return Input::control(InputType::AskAgain);
    }
    Input {
        input_type: InputType::Message,
        content: Some(text.to_string()),
    }
}

fn history_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("cadence").join("history.txt"))
}

pub struct RustylinePrompt {
    editor: DefaultEditor,
    at_line_start: bool,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        if let Some(path) = history_path() {
            // A missing history file is normal on first run
            let _ = editor.load_history(&path);
        }
        Ok(Self {
            editor,
            at_line_start: true,
        })
    }

    fn write_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{}", text);
        self.at_line_start = text.ends_with('\n');
        let _ = io::stdout().flush();
    }

    fn end_line(&mut self) {
        if !self.at_line_start {
            println!();
            self.at_line_start = true;
        }
    }

    fn render_outcome(&mut self, outcome: &ToolOutcome) {
        self.end_line();
        let status = if outcome.success {
            style("ok").green()
        } else {
            style("failed").red()
        };
        println!(
            "─── {} | {} ──────────────────────────",
            style(&outcome.name).magenta(),
            status
        );

        let lines: Vec<&str> = outcome.result.lines().collect();
        for line in lines.iter().take(MAX_RESULT_LINES) {
            println!("{}", style(line).dim());
        }
        if lines.len() > MAX_RESULT_LINES {
            println!(
                "{}",
                style(format!("[{} more lines]", lines.len() - MAX_RESULT_LINES)).yellow()
            );
        }
        println!();
    }
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Stream { event } => match event {
                StreamEvent::Text { content } => self.write_text(content),
                StreamEvent::ToolCall { .. } => {}
                StreamEvent::Done => self.end_line(),
            },
            AgentEvent::ToolResult { outcome } => self.render_outcome(outcome),
            AgentEvent::Aborted { .. } => {
                self.notice("Interrupted: your message is back in the input.")
            }
            AgentEvent::Finished => self.end_line(),
        }
    }

    fn notice(&mut self, text: &str) {
        self.end_line();
        println!("{}", style(text).dim());
    }

    fn error(&mut self, text: &str) {
        self.end_line();
        eprintln!("{} {}", style("Error:").red().bold(), text);
    }

    fn get_input(&mut self, initial: Option<&str>) -> Result<Input> {
        let line = match initial {
            Some(text) => self.editor.readline_with_initial(PROMPT, (text, "")),
            None => self.editor.readline(PROMPT),
        };
        let line = match line {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                return Ok(Input::control(InputType::Exit))
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                return Ok(Input::control(InputType::Exit));
            }
        };

        let input = parse_input(&line);
        if input.input_type == InputType::Message {
            let _ = self.editor.add_history_entry(line.trim());
        }
        Ok(input)
    }

    fn close(&mut self) {
        let Some(path) = history_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = self.editor.save_history(&path) {
            tracing::debug!(error = %e, "could not save input history");
        }
    }
}
