use super::accumulator::ToolCallAccumulator;
use super::wire::LineDelta;
use crate::markup::{is_renderable, render_invocations};
use crate::models::stream::{Completion, StreamEvent};
use crate::models::tool::ToolInvocation;

/// Emitted between a thinking segment and a content segment (or the reverse)
pub const SEGMENT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Thinking,
    Content,
}

/// Turns parsed line deltas into canonical stream events for one response.
#[derive(Debug, Default)]
pub struct StreamComposer {
    last_segment: Option<Segment>,
    accumulator: ToolCallAccumulator,
    tool_calls: Vec<ToolInvocation>,
    finished: bool,
}

impl StreamComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Events contributed by one line, in order; a done line also finalizes
    pub fn push(&mut self, delta: LineDelta) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(thinking) = delta.thinking {
            self.segment(Segment::Thinking, thinking, &mut events);
        }
        if let Some(content) = delta.content {
            self.segment(Segment::Content, content, &mut events);
        }
        for fragment in &delta.fragments {
            self.accumulator.apply(fragment);
        }
        self.tool_calls.extend(delta.tool_calls);

        if delta.is_done {
            events.extend(self.finish());
        }
        events
    }

    /// Emit collected tool calls as trailing markup followed by `Done`, exactly once
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut invocations = std::mem::take(&mut self.tool_calls);
        invocations.extend(std::mem::take(&mut self.accumulator).finish());
        invocations.retain(|invocation| {
            let keep = is_renderable(invocation);
            if !keep {
                tracing::warn!(
                    tool = %invocation.name,
                    "dropping tool call whose name or argument keys cannot be markup tags"
                );
            }
            keep
        });

        let mut events = Vec::new();
        if !invocations.is_empty() {
            let markup = render_invocations(&invocations);
            let text = if self.last_segment.is_some() {
                format!("{}{}", SEGMENT_SEPARATOR, markup)
            } else {
                markup
            };
            events.push(StreamEvent::text(text));
            events.extend(
                invocations
                    .into_iter()
                    .map(|invocation| StreamEvent::ToolCall { invocation }),
            );
        }
        events.push(StreamEvent::Done);
        events
    }

    fn segment(&mut self, kind: Segment, text: String, events: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        if self.last_segment.is_some_and(|last| last != kind) {
            events.push(StreamEvent::text(SEGMENT_SEPARATOR));
        }
        self.last_segment = Some(kind);
        events.push(StreamEvent::text(text));
    }
}

/// The answer text of a one-shot completion, tool calls rendered the same way streams do
pub fn completion_text(completion: &Completion) -> String {
    completion_events(completion)
        .iter()
        .filter_map(StreamEvent::as_text)
        .collect()
}

/// Replay a one-shot completion as canonical events
pub fn completion_events(completion: &Completion) -> Vec<StreamEvent> {
    let mut composer = StreamComposer::new();
    let mut events = composer.push(LineDelta {
        content: Some(completion.content.clone()).filter(|c| !c.is_empty()),
        tool_calls: completion.tool_calls.clone().unwrap_or_default(),
        ..Default::default()
    });
    events.extend(composer.finish());
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::wire::ToolCallFragment;
    use serde_json::{json, Map};

    fn content(text: &str) -> LineDelta {
        LineDelta {
            content: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn thinking(text: &str) -> LineDelta {
        LineDelta {
            thinking: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn done() -> LineDelta {
        LineDelta {
            is_done: true,
            ..Default::default()
        }
    }

    fn texts(events: &[StreamEvent]) -> Vec<&str> {
        events.iter().filter_map(StreamEvent::as_text).collect()
    }

    #[test]
    fn test_plain_content() {
        let mut composer = StreamComposer::new();
        let mut events = composer.push(content("hi"));
        events.extend(composer.push(content(" there")));
        events.extend(composer.push(done()));

        assert_eq!(
            events,
            vec![
                StreamEvent::text("hi"),
                StreamEvent::text(" there"),
                StreamEvent::Done
            ]
        );
        assert!(composer.is_finished());
    }

    #[test]
    fn test_separator_on_segment_change() {
        let mut composer = StreamComposer::new();
        let mut events = composer.push(thinking("let me think"));
        events.extend(composer.push(thinking(" more")));
        events.extend(composer.push(content("answer")));
        events.extend(composer.push(thinking("again")));
        events.extend(composer.push(done()));

        assert_eq!(
            texts(&events),
            vec![
                "let me think",
                " more",
                SEGMENT_SEPARATOR,
                "answer",
                SEGMENT_SEPARATOR,
                "again"
            ]
        );
    }

    #[test]
    fn test_thinking_and_content_in_one_line() {
        let mut composer = StreamComposer::new();
        let events = composer.push(LineDelta {
            thinking: Some("t".to_string()),
            content: Some("c".to_string()),
            ..Default::default()
        });
        assert_eq!(texts(&events), vec!["t", SEGMENT_SEPARATOR, "c"]);
    }

    #[test]
    fn test_accumulated_tool_calls_emitted_at_done() {
        let mut composer = StreamComposer::new();
        let mut events = composer.push(content("Running it."));
        events.extend(composer.push(LineDelta {
            fragments: vec![ToolCallFragment {
                index: 0,
                id: Some("call_1".to_string()),
                name: Some("echo".to_string()),
                arguments: Some("{\"message\":".to_string()),
            }],
            ..Default::default()
        }));
        assert_eq!(events.len(), 1, "partial calls never surface mid-stream");

        events.extend(composer.push(LineDelta {
            fragments: vec![ToolCallFragment {
                index: 0,
                arguments: Some("\"a<b\"}".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }));
        events.extend(composer.push(done()));

        assert_eq!(events.len(), 4);
        assert_eq!(
            events[1],
            StreamEvent::text("\n\n<echo>\n<message>a&lt;b</message>\n</echo>")
        );
        match &events[2] {
            StreamEvent::ToolCall { invocation } => {
                assert_eq!(invocation.id, "call_1");
                assert_eq!(invocation.arguments["message"], json!("a<b"));
            }
            other => panic!("expected tool call, got {:?}", other),
        }
        assert_eq!(events[3], StreamEvent::Done);
    }

    #[test]
    fn test_tool_call_with_invalid_name_is_dropped() {
        let mut composer = StreamComposer::new();
        let mut events = composer.push(LineDelta {
            fragments: vec![ToolCallFragment {
                index: 0,
                id: Some("call_1".to_string()),
                name: Some("get weather".to_string()),
                arguments: Some(r#"{"city":"Oslo"}"#.to_string()),
            }],
            ..Default::default()
        });
        events.extend(composer.push(done()));
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn test_tool_call_with_invalid_argument_key_is_dropped() {
        let mut composer = StreamComposer::new();
        let mut events = composer.push(content("Writing."));
        events.extend(composer.push(LineDelta {
            tool_calls: vec![ToolInvocation::new(
                "call_2",
                "write",
                json!({"file path": "a.txt", "1st": "x"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            )],
            ..Default::default()
        }));
        events.extend(composer.finish());
        assert_eq!(
            events,
            vec![StreamEvent::text("Writing."), StreamEvent::Done]
        );
    }

    #[test]
    fn test_valid_calls_survive_next_to_invalid_ones() {
        let mut composer = StreamComposer::new();
        let mut events = composer.push(LineDelta {
            fragments: vec![
                ToolCallFragment {
                    index: 0,
                    name: Some("get weather".to_string()),
                    arguments: Some("{}".to_string()),
                    ..Default::default()
                },
                ToolCallFragment {
                    index: 1,
                    name: Some("get_weather".to_string()),
                    arguments: Some(r#"{"city":"Oslo"}"#.to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        events.extend(composer.push(done()));
        assert_eq!(
            texts(&events),
            vec!["<get_weather>\n<city>Oslo</city>\n</get_weather>"]
        );
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut composer = StreamComposer::new();
        assert_eq!(composer.push(done()), vec![StreamEvent::Done]);
        assert!(composer.finish().is_empty());
        assert!(composer.push(content("late")).is_empty());
    }

    #[test]
    fn test_completion_text_includes_markup() {
        let mut arguments = Map::new();
        arguments.insert("path".to_string(), json!("a.txt"));
        let completion = Completion {
            content: "Reading.".to_string(),
            tool_calls: Some(vec![ToolInvocation::new("1", "read_file", arguments)]),
            finished: true,
        };
        assert_eq!(
            completion_text(&completion),
            "Reading.\n\n<read_file>\n<path>a.txt</path>\n</read_file>"
        );

        let events = completion_events(&completion);
        assert!(matches!(events[2], StreamEvent::ToolCall { .. }));
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[test]
    fn test_completion_without_content() {
        let completion = Completion {
            content: String::new(),
            tool_calls: None,
            finished: true,
        };
        assert_eq!(completion_events(&completion), vec![StreamEvent::Done]);
    }
}
